//! Heuristic preview of an IFC file from a bounded prefix.
//!
//! Nothing here validates STEP grammar. The analyzer reads at most
//! [`FULL_PREVIEW_BYTES`] (or [`QUICK_PREVIEW_BYTES`]), checks for the
//! structural markers and scrapes header and entity information with
//! regular expressions. Counts are therefore lower bounds for files larger
//! than the prefix.

use std::sync::OnceLock;

use aecaxis_protocol::constants::{FULL_PREVIEW_BYTES, QUICK_PREVIEW_BYTES, STRUCTURE_MARKERS};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::source::ByteRangeReader;

const MIB: f64 = 1024.0 * 1024.0;

/// Schema keywords checked when `FILE_SCHEMA` is absent, most specific first.
const SCHEMA_KEYWORDS: &[&str] = &["IFC4X3", "IFC4X2", "IFC4X1", "IFC4", "IFC2X3", "IFC2X2"];

/// Content analysis failures. Kept apart from transfer errors: a preview
/// failure never reaches the retry logic.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("file is empty")]
    Empty,

    #[error("missing IFC structure markers: {}", .0.join(", "))]
    MissingMarkers(Vec<&'static str>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Reads 100 000 bytes and extracts everything.
    Full,
    /// Reads 10 000 bytes; skips entity counts, coordinates and units.
    Quick,
}

impl AnalysisMode {
    pub fn prefix_len(self) -> usize {
        match self {
            Self::Full => FULL_PREVIEW_BYTES,
            Self::Quick => QUICK_PREVIEW_BYTES,
        }
    }
}

/// Rough processing cost of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityTier {
    Simple,
    Medium,
    Complex,
}

impl ComplexityTier {
    /// `Simple` below 10 MB and 1 000 elements, `Medium` below 50 MB and
    /// 10 000 elements, `Complex` otherwise.
    pub fn classify(file_size: u64, total_elements: u64) -> Self {
        let size_mb = file_size as f64 / MIB;
        if size_mb < 10.0 && total_elements < 1_000 {
            Self::Simple
        } else if size_mb < 50.0 && total_elements < 10_000 {
            Self::Medium
        } else {
            Self::Complex
        }
    }

    /// Backend processing time to expect.
    pub fn estimated_processing_time(self) -> &'static str {
        match self {
            Self::Simple => "under 1 minute",
            Self::Medium => "1-5 minutes",
            Self::Complex => "5-15 minutes",
        }
    }
}

/// Per-category entity counts found in the analyzed prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    pub beams: u64,
    pub columns: u64,
    pub walls: u64,
    pub slabs: u64,
    pub doors: u64,
    pub windows: u64,
}

/// What the analyzer learned about a file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentPreview {
    pub file_name: String,
    pub file_size: u64,
    pub format_version: String,
    pub entities: EntityCounts,
    pub total_elements: u64,
    pub project_name: Option<String>,
    pub coordinate_system: Option<String>,
    pub units: Option<String>,
    pub complexity: ComplexityTier,
}

struct Patterns {
    file_schema: Regex,
    project_names: [Regex; 3],
    instance: Regex,
    beams: Regex,
    columns: Regex,
    walls: Regex,
    slabs: Regex,
    doors: Regex,
    windows: Regex,
    projected_crs: Regex,
    context: Regex,
    si_length: Regex,
    converted_length: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("static pattern");
        // Name is the third attribute: GlobalId, OwnerHistory, Name.
        let named = |entity: &str| {
            re(&format!(
                r"(?i){entity}\s*\(\s*'[^']*'\s*,\s*(?:#\d+|\$)\s*,\s*'([^']*)'"
            ))
        };
        let entity = |name: &str| re(&format!(r"(?i)=\s*{name}\s*\("));
        Patterns {
            file_schema: re(r"(?i)FILE_SCHEMA\s*\(\s*\(\s*'([^']+)'"),
            project_names: [
                named("IFCPROJECT"),
                re(r"(?i)FILE_NAME\s*\(\s*'([^']*)'"),
                named("IFCBUILDING"),
            ],
            instance: re(r"(?i)#\d+\s*=\s*IFC[A-Z0-9_]+\s*\("),
            beams: entity("IFCBEAM(?:STANDARDCASE)?"),
            columns: entity("IFCCOLUMN(?:STANDARDCASE)?"),
            walls: entity("IFCWALL(?:STANDARDCASE|ELEMENTEDCASE)?"),
            slabs: entity("IFCSLAB(?:STANDARDCASE|ELEMENTEDCASE)?"),
            doors: entity("IFCDOOR(?:STANDARDCASE)?"),
            windows: entity("IFCWINDOW(?:STANDARDCASE)?"),
            projected_crs: re(r"(?i)IFCPROJECTEDCRS\s*\(\s*'([^']*)'"),
            context: re(
                r"(?i)IFCGEOMETRICREPRESENTATIONCONTEXT\s*\(\s*(?:'[^']*'|\$)\s*,\s*(?:'[^']*'|\$)\s*,\s*(\d)",
            ),
            si_length: re(
                r"(?i)IFCSIUNIT\s*\(\s*\*\s*,\s*\.LENGTHUNIT\.\s*,\s*(?:\.(\w+)\.|\$)\s*,\s*\.(\w+)\.",
            ),
            converted_length: re(
                r"(?i)IFCCONVERSIONBASEDUNIT\s*\([^,]*,\s*\.LENGTHUNIT\.\s*,\s*'([^']+)'",
            ),
        }
    })
}

/// Builds a [`ContentPreview`] from the head of a file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentAnalyzer;

impl ContentAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub async fn analyze<R>(&self, source: &R, mode: AnalysisMode) -> Result<ContentPreview, ParseError>
    where
        R: ByteRangeReader + ?Sized,
    {
        let prefix = source.read_range(0, mode.prefix_len()).await?;
        if prefix.is_empty() {
            return Err(ParseError::Empty);
        }
        let text = String::from_utf8_lossy(&prefix);
        self.analyze_text(source.name(), source.size(), &text, mode)
    }

    /// Analyzes already-decoded prefix text.
    pub fn analyze_text(
        &self,
        file_name: &str,
        file_size: u64,
        text: &str,
        mode: AnalysisMode,
    ) -> Result<ContentPreview, ParseError> {
        let missing: Vec<&'static str> = STRUCTURE_MARKERS
            .iter()
            .copied()
            .filter(|marker| !text.contains(marker))
            .collect();
        if !missing.is_empty() {
            return Err(ParseError::MissingMarkers(missing));
        }

        let p = patterns();
        let format_version = format_version(p, text);
        let project_name = p
            .project_names
            .iter()
            .filter_map(|re| first_capture(re, text))
            .find(|name| !name.is_empty());

        let (entities, total_elements, coordinate_system, units) = match mode {
            AnalysisMode::Quick => (EntityCounts::default(), 0, None, None),
            AnalysisMode::Full => (
                EntityCounts {
                    beams: count(&p.beams, text),
                    columns: count(&p.columns, text),
                    walls: count(&p.walls, text),
                    slabs: count(&p.slabs, text),
                    doors: count(&p.doors, text),
                    windows: count(&p.windows, text),
                },
                count(&p.instance, text),
                coordinate_system(p, text),
                length_unit(p, text),
            ),
        };

        let complexity = ComplexityTier::classify(file_size, total_elements);
        debug!(
            file = file_name,
            version = %format_version,
            total_elements,
            ?complexity,
            "content preview built"
        );

        Ok(ContentPreview {
            file_name: file_name.to_string(),
            file_size,
            format_version,
            entities,
            total_elements,
            project_name,
            coordinate_system,
            units,
            complexity,
        })
    }
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn count(re: &Regex, text: &str) -> u64 {
    re.find_iter(text).count() as u64
}

fn format_version(p: &Patterns, text: &str) -> String {
    if let Some(schema) = first_capture(&p.file_schema, text).filter(|s| !s.is_empty()) {
        return schema.to_ascii_uppercase();
    }
    let upper = text.to_ascii_uppercase();
    SCHEMA_KEYWORDS
        .iter()
        .find(|k| upper.contains(*k))
        .map(|k| k.to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

fn coordinate_system(p: &Patterns, text: &str) -> Option<String> {
    if let Some(crs) = first_capture(&p.projected_crs, text).filter(|s| !s.is_empty()) {
        return Some(crs);
    }
    first_capture(&p.context, text).map(|dim| format!("Local {dim}D"))
}

fn length_unit(p: &Patterns, text: &str) -> Option<String> {
    if let Some(name) = first_capture(&p.converted_length, text) {
        return Some(name.to_ascii_lowercase());
    }
    let caps = p.si_length.captures(text)?;
    let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let unit = caps.get(2)?.as_str();
    Some(format!("{prefix}{unit}").to_ascii_lowercase())
}
