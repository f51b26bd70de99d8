use std::path::Path;

use aecaxis_protocol::constants::{
    ALLOWED_EXTENSIONS, MAX_UPLOAD_SIZE, SNIFF_TOKENS, SNIFF_WINDOW,
};
use serde::Serialize;
use tracing::debug;

use crate::source::ByteRangeReader;

/// Reasons a file fails pre-flight checks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unsupported file type \"{extension}\"; allowed: {allowed}")]
    UnsupportedType { extension: String, allowed: String },

    #[error("file is empty")]
    Empty,

    #[error("file is too large: {size} bytes exceeds the {limit_mb} MB size limit")]
    TooLarge { size: u64, limit_mb: u64 },

    #[error("file content is not an IFC (ISO-10303-21) exchange file")]
    NotExchangeFormat,

    #[error("could not read file: {0}")]
    Unreadable(String),
}

/// Outcome of a validation, flattened for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl From<Result<(), ValidationError>> for ValidationReport {
    fn from(result: Result<(), ValidationError>) -> Self {
        match result {
            Ok(()) => Self {
                is_valid: true,
                error: None,
            },
            Err(e) => Self {
                is_valid: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Metadata and content-sniff checks run before a transfer starts.
#[derive(Debug, Clone)]
pub struct FileValidator {
    allowed_extensions: Vec<String>,
    max_size: u64,
}

impl Default for FileValidator {
    fn default() -> Self {
        Self::new(ALLOWED_EXTENSIONS.iter().copied(), MAX_UPLOAD_SIZE)
    }
}

impl FileValidator {
    /// Extensions are matched case-insensitively; a leading dot is ignored.
    pub fn new<I, S>(allowed_extensions: I, max_size: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            max_size,
        }
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Checks extension and size. Does not touch the file.
    pub fn validate(&self, name: &str, size: u64) -> Result<(), ValidationError> {
        let extension = Path::new(name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        if !self.allowed_extensions.iter().any(|a| *a == extension) {
            return Err(ValidationError::UnsupportedType {
                extension,
                allowed: self
                    .allowed_extensions
                    .iter()
                    .map(|e| format!(".{e}"))
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        if size == 0 {
            return Err(ValidationError::Empty);
        }

        if size > self.max_size {
            return Err(ValidationError::TooLarge {
                size,
                limit_mb: self.max_size / (1024 * 1024),
            });
        }

        Ok(())
    }

    pub fn report(&self, name: &str, size: u64) -> ValidationReport {
        self.validate(name, size).into()
    }

    /// Reads the first KiB and looks for an exchange-format marker.
    pub async fn sniff<R>(&self, source: &R) -> Result<(), ValidationError>
    where
        R: ByteRangeReader + ?Sized,
    {
        let prefix = source
            .read_range(0, SNIFF_WINDOW)
            .await
            .map_err(|e| ValidationError::Unreadable(e.to_string()))?;

        if looks_like_exchange_file(&prefix) {
            Ok(())
        } else {
            debug!(file = source.name(), "content sniff found no IFC marker");
            Err(ValidationError::NotExchangeFormat)
        }
    }

    /// Metadata checks followed by the content sniff.
    pub async fn validate_file<R>(&self, source: &R) -> Result<(), ValidationError>
    where
        R: ByteRangeReader + ?Sized,
    {
        self.validate(source.name(), source.size())?;
        self.sniff(source).await
    }
}

/// Whether `prefix` contains any of the exchange-format sniff tokens.
pub fn looks_like_exchange_file(prefix: &[u8]) -> bool {
    let window = &prefix[..prefix.len().min(SNIFF_WINDOW)];
    let text = String::from_utf8_lossy(window);
    SNIFF_TOKENS.iter().any(|token| text.contains(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn accepts_ifc_within_limit() {
        let v = FileValidator::default();
        assert!(v.validate("tower.ifc", 12 * MB).is_ok());
        assert!(v.validate("TOWER.IFC", 1).is_ok());
    }

    #[test]
    fn rejects_other_extensions() {
        let v = FileValidator::default();
        let err = v.validate("drawing.dwg", 10).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnsupportedType {
                extension: "dwg".into(),
                allowed: ".ifc".into(),
            }
        );
        assert!(v.validate("no_extension", 10).is_err());
        assert!(v.validate("model.ifc.zip", 10).is_err());
    }

    #[test]
    fn rejects_empty_file() {
        let v = FileValidator::default();
        assert_eq!(v.validate("a.ifc", 0), Err(ValidationError::Empty));
    }

    #[test]
    fn rejects_file_over_size_limit() {
        let v = FileValidator::default();
        let report = v.report("big.ifc", 600 * MB);
        assert!(!report.is_valid);
        assert!(report.error.unwrap().contains("500 MB size limit"));

        assert!(v.validate("edge.ifc", 500 * MB).is_ok());
        assert!(v.validate("edge.ifc", 500 * MB + 1).is_err());
    }

    #[test]
    fn custom_extension_list() {
        let v = FileValidator::new([".IFC", "ifczip"], MB);
        assert!(v.validate("a.ifczip", 10).is_ok());
        assert!(v.validate("a.ifc", 10).is_ok());
    }

    #[tokio::test]
    async fn sniff_accepts_either_token() {
        let v = FileValidator::default();
        let header = InMemorySource::new("a.ifc", b"ISO-10303-21;\nHEADER;\n".to_vec());
        assert!(v.sniff(&header).await.is_ok());

        let desc = InMemorySource::new("b.ifc", b"FILE_DESCRIPTION(('ViewDefinition'),'2;1');".to_vec());
        assert!(v.sniff(&desc).await.is_ok());
    }

    #[tokio::test]
    async fn sniff_only_looks_at_first_kib() {
        let v = FileValidator::default();
        let mut bytes = vec![b' '; 2048];
        bytes.extend_from_slice(b"ISO-10303-21;");
        let late = InMemorySource::new("late.ifc", bytes);
        assert_eq!(v.sniff(&late).await, Err(ValidationError::NotExchangeFormat));
    }

    #[tokio::test]
    async fn validate_file_runs_both_checks() {
        let v = FileValidator::default();
        let bogus = InMemorySource::new("fake.ifc", b"PK\x03\x04 zip archive".to_vec());
        let report: ValidationReport = v.validate_file(&bogus).await.into();
        assert!(!report.is_valid);

        let wrong_ext = InMemorySource::new("model.txt", b"ISO-10303-21;".to_vec());
        assert!(matches!(
            v.validate_file(&wrong_ext).await,
            Err(ValidationError::UnsupportedType { .. })
        ));
    }
}
