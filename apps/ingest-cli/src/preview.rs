use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;

use aecaxis_transfer::{
    AnalysisMode, ContentAnalyzer, ContentPreview, FileValidator, SourceFile, format_bytes,
};

pub async fn run(file: &Path, quick: bool, json: bool, validator: &FileValidator) -> anyhow::Result<()> {
    let source = SourceFile::open(file)
        .await
        .with_context(|| format!("cannot open {}", file.display()))?;

    let report = validator.report(source.name(), source.size());
    if let Some(error) = &report.error {
        tracing::warn!(file = source.name(), %error, "file would be rejected for upload");
    }

    let mode = if quick {
        AnalysisMode::Quick
    } else {
        AnalysisMode::Full
    };
    let preview = ContentAnalyzer::new()
        .analyze(&source, mode)
        .await
        .with_context(|| format!("cannot analyze {}", source.name()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
    } else {
        print!("{}", render(&preview, mode));
    }
    Ok(())
}

fn render(preview: &ContentPreview, mode: AnalysisMode) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "File:        {}", preview.file_name);
    let _ = writeln!(out, "Size:        {}", format_bytes(preview.file_size));
    let _ = writeln!(out, "Schema:      {}", preview.format_version);
    if let Some(name) = &preview.project_name {
        let _ = writeln!(out, "Project:     {name}");
    }
    if let Some(units) = &preview.units {
        let _ = writeln!(out, "Units:       {units}");
    }
    if let Some(crs) = &preview.coordinate_system {
        let _ = writeln!(out, "Coordinates: {crs}");
    }

    if mode == AnalysisMode::Full {
        let e = &preview.entities;
        let _ = writeln!(out, "Elements:    {}", preview.total_elements);
        for (label, count) in [
            ("beams", e.beams),
            ("columns", e.columns),
            ("walls", e.walls),
            ("slabs", e.slabs),
            ("doors", e.doors),
            ("windows", e.windows),
        ] {
            let _ = writeln!(out, "  {label:<10} {count}");
        }
    }

    let _ = writeln!(
        out,
        "Complexity:  {:?} (processing {})",
        preview.complexity,
        preview.complexity.estimated_processing_time()
    );
    out
}
