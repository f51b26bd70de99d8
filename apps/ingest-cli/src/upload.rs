use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use aecaxis_protocol::FileDescriptor;
use aecaxis_transfer::{
    ErrorRecord, HttpUploader, SourceFile, TransferController, TransferEvent, format_bytes,
    format_speed,
};

use crate::config::IngestConfig;

pub async fn run(
    config: &IngestConfig,
    project_id: &str,
    file: &Path,
    dry_run: bool,
) -> anyhow::Result<()> {
    let source = SourceFile::open(file)
        .await
        .with_context(|| format!("cannot open {}", file.display()))?;
    let validator = config.validator();
    validator.validate_file(&source).await?;

    if dry_run {
        println!(
            "{} ({}) is ready to upload to project {project_id}",
            source.name(),
            format_bytes(source.size())
        );
        return Ok(());
    }

    let uploader = HttpUploader::new(&config.api_base_url, config.token())?;
    info!(endpoint = %uploader.endpoint(project_id), "uploading");
    let controller = TransferController::builder(Arc::new(uploader))
        .validator(validator)
        .build();

    let bar = progress_bar(source.size(), source.name());
    let mut handle = controller.start(source, project_id)?;

    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(event) => render_event(&bar, event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                bar.println("cancelling...");
                handle.cancel();
            }
        }
    }

    match handle.finish().await {
        Ok(descriptor) => {
            bar.finish_with_message("done");
            println!("{}", summary(&descriptor));
            Ok(())
        }
        Err(error) => {
            bar.abandon_with_message(error.message.clone());
            eprintln!("{}", explain(&error));
            Err(error.into())
        }
    }
}

fn progress_bar(total: u64, name: &str) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");
    bar.set_style(style);
    bar.set_prefix(name.to_string());
    bar
}

fn render_event(bar: &ProgressBar, event: TransferEvent) {
    match event {
        TransferEvent::Progress { snapshot, .. } => {
            bar.set_length(snapshot.total);
            bar.set_position(snapshot.loaded);
            bar.set_message(format!(
                "{} ETA {}",
                format_speed(snapshot.average_speed),
                snapshot.eta
            ));
        }
        TransferEvent::Retrying {
            attempt,
            delay,
            error,
            ..
        } => {
            bar.println(format!(
                "{}; retry {attempt} in {}s",
                error.message,
                delay.as_secs()
            ));
        }
        TransferEvent::StateChanged { state, .. } => debug!(?state, "transfer state"),
    }
}

fn summary(descriptor: &FileDescriptor) -> String {
    format!(
        "Uploaded {} as {} (status {})",
        descriptor.filename, descriptor.id, descriptor.status
    )
}

/// Human-readable failure with recovery suggestions.
fn explain(error: &ErrorRecord) -> String {
    let guidance = error.guidance();
    let mut out = format!("{}: {}", guidance.title, error.message);
    if let Some(details) = &error.details {
        out.push_str(&format!(" ({details})"));
    }
    for suggestion in &guidance.suggestions {
        out.push_str(&format!("\n  - {suggestion}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use aecaxis_protocol::IfcFileStatus;
    use aecaxis_transfer::{ErrorKind, TransportOutcome, classify};

    use super::*;

    #[test]
    fn summary_names_the_file() {
        let descriptor = FileDescriptor {
            id: "f-1".into(),
            filename: "tower.ifc".into(),
            file_size: Some(10),
            upload_date: None,
            status: IfcFileStatus::Pending,
            project_id: Some("p-1".into()),
        };
        assert_eq!(
            summary(&descriptor),
            "Uploaded tower.ifc as f-1 (status PENDING)"
        );
    }

    #[test]
    fn explain_includes_suggestions() {
        let error = classify(&TransportOutcome::Status {
            code: 413,
            detail: None,
        });
        assert_eq!(error.kind, ErrorKind::Validation);
        let text = explain(&error);
        assert!(text.lines().count() > 1);
        assert!(text.contains(&error.message));
    }

    #[tokio::test]
    async fn dry_run_validates_without_network() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tower.ifc");
        std::fs::write(&path, "ISO-10303-21;\nHEADER;\nENDSEC;\nDATA;\nENDSEC;\n").unwrap();

        let config = IngestConfig {
            api_base_url: "http://127.0.0.1:9".into(),
            ..IngestConfig::default()
        };
        run(&config, "p-1", &path, true).await.unwrap();
    }

    #[tokio::test]
    async fn dry_run_rejects_non_ifc_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("fake.ifc");
        std::fs::write(&path, "just some text").unwrap();

        let err = run(&IngestConfig::default(), "p-1", &path, true)
            .await
            .unwrap_err();
        assert!(err.to_string().to_lowercase().contains("ifc"));
    }
}
