//! AEC Axis ingest client entry point.

mod config;
mod preview;
mod upload;
mod watch;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::IngestConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to the per-user location).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// API token, overriding the configured one.
    #[arg(long, env = "AECAXIS_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// REST API base URL, overriding the configured one.
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Push-channel base URL, overriding the configured one.
    #[arg(long, global = true)]
    ws_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show what an IFC file contains without uploading it
    Preview {
        file: PathBuf,
        /// Read only the first 10 kB and skip entity counts
        #[arg(long)]
        quick: bool,
        /// Print the preview as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload an IFC file to a project
    Upload {
        project_id: String,
        file: PathBuf,
        /// Validate the file and stop before uploading
        #[arg(long)]
        dry_run: bool,
    },
    /// Print live file-status and RFQ updates until interrupted
    Watch {
        project_id: String,
        /// RFQ to follow; may be repeated
        #[arg(long = "rfq", value_name = "RFQ_ID")]
        rfq_ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli);

    match cli.command {
        Commands::Preview { file, quick, json } => {
            preview::run(&file, quick, json, &config.validator()).await
        }
        Commands::Upload {
            project_id,
            file,
            dry_run,
        } => upload::run(&config, &project_id, &file, dry_run).await,
        Commands::Watch {
            project_id,
            rfq_ids,
        } => watch::run(&config, project_id, rfq_ids).await,
    }
}

fn load_config(cli: &Cli) -> IngestConfig {
    let loaded = match &cli.config {
        Some(path) => IngestConfig::load_from(path),
        None => IngestConfig::load(),
    };
    let mut config = match loaded {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            IngestConfig::default()
        }
    };

    if let Some(token) = &cli.token {
        config.token = token.clone();
    }
    if let Some(url) = &cli.api_url {
        config.api_base_url = url.clone();
    }
    if let Some(url) = &cli.ws_url {
        config.ws_base_url = url.clone();
    }
    config
}
