//! Client configuration.
//!
//! Stored as TOML:
//! - Linux: `~/.config/aecaxis/ingest.toml`
//! - Windows: `%APPDATA%/aecaxis/ingest.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use aecaxis_live_sync::{BridgeConfig, ChannelConfig};
use aecaxis_protocol::constants::{ALLOWED_EXTENSIONS, MAX_UPLOAD_SIZE};
use aecaxis_transfer::FileValidator;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Base URL of the REST API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Base URL of the push channel (`ws://` or `wss://`).
    #[serde(default = "default_ws_base_url")]
    pub ws_base_url: String,

    /// Bearer token for the upload endpoint.
    #[serde(default)]
    pub token: String,

    /// Identifier used in the push-channel path. Generated on first run.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,

    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,

    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,

    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: u32,

    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,

    #[serde(default = "default_price_throttle_ms")]
    pub price_throttle_ms: u64,
}

fn default_api_base_url() -> String {
    "http://localhost:8000".into()
}

fn default_ws_base_url() -> String {
    "ws://localhost:8000".into()
}

fn default_client_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_max_file_size_mb() -> u64 {
    MAX_UPLOAD_SIZE / MIB
}

fn default_allowed_extensions() -> Vec<String> {
    ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_batch_window_ms() -> u64 {
    100
}

fn default_rate_limit_max() -> u32 {
    100
}

fn default_rate_limit_window_ms() -> u64 {
    1000
}

fn default_price_throttle_ms() -> u64 {
    500
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            ws_base_url: default_ws_base_url(),
            token: String::new(),
            client_id: default_client_id(),
            max_file_size_mb: default_max_file_size_mb(),
            allowed_extensions: default_allowed_extensions(),
            batch_window_ms: default_batch_window_ms(),
            rate_limit_max: default_rate_limit_max(),
            rate_limit_window_ms: default_rate_limit_window_ms(),
            price_throttle_ms: default_price_throttle_ms(),
        }
    }
}

impl IngestConfig {
    /// Loads from the platform path, creating it with defaults if missing.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Loads from `path`, creating it with defaults if missing.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: IngestConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = IngestConfig::default();
            config.save_to(path)?;
            tracing::info!(path = %path.display(), "created default configuration");
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Restrict permissions on Unix (may contain the API token).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Token to send, if one is configured.
    pub fn token(&self) -> Option<&str> {
        Some(self.token.as_str()).filter(|t| !t.is_empty())
    }

    pub fn validator(&self) -> FileValidator {
        FileValidator::new(
            &self.allowed_extensions,
            self.max_file_size_mb.saturating_mul(MIB),
        )
    }

    pub fn channel(&self) -> ChannelConfig {
        ChannelConfig {
            ws_base_url: self.ws_base_url.clone(),
            client_id: self.client_id.clone(),
        }
    }

    pub fn bridge(&self) -> BridgeConfig {
        BridgeConfig {
            batch_window: Duration::from_millis(self.batch_window_ms),
            rate_limit_max: self.rate_limit_max,
            rate_limit_window: Duration::from_millis(self.rate_limit_window_ms),
            price_throttle: Duration::from_millis(self.price_throttle_ms),
            ..BridgeConfig::default()
        }
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("aecaxis")
            .join("ingest.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("aecaxis").join("ingest.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/aecaxis/ingest.toml"))
    }
}
