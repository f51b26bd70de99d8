use std::fmt;

use serde::{Deserialize, Serialize};

/// Processing status of an uploaded IFC file as reported by the backend.
///
/// The backend uses upper-case status strings. Unrecognized values are kept
/// verbatim in [`IfcFileStatus::Other`] so they still reach the UI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IfcFileStatus {
    Pending,
    Processing,
    Completed,
    Processed,
    Error,
    Failed,
    Other(String),
}

impl IfcFileStatus {
    /// Whether the backend will send no further updates for this file.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Processed | Self::Error | Self::Failed
        )
    }

    /// Whether processing ended in failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error | Self::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Processed => "PROCESSED",
            Self::Error => "ERROR",
            Self::Failed => "FAILED",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for IfcFileStatus {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Self::Pending,
            "PROCESSING" => Self::Processing,
            "COMPLETED" => Self::Completed,
            "PROCESSED" => Self::Processed,
            "ERROR" => Self::Error,
            "FAILED" => Self::Failed,
            _ => Self::Other(s),
        }
    }
}

impl From<IfcFileStatus> for String {
    fn from(status: IfcFileStatus) -> Self {
        match status {
            IfcFileStatus::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for IfcFileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptor returned by the upload endpoint on success.
///
/// Accepts both the client-facing field names and the backend's ORM names
/// (`original_filename`, `created_at`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub id: String,
    #[serde(alias = "original_filename")]
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, alias = "created_at", skip_serializing_if = "Option::is_none")]
    pub upload_date: Option<String>,
    pub status: IfcFileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}
