//! Maps transport outcomes onto the transfer error taxonomy and decides
//! whether and when to retry.

use std::time::Duration;

use serde::Serialize;

/// Retries allowed after the first attempt.
pub const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Validation,
    Server,
    Timeout,
    Cancelled,
    Unknown,
}

/// A classified transfer failure.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<String>,
    /// HTTP status, when the server answered.
    pub code: Option<u16>,
    pub recoverable: bool,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            code: None,
            recoverable,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_details(mut self, details: Option<String>) -> Self {
        self.details = details;
        self
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Upload cancelled", false)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    pub fn guidance(&self) -> ErrorGuidance {
        let (title, suggestions) = match self.kind {
            ErrorKind::Network => (
                "Connection problem",
                vec![
                    "Check your internet connection",
                    "The upload will retry automatically",
                ],
            ),
            ErrorKind::Validation => (
                "File rejected",
                vec![
                    "Make sure the file is an .ifc export",
                    "Files must be 500 MB or smaller",
                    "Re-export the model from your authoring tool",
                ],
            ),
            ErrorKind::Server if self.code == Some(429) => (
                "Server busy",
                vec!["Too many uploads at once; the upload will retry shortly"],
            ),
            ErrorKind::Server if matches!(self.code, Some(401 | 403)) => (
                "Not authorized",
                vec![
                    "Sign in again",
                    "Check that you have access to this project",
                ],
            ),
            ErrorKind::Server => (
                "Server error",
                vec![
                    "The server had a temporary problem",
                    "Try again in a few minutes if retries fail",
                ],
            ),
            ErrorKind::Timeout => (
                "Upload timed out",
                vec![
                    "Check your connection speed",
                    "Large models can take several minutes to upload",
                ],
            ),
            ErrorKind::Cancelled => ("Upload cancelled", vec!["Start the upload again when ready"]),
            ErrorKind::Unknown => (
                "Unexpected error",
                vec!["Try again", "Contact support if the problem persists"],
            ),
        };

        ErrorGuidance {
            title,
            suggestions,
            can_retry: self.recoverable,
            // Only a recoverable error leaves a retry pending.
            can_cancel: self.recoverable,
        }
    }
}

/// Remediation shown next to an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorGuidance {
    pub title: &'static str,
    pub suggestions: Vec<&'static str>,
    pub can_retry: bool,
    pub can_cancel: bool,
}

/// What the transport reported for a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOutcome {
    /// No route to the server (offline, DNS, connection refused).
    Offline(String),
    /// The server answered with a non-success status.
    Status { code: u16, detail: Option<String> },
    /// The client-side deadline expired.
    TimedOut,
    /// The client aborted the request.
    Aborted,
    Other(String),
}

pub fn classify(outcome: &TransportOutcome) -> ErrorRecord {
    match outcome {
        TransportOutcome::Offline(reason) => {
            ErrorRecord::new(ErrorKind::Network, "No network connection", true)
                .with_details(Some(reason.clone()))
        }
        TransportOutcome::TimedOut => {
            ErrorRecord::new(ErrorKind::Timeout, "Upload timed out", true)
        }
        TransportOutcome::Aborted => ErrorRecord::cancelled(),
        TransportOutcome::Other(reason) => {
            ErrorRecord::new(ErrorKind::Unknown, "Upload failed", true)
                .with_details(Some(reason.clone()))
        }
        TransportOutcome::Status { code, detail } => {
            let (kind, message, recoverable) = match code {
                413 => (ErrorKind::Validation, "File is too large for the server", false),
                415 => (ErrorKind::Validation, "File type is not supported", false),
                400 => (ErrorKind::Validation, "The server rejected the file", false),
                401 | 403 => (ErrorKind::Server, "Not authorized to upload to this project", true),
                408 | 504 => (ErrorKind::Timeout, "Upload timed out", true),
                429 => (ErrorKind::Server, "Too many requests", true),
                500 | 502 | 503 => (ErrorKind::Server, "Server error", true),
                _ => (ErrorKind::Unknown, "Upload failed", true),
            };
            ErrorRecord::new(kind, message, recoverable)
                .with_code(*code)
                .with_details(detail.clone())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub can_retry: bool,
    pub delay: Duration,
}

/// Bounded retry with a delay chosen per error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// `retry_count` is the number of retries already made.
    pub fn decide(&self, error: &ErrorRecord, retry_count: u32) -> RetryDecision {
        let can_retry = error.recoverable && retry_count < self.max_retries;
        RetryDecision {
            can_retry,
            delay: if can_retry {
                retry_delay(error)
            } else {
                Duration::ZERO
            },
        }
    }
}

fn retry_delay(error: &ErrorRecord) -> Duration {
    let ms = match error.kind {
        ErrorKind::Network => 2_000,
        ErrorKind::Timeout => 5_000,
        ErrorKind::Server if error.code == Some(429) => 10_000,
        ErrorKind::Server => 3_000,
        ErrorKind::Unknown => 1_000,
        ErrorKind::Validation | ErrorKind::Cancelled => 0,
    };
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ErrorRecord {
        classify(&TransportOutcome::Status { code, detail: None })
    }

    #[test]
    fn retry_table() {
        let policy = RetryPolicy::default();

        let d = policy.decide(&status(413), 0);
        assert!(!d.can_retry);

        let d = policy.decide(&status(500), 0);
        assert!(d.can_retry);
        assert_eq!(d.delay, Duration::from_millis(3000));

        let d = policy.decide(&status(429), 0);
        assert!(d.can_retry);
        assert_eq!(d.delay, Duration::from_millis(10_000));

        let d = policy.decide(&status(504), 1);
        assert_eq!(d.delay, Duration::from_millis(5000));

        let d = policy.decide(&status(401), 2);
        assert_eq!(d.delay, Duration::from_millis(3000));

        let d = policy.decide(&status(418), 0);
        assert_eq!(d.delay, Duration::from_millis(1000));

        let d = policy.decide(&classify(&TransportOutcome::Offline("refused".into())), 0);
        assert_eq!(d.delay, Duration::from_millis(2000));
    }

    #[test]
    fn classification_kinds() {
        assert_eq!(status(400).kind, ErrorKind::Validation);
        assert_eq!(status(415).kind, ErrorKind::Validation);
        assert_eq!(status(403).kind, ErrorKind::Server);
        assert_eq!(status(408).kind, ErrorKind::Timeout);
        assert_eq!(status(502).kind, ErrorKind::Server);
        assert_eq!(status(599).kind, ErrorKind::Unknown);
        assert_eq!(classify(&TransportOutcome::TimedOut).kind, ErrorKind::Timeout);
        assert_eq!(status(413).code, Some(413));
    }

    #[test]
    fn abort_is_cancelled_and_terminal() {
        let record = classify(&TransportOutcome::Aborted);
        assert!(record.is_cancelled());
        assert!(!RetryPolicy::default().decide(&record, 0).can_retry);
        assert!(!record.guidance().can_cancel);
    }

    #[test]
    fn retries_stop_after_three() {
        let policy = RetryPolicy::default();
        let err = status(503);
        assert!(policy.decide(&err, 2).can_retry);
        let d = policy.decide(&err, 3);
        assert!(!d.can_retry);
        assert_eq!(d.delay, Duration::ZERO);
    }

    #[test]
    fn server_detail_is_kept() {
        let record = classify(&TransportOutcome::Status {
            code: 400,
            detail: Some("Only IFC files are allowed".into()),
        });
        assert_eq!(record.details.as_deref(), Some("Only IFC files are allowed"));
        assert_eq!(record.to_string(), "The server rejected the file");
    }

    #[test]
    fn guidance_per_kind() {
        let g = status(413).guidance();
        assert_eq!(g.title, "File rejected");
        assert!(!g.can_retry);
        assert!(!g.can_cancel);

        let g = status(503).guidance();
        assert!(g.can_retry);
        assert!(g.can_cancel);

        assert_eq!(status(429).guidance().title, "Server busy");
        assert_eq!(status(401).guidance().title, "Not authorized");
        assert_eq!(status(500).guidance().title, "Server error");
        assert!(!status(500).guidance().suggestions.is_empty());
    }
}
