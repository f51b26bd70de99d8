//! Client-side ingestion of IFC models: pre-flight validation, content
//! preview, progress estimation and a retrying upload controller.

mod analyzer;
mod classify;
mod controller;
mod http;
mod progress;
mod source;
mod types;
mod uploader;
mod validation;

pub use analyzer::{
    AnalysisMode, ComplexityTier, ContentAnalyzer, ContentPreview, EntityCounts, ParseError,
};
pub use classify::{
    ErrorGuidance, ErrorKind, ErrorRecord, MAX_RETRIES, RetryDecision, RetryPolicy,
    TransportOutcome, classify,
};
pub use controller::{
    PROGRESS_INTERVAL, TransferController, TransferControllerBuilder, TransferHandle,
};
pub use http::HttpUploader;
pub use progress::{
    ProgressEstimator, ProgressSnapshot, SAMPLE_CAPACITY, SMOOTHING_WINDOW, SpeedSample,
    format_bytes, format_eta, format_speed, percentage, weighted_average,
};
pub use source::{ByteRangeReader, InMemorySource, SourceFile};
pub use types::{SessionSnapshot, TransferEvent, TransferState};
pub use uploader::{ByteProgress, UploadRequest, Uploader};
pub use validation::{FileValidator, ValidationError, ValidationReport, looks_like_exchange_file};

/// Errors returned when a transfer cannot be started.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("a transfer is already running (session {0})")]
    Busy(u64),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid API token")]
    InvalidToken,

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
