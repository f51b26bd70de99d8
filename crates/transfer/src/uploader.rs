use std::future::Future;
use std::pin::Pin;

use aecaxis_protocol::FileDescriptor;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::classify::TransportOutcome;
use crate::source::SourceFile;

/// Cumulative bytes sent for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteProgress {
    pub loaded: u64,
    pub total: u64,
}

/// What to upload and where.
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    pub file: &'a SourceFile,
    pub project_id: &'a str,
}

/// One upload attempt against the ingestion backend.
///
/// Implementations report byte progress on `progress` (dropping updates
/// when the channel is full is fine) and must return
/// [`TransportOutcome::Aborted`] promptly once `cancel` fires.
pub trait Uploader: Send + Sync + 'static {
    fn upload<'a>(
        &'a self,
        request: UploadRequest<'a>,
        progress: mpsc::Sender<ByteProgress>,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<FileDescriptor, TransportOutcome>> + Send + 'a>>;
}
