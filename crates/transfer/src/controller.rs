//! Single-slot upload controller with classified retries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use aecaxis_flow::{SharedClock, SystemClock, Throttle, ThrottleOptions};
use aecaxis_protocol::FileDescriptor;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::TransferError;
use crate::classify::{ErrorKind, ErrorRecord, RetryPolicy, TransportOutcome, classify};
use crate::progress::{ProgressEstimator, ProgressSnapshot};
use crate::source::SourceFile;
use crate::types::{SessionSnapshot, TransferEvent, TransferSession, TransferState};
use crate::uploader::{ByteProgress, UploadRequest, Uploader};
use crate::validation::FileValidator;

/// Minimum spacing between emitted progress events.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

const PROGRESS_BUFFER: usize = 64;

/// Runs at most one upload at a time.
///
/// Each call to [`start`](Self::start) opens a new session with its own
/// event channel. Work from a session that has since been reset or replaced
/// never touches the current one.
#[derive(Clone)]
pub struct TransferController {
    inner: Arc<Inner>,
}

struct Inner {
    uploader: Arc<dyn Uploader>,
    validator: FileValidator,
    policy: RetryPolicy,
    clock: SharedClock,
    progress_interval: Duration,
    slot: Mutex<Option<Slot>>,
    next_id: AtomicU64,
}

struct Slot {
    session: TransferSession,
    cancel: CancellationToken,
}

impl Slot {
    fn is_active(&self) -> bool {
        matches!(
            self.session.state(),
            TransferState::Uploading | TransferState::Error
        )
    }
}

impl TransferController {
    pub fn new(uploader: Arc<dyn Uploader>) -> Self {
        Self::builder(uploader).build()
    }

    pub fn builder(uploader: Arc<dyn Uploader>) -> TransferControllerBuilder {
        TransferControllerBuilder {
            uploader,
            validator: FileValidator::default(),
            policy: RetryPolicy::default(),
            clock: SystemClock::shared(),
            progress_interval: PROGRESS_INTERVAL,
        }
    }

    /// Validates `file` and spawns the upload.
    ///
    /// The returned handle's event channel exists before the task starts, so
    /// the first `StateChanged(Uploading)` is always observable.
    pub fn start(
        &self,
        file: SourceFile,
        project_id: impl Into<String>,
    ) -> Result<TransferHandle, TransferError> {
        let project_id = project_id.into();
        let mut slot = self.inner.lock_slot();
        if let Some(current) = slot.as_ref().filter(|s| s.is_active()) {
            return Err(TransferError::Busy(current.session.id()));
        }

        self.inner.validator.validate(file.name(), file.size())?;

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let mut session = TransferSession::new(id, file.name().to_string(), project_id.clone());
        session.transition(TransferState::Uploading);
        let _ = events_tx.send(TransferEvent::StateChanged {
            session_id: id,
            state: TransferState::Uploading,
        });
        *slot = Some(Slot {
            session,
            cancel: cancel.clone(),
        });
        drop(slot);

        info!(session = id, file = file.name(), project = %project_id, "upload started");
        let task = tokio::spawn(Arc::clone(&self.inner).run(
            id,
            file,
            project_id,
            events_tx,
            cancel.clone(),
        ));

        Ok(TransferHandle {
            session_id: id,
            events: events_rx,
            task,
            cancel,
        })
    }

    /// Cancels the running session, if any.
    pub fn cancel(&self) {
        if let Some(slot) = self.inner.lock_slot().as_ref() {
            slot.cancel.cancel();
        }
    }

    /// Cancels any running session and clears the slot.
    pub fn reset(&self) {
        if let Some(slot) = self.inner.lock_slot().take() {
            slot.cancel.cancel();
        }
    }

    pub fn session(&self) -> Option<SessionSnapshot> {
        self.inner.lock_slot().as_ref().map(|s| s.session.snapshot())
    }

    pub fn state(&self) -> TransferState {
        self.inner
            .lock_slot()
            .as_ref()
            .map_or(TransferState::Idle, |s| s.session.state())
    }
}

pub struct TransferControllerBuilder {
    uploader: Arc<dyn Uploader>,
    validator: FileValidator,
    policy: RetryPolicy,
    clock: SharedClock,
    progress_interval: Duration,
}

impl TransferControllerBuilder {
    pub fn validator(mut self, validator: FileValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn build(self) -> TransferController {
        TransferController {
            inner: Arc::new(Inner {
                uploader: self.uploader,
                validator: self.validator,
                policy: self.policy,
                clock: self.clock,
                progress_interval: self.progress_interval,
                slot: Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
        }
    }
}

/// Caller's side of one upload session.
pub struct TransferHandle {
    session_id: u64,
    events: mpsc::UnboundedReceiver<TransferEvent>,
    task: JoinHandle<Result<FileDescriptor, ErrorRecord>>,
    cancel: CancellationToken,
}

impl TransferHandle {
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Next event, or `None` once the session has ended and every event
    /// has been delivered.
    pub async fn next_event(&mut self) -> Option<TransferEvent> {
        self.events.recv().await
    }

    /// Waits for the terminal result.
    pub async fn finish(self) -> Result<FileDescriptor, ErrorRecord> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ErrorRecord::new(
                ErrorKind::Unknown,
                format!("transfer task failed: {e}"),
                false,
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Session task
// ---------------------------------------------------------------------------

type Events = mpsc::UnboundedSender<TransferEvent>;

impl Inner {
    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Option<Slot>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` against session `id` if it still owns the slot.
    fn with_session<R>(&self, id: u64, f: impl FnOnce(&mut TransferSession) -> R) -> Option<R> {
        let mut slot = self.lock_slot();
        match slot.as_mut() {
            Some(s) if s.session.id() == id => Some(f(&mut s.session)),
            _ => None,
        }
    }

    fn transition(&self, id: u64, next: TransferState, events: &Events) {
        if self.with_session(id, |s| s.transition(next)) == Some(true) {
            let _ = events.send(TransferEvent::StateChanged {
                session_id: id,
                state: next,
            });
        }
    }

    fn emit_progress(&self, id: u64, snapshot: ProgressSnapshot, events: &Events) {
        let current = self
            .with_session(id, |s| s.set_progress(snapshot.clone()))
            .is_some();
        if current {
            let _ = events.send(TransferEvent::Progress {
                session_id: id,
                snapshot,
            });
        }
    }

    fn cancelled(&self, id: u64, events: &Events) -> ErrorRecord {
        let record = ErrorRecord::cancelled();
        self.with_session(id, |s| s.set_error(record.clone()));
        self.transition(id, TransferState::Idle, events);
        info!(session = id, "upload cancelled");
        record
    }

    async fn run(
        self: Arc<Self>,
        id: u64,
        file: SourceFile,
        project_id: String,
        events: Events,
        cancel: CancellationToken,
    ) -> Result<FileDescriptor, ErrorRecord> {
        let mut estimator = ProgressEstimator::new(Arc::clone(&self.clock));
        let mut retry_count = 0u32;

        loop {
            let outcome = self
                .attempt(id, &file, &project_id, &mut estimator, &events, &cancel)
                .await;

            let outcome = match outcome {
                Ok(descriptor) => {
                    let done = estimator.update(file.size(), file.size());
                    self.emit_progress(id, done, &events);
                    self.transition(id, TransferState::Completed, &events);
                    info!(session = id, file_id = %descriptor.id, "upload completed");
                    return Ok(descriptor);
                }
                Err(outcome) => outcome,
            };

            let record = classify(&outcome);
            if record.is_cancelled() || cancel.is_cancelled() {
                return Err(self.cancelled(id, &events));
            }

            self.with_session(id, |s| s.set_error(record.clone()));
            self.transition(id, TransferState::Error, &events);

            let decision = self.policy.decide(&record, retry_count);
            if !decision.can_retry {
                warn!(session = id, error = %record, retries = retry_count, "upload failed");
                self.transition(id, TransferState::Idle, &events);
                return Err(record);
            }

            retry_count = self
                .with_session(id, TransferSession::increment_retry)
                .unwrap_or(retry_count + 1);
            warn!(
                session = id,
                error = %record,
                attempt = retry_count,
                delay_ms = decision.delay.as_millis() as u64,
                "upload failed, retrying"
            );
            let _ = events.send(TransferEvent::Retrying {
                session_id: id,
                attempt: retry_count,
                delay: decision.delay,
                error: record,
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled(id, &events)),
                _ = tokio::time::sleep(decision.delay) => {}
            }
            self.transition(id, TransferState::Uploading, &events);
        }
    }

    async fn attempt(
        &self,
        id: u64,
        file: &SourceFile,
        project_id: &str,
        estimator: &mut ProgressEstimator,
        events: &Events,
        cancel: &CancellationToken,
    ) -> Result<FileDescriptor, TransportOutcome> {
        let (progress_tx, mut progress_rx) = mpsc::channel::<ByteProgress>(PROGRESS_BUFFER);
        let mut throttle = Throttle::new(
            self.progress_interval,
            ThrottleOptions::default(),
            Arc::clone(&self.clock),
        );

        let upload = self.uploader.upload(
            UploadRequest { file, project_id },
            progress_tx,
            cancel.clone(),
        );
        tokio::pin!(upload);

        let result = loop {
            let deadline = throttle.next_deadline();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(TransportOutcome::Aborted),
                Some(p) = progress_rx.recv() => {
                    let snapshot = estimator.update(p.loaded, p.total);
                    if let Some(snapshot) = throttle.fire(snapshot) {
                        self.emit_progress(id, snapshot, events);
                    }
                }
                _ = sleep_until(deadline), if deadline.is_some() => {
                    if let Some(snapshot) = throttle.poll_due() {
                        self.emit_progress(id, snapshot, events);
                    }
                }
                res = &mut upload => break res,
            }
        };

        while let Ok(p) = progress_rx.try_recv() {
            if let Some(snapshot) = throttle.fire(estimator.update(p.loaded, p.total)) {
                self.emit_progress(id, snapshot, events);
            }
        }
        if let Some(snapshot) = throttle.flush_pending() {
            self.emit_progress(id, snapshot, events);
        }

        result
    }
}

async fn sleep_until(deadline: Option<std::time::Instant>) {
    if let Some(at) = deadline {
        tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await;
    }
}
