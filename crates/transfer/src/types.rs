use std::time::Duration;

use serde::Serialize;

use crate::classify::ErrorRecord;
use crate::progress::ProgressSnapshot;

/// Lifecycle of a transfer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Idle,
    Uploading,
    Completed,
    Error,
}

impl TransferState {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: TransferState) -> bool {
        use TransferState::*;
        matches!(
            (self, next),
            (Idle, Uploading)
                | (Uploading, Completed)
                | (Uploading, Error)
                | (Uploading, Idle)
                | (Error, Uploading)
                | (Error, Idle)
                | (Completed, Idle)
        )
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: u64,
    pub file_name: String,
    pub project_id: String,
    pub state: TransferState,
    pub progress: Option<ProgressSnapshot>,
    pub error: Option<ErrorRecord>,
    pub retry_count: u32,
}

/// Notifications emitted while a transfer runs.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    StateChanged {
        session_id: u64,
        state: TransferState,
    },
    Progress {
        session_id: u64,
        snapshot: ProgressSnapshot,
    },
    Retrying {
        session_id: u64,
        attempt: u32,
        delay: Duration,
        error: ErrorRecord,
    },
}

impl TransferEvent {
    pub fn session_id(&self) -> u64 {
        match self {
            Self::StateChanged { session_id, .. }
            | Self::Progress { session_id, .. }
            | Self::Retrying { session_id, .. } => *session_id,
        }
    }
}

/// Mutable session record owned by the controller.
#[derive(Debug)]
pub(crate) struct TransferSession {
    id: u64,
    file_name: String,
    project_id: String,
    state: TransferState,
    progress: Option<ProgressSnapshot>,
    error: Option<ErrorRecord>,
    retry_count: u32,
}

impl TransferSession {
    pub(crate) fn new(id: u64, file_name: String, project_id: String) -> Self {
        Self {
            id,
            file_name,
            project_id,
            state: TransferState::Idle,
            progress: None,
            error: None,
            retry_count: 0,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn state(&self) -> TransferState {
        self.state
    }

    /// Applies a transition. Returns `false` and leaves the state alone if
    /// the move is not allowed.
    pub(crate) fn transition(&mut self, next: TransferState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                session = self.id,
                from = ?self.state,
                to = ?next,
                "rejected transfer state transition"
            );
            return false;
        }
        if next == TransferState::Uploading {
            self.error = None;
        }
        self.state = next;
        true
    }

    pub(crate) fn set_progress(&mut self, snapshot: ProgressSnapshot) {
        self.progress = Some(snapshot);
    }

    pub(crate) fn set_error(&mut self, error: ErrorRecord) {
        self.error = Some(error);
    }

    pub(crate) fn increment_retry(&mut self) -> u32 {
        self.retry_count += 1;
        self.retry_count
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            file_name: self.file_name.clone(),
            project_id: self.project_id.clone(),
            state: self.state,
            progress: self.progress.clone(),
            error: self.error.clone(),
            retry_count: self.retry_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorKind;

    #[test]
    fn allowed_transitions() {
        use TransferState::*;
        assert!(Idle.can_transition_to(Uploading));
        assert!(Uploading.can_transition_to(Completed));
        assert!(Error.can_transition_to(Uploading));
        assert!(Completed.can_transition_to(Idle));

        assert!(!Idle.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Uploading));
        assert!(!Idle.can_transition_to(Error));
    }

    #[test]
    fn session_rejects_illegal_move() {
        let mut s = TransferSession::new(1, "a.ifc".into(), "p".into());
        assert!(!s.transition(TransferState::Completed));
        assert_eq!(s.state(), TransferState::Idle);

        assert!(s.transition(TransferState::Uploading));
        s.set_error(ErrorRecord::new(ErrorKind::Server, "boom", true));
        assert!(s.transition(TransferState::Error));
        assert!(s.snapshot().error.is_some());

        // Re-entering Uploading clears the previous error.
        assert!(s.transition(TransferState::Uploading));
        assert_eq!(s.snapshot().error, None);
    }
}
