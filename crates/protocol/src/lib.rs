//! Wire protocol for the AEC Axis ingest client.
//!
//! Covers the upload endpoint's file descriptor, the push-channel message
//! set and the normalized [`InboundEvent`] consumers reconcile against.

pub mod constants;
pub mod event;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use event::{EventKind, InboundEvent};
pub use messages::{ClientMessage, ServerMessage};
pub use types::{FileDescriptor, IfcFileStatus};
