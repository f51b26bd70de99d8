use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messages::ServerMessage;

/// Coarse category of an inbound push message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    FileStatusUpdate,
    SubscriptionAck,
    Quote,
    PriceUpdate,
    Notification,
    Presence,
    DeadlineWarning,
    Unknown,
}

/// A push message tagged with its category, the id it concerns and the
/// local receipt time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub kind: EventKind,
    /// File id, RFQ id, material id or supplier id depending on `kind`.
    pub subject_id: String,
    pub payload: ServerMessage,
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    pub fn new(payload: ServerMessage, received_at: DateTime<Utc>) -> Self {
        let (kind, subject_id) = classify(&payload);
        Self {
            kind,
            subject_id,
            payload,
            received_at,
        }
    }

    /// Tags a message with the current time.
    pub fn now(payload: ServerMessage) -> Self {
        Self::new(payload, Utc::now())
    }
}

fn classify(msg: &ServerMessage) -> (EventKind, String) {
    match msg {
        ServerMessage::IfcStatusUpdate(u) => (EventKind::FileStatusUpdate, u.ifc_file_id.clone()),
        ServerMessage::Subscribed { project_id } => (EventKind::SubscriptionAck, project_id.clone()),
        ServerMessage::SubscribedRfq { rfq_id } => (EventKind::SubscriptionAck, rfq_id.clone()),
        ServerMessage::QuoteReceived(q) => (EventKind::Quote, q.rfq_id.clone()),
        ServerMessage::PriceUpdate(p) => (
            EventKind::PriceUpdate,
            p.material().unwrap_or(&p.rfq_id).to_string(),
        ),
        ServerMessage::Notification(n) => (EventKind::Notification, n.rfq_id.clone()),
        ServerMessage::SupplierOnline(p) | ServerMessage::SupplierOffline(p) => (
            EventKind::Presence,
            p.supplier().unwrap_or_default().to_string(),
        ),
        ServerMessage::DeadlineWarning(d) => (EventKind::DeadlineWarning, d.rfq_id.clone()),
        ServerMessage::Unknown => (EventKind::Unknown, String::new()),
    }
}
