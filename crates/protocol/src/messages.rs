//! Push-channel messages exchanged with the backend over `/ws/{client_id}`.

use serde::{Deserialize, Serialize};

use crate::types::IfcFileStatus;

/// Messages sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to file-status updates for a project.
    Subscribe { project_id: String },
    /// Subscribe to quote, price and presence events for an RFQ.
    SubscribeRfq { rfq_id: String },
}

/// Messages pushed by the backend.
///
/// Types this client does not know about deserialize to
/// [`ServerMessage::Unknown`] instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Subscribed { project_id: String },
    SubscribedRfq { rfq_id: String },
    IfcStatusUpdate(IfcStatusUpdate),
    QuoteReceived(QuoteReceived),
    PriceUpdate(PriceUpdate),
    SupplierOnline(SupplierPresence),
    SupplierOffline(SupplierPresence),
    Notification(NotificationMessage),
    DeadlineWarning(DeadlineWarning),
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Wire name of the message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Subscribed { .. } => "subscribed",
            Self::SubscribedRfq { .. } => "subscribed_rfq",
            Self::IfcStatusUpdate(_) => "ifc_status_update",
            Self::QuoteReceived(_) => "quote_received",
            Self::PriceUpdate(_) => "price_update",
            Self::SupplierOnline(_) => "supplier_online",
            Self::SupplierOffline(_) => "supplier_offline",
            Self::Notification(_) => "notification",
            Self::DeadlineWarning(_) => "deadline_warning",
            Self::Unknown => "unknown",
        }
    }
}

/// Processing-status change for an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfcStatusUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub ifc_file_id: String,
    pub status: IfcFileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteReceived {
    pub rfq_id: String,
    pub supplier_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<QuoteSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSummary {
    #[serde(default)]
    pub submitted_at: Option<String>,
    #[serde(default)]
    pub items_count: u32,
    #[serde(default)]
    pub total_items: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub rfq_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub data: PriceChange,
}

impl PriceUpdate {
    /// Material the update refers to, from the body or the top level.
    pub fn material(&self) -> Option<&str> {
        self.data
            .material_id
            .as_deref()
            .or(self.material_id.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceChange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_change: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_change_percent: Option<f64>,
}

/// Supplier joined or left an RFQ dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierPresence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rfq_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub data: PresenceDetail,
}

impl SupplierPresence {
    pub fn supplier(&self) -> Option<&str> {
        self.data
            .supplier_id
            .as_deref()
            .or(self.supplier_id.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub rfq_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub data: NotificationBody,
}

/// User-facing notification content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Severity: `success`, `warning`, `info` or `error`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rfq_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Display duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadlineWarning {
    pub rfq_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    pub data: DeadlineDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadlineDetail {
    pub hours_remaining: i64,
    pub deadline: String,
    pub urgency_level: Urgency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Critical,
    Warning,
    Info,
}

impl Urgency {
    /// Urgency the backend assigns for a given number of hours left.
    pub fn for_hours(hours_remaining: i64) -> Self {
        if hours_remaining <= 2 {
            Self::Critical
        } else if hours_remaining <= 24 {
            Self::Warning
        } else {
            Self::Info
        }
    }
}
