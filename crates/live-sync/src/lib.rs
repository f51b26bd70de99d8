//! Live updates from the AEC Axis backend.
//!
//! Provides the push-channel WebSocket client, a reconnecting subscription
//! session, and the bridge that reconciles pushed events into a local
//! status cache.

pub mod bridge;
pub mod client;
mod pumps;
pub mod session;
pub mod types;

pub use bridge::{
    ActivityItem, BridgeConfig, BridgeUpdate, FileStatusEntry, StatusBridge, StatusCache,
    SupplierState,
};
pub use client::{Connector, PushClient, PushError, WsConnector};
pub use session::{PushSession, SessionConfig, Subscriptions};
pub use types::{ChannelConfig, ConnectionState, LiveSyncEvent, ReconnectConfig};
