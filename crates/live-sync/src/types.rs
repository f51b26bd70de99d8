//! Public types for the push-channel session.

use std::time::Duration;

use aecaxis_protocol::InboundEvent;
use aecaxis_protocol::constants::WS_PATH;

/// Connection state of a push session.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// WebSocket handshake in progress.
    Connecting,
    /// Connected and subscribed.
    Connected,
    /// Connection lost, waiting before the next attempt.
    Reconnecting { attempt: u32 },
    /// Closed by the client.
    Disconnected,
}

/// Events emitted by a [`PushSession`](crate::PushSession).
#[derive(Debug, Clone)]
pub enum LiveSyncEvent {
    StateChanged(ConnectionState),
    /// A reconnect attempt is scheduled.
    Reconnecting { attempt: u32, next_retry_secs: f64 },
    /// A message pushed by the backend.
    Inbound(InboundEvent),
}

/// Where the push channel lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// `ws://` or `wss://` origin of the backend.
    pub ws_base_url: String,
    pub client_id: String,
}

impl ChannelConfig {
    /// `{ws_base_url}/ws/{client_id}`.
    pub fn url(&self) -> String {
        format!(
            "{}{}/{}",
            self.ws_base_url.trim_end_matches('/'),
            WS_PATH,
            self.client_id
        )
    }
}

/// Configuration for automatic reconnection with exponential backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(15),
            backoff_factor: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Delay for a 1-based attempt number, with ±25% jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        let offset = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as f64
            / 1_000_000_000.0)
            * 2.0
            - 1.0; // [-1.0, 1.0)
        let with_jitter = (capped + capped * 0.25 * offset).max(0.05);
        Duration::from_secs_f64(with_jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_url_appends_client_id() {
        let cfg = ChannelConfig {
            ws_base_url: "ws://localhost:8000/".into(),
            client_id: "c-1".into(),
        };
        assert_eq!(cfg.url(), "ws://localhost:8000/ws/c-1");
    }

    #[test]
    fn reconnecting_states_compare_by_attempt() {
        assert_eq!(
            ConnectionState::Reconnecting { attempt: 1 },
            ConnectionState::Reconnecting { attempt: 1 },
        );
        assert_ne!(
            ConnectionState::Reconnecting { attempt: 1 },
            ConnectionState::Reconnecting { attempt: 2 },
        );
    }

    #[test]
    fn reconnect_delay_backoff() {
        let config = ReconnectConfig::default();
        // 250ms, 500ms, 1s, 2s, 4s, 8s, then capped at 15s.
        let expected = [0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 15.0, 15.0];
        for (i, &base) in expected.iter().enumerate() {
            let secs = config.delay_for_attempt((i + 1) as u32).as_secs_f64();
            let (lo, hi) = (base * 0.74, base * 1.26);
            assert!(
                secs >= lo && secs <= hi,
                "attempt {}: {secs:.3}s not in [{lo:.3}, {hi:.3}]",
                i + 1
            );
        }
    }
}
