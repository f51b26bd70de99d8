//! WebSocket client for the backend push channel.

use std::future::Future;
use std::pin::Pin;

use futures_util::{Sink, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use aecaxis_protocol::constants::WS_MAX_MESSAGE_SIZE;
use aecaxis_protocol::{ClientMessage, InboundEvent};

use crate::pumps::{read::read_pump, write::write_pump};
use crate::types::ChannelConfig;

/// Errors from the push-channel client.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed")]
    Closed,
}

/// A live push-channel connection.
///
/// Inbound messages go to the `inbound` sender given at construction; when
/// the connection dies the read pump drops that sender, so the receiver
/// observes `None`.
pub struct PushClient {
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    _read_handle: JoinHandle<()>,
    _write_handle: JoinHandle<()>,
}

impl PushClient {
    /// Opens `url` and starts the pumps.
    pub async fn connect(url: &str, inbound: mpsc::Sender<InboundEvent>) -> Result<Self, PushError> {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
        debug!(%url, "push channel connected");
        Ok(Self::from_stream(ws_stream, inbound))
    }

    /// Starts the pumps over an already-established WebSocket.
    pub fn from_stream<S>(stream: S, inbound: mpsc::Sender<InboundEvent>) -> Self
    where
        S: Stream<Item = Result<tungstenite::Message, tungstenite::Error>>
            + Sink<tungstenite::Message, Error = tungstenite::Error>
            + Send
            + 'static,
    {
        let (write, read) = stream.split();
        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(64);
        let cancel = CancellationToken::new();

        let write_handle = tokio::spawn(write_pump(write, write_rx, cancel.clone()));
        let read_handle = tokio::spawn(read_pump(
            read,
            inbound,
            write_tx.clone(),
            cancel.clone(),
        ));

        Self {
            write_tx,
            cancel,
            _read_handle: read_handle,
            _write_handle: write_handle,
        }
    }

    pub async fn send(&self, msg: &ClientMessage) -> Result<(), PushError> {
        let json = serde_json::to_string(msg)?;
        self.write_tx
            .send(tungstenite::Message::Text(json.into()))
            .await
            .map_err(|_| PushError::Closed)
    }

    /// Stops both pumps; the write pump sends a close frame first.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for PushClient {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
    }
}

/// Opens push-channel connections for a [`PushSession`](crate::PushSession).
pub trait Connector: Send + Sync + 'static {
    fn connect(
        &self,
        inbound: mpsc::Sender<InboundEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<PushClient, PushError>> + Send + '_>>;
}

/// Connects over the network to `{ws_base_url}/ws/{client_id}`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(config: &ChannelConfig) -> Self {
        Self { url: config.url() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for WsConnector {
    fn connect(
        &self,
        inbound: mpsc::Sender<InboundEvent>,
    ) -> Pin<Box<dyn Future<Output = Result<PushClient, PushError>> + Send + '_>> {
        Box::pin(PushClient::connect(&self.url, inbound))
    }
}

#[cfg(test)]
mod tests {
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    use super::*;

    #[test]
    fn push_error_display() {
        assert_eq!(PushError::Closed.to_string(), "connection closed");
    }

    #[test]
    fn connector_uses_channel_url() {
        let c = WsConnector::new(&ChannelConfig {
            ws_base_url: "wss://api.example.com".into(),
            client_id: "abc".into(),
        });
        assert_eq!(c.url(), "wss://api.example.com/ws/abc");
    }

    #[tokio::test]
    async fn sends_json_and_receives_events() {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let client_ws = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let mut server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;

        let (inbound_tx, mut inbound_rx) = mpsc::channel(8);
        let client = PushClient::from_stream(client_ws, inbound_tx);

        client
            .send(&ClientMessage::Subscribe {
                project_id: "p-1".into(),
            })
            .await
            .unwrap();
        let frame = server.next().await.unwrap().unwrap();
        assert_eq!(
            frame.into_text().unwrap().as_str(),
            r#"{"type":"subscribe","project_id":"p-1"}"#
        );

        futures_util::SinkExt::send(
            &mut server,
            tungstenite::Message::Text(r#"{"type":"subscribed","project_id":"p-1"}"#.into()),
        )
        .await
        .unwrap();
        let ev = inbound_rx.recv().await.unwrap();
        assert_eq!(ev.subject_id, "p-1");

        drop(server);
        assert!(inbound_rx.recv().await.is_none());
    }
}
