//! Read pump: turns pushed frames into [`InboundEvent`]s.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use aecaxis_protocol::constants::{WS_MAX_MESSAGE_SIZE, WS_PONG_WAIT};
use aecaxis_protocol::{InboundEvent, ServerMessage};

/// Reads frames until the stream ends, errors, closes, or goes silent for
/// [`WS_PONG_WAIT`]. Any frame resets the silence deadline.
///
/// Dropping `inbound` on exit is how the owner learns the channel is gone.
pub(crate) async fn read_pump<S>(
    mut read: S,
    inbound: mpsc::Sender<InboundEvent>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut deadline => {
                warn!("push channel silent for {}s, closing", WS_PONG_WAIT.as_secs());
                break;
            }

            msg = read.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!("push channel read error: {e}");
                        break;
                    }
                    None => {
                        debug!("push channel stream ended");
                        break;
                    }
                };
                deadline.as_mut().reset(tokio::time::Instant::now() + WS_PONG_WAIT);

                match msg {
                    tungstenite::Message::Text(text) => {
                        let Some(event) = parse_event(&text) else { continue };
                        if inbound.send(event).await.is_err() {
                            debug!("inbound receiver dropped");
                            break;
                        }
                    }
                    tungstenite::Message::Ping(data) => {
                        trace!("received ping, sending pong");
                        let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                    }
                    tungstenite::Message::Close(frame) => {
                        debug!(?frame, "server closed push channel");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Parses one text frame. Oversized, malformed and unknown-type messages
/// are logged and skipped.
fn parse_event(text: &str) -> Option<InboundEvent> {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!("push message too large ({} bytes), dropping", text.len());
        return None;
    }

    let msg: ServerMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("failed to parse push message: {e}");
            return None;
        }
    };

    if matches!(msg, ServerMessage::Unknown) {
        debug!("ignoring push message of unknown type");
        return None;
    }

    let event = InboundEvent::now(msg);
    trace!(kind = ?event.kind, subject = %event.subject_id, "received push message");
    Some(event)
}
