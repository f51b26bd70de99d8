//! Write pump: serialises outbound frames and sends keepalive pings.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

use aecaxis_protocol::constants::WS_PING_PERIOD;

/// Forwards queued frames to the socket and pings every
/// [`WS_PING_PERIOD`]. Sends a close frame on the way out.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    let mut ping = tokio::time::interval(WS_PING_PERIOD);
    ping.tick().await;

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ping.tick() => {
                trace!("sending keepalive ping");
                tungstenite::Message::Ping(Vec::new().into())
            }
            msg = write_rx.recv() => match msg {
                Some(m) => m,
                None => break,
            },
        };

        if let Err(e) = write.send(msg).await {
            error!("push channel write error: {e}");
            return;
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;

    fn capture() -> (
        impl SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
        mpsc::UnboundedReceiver<tungstenite::Message>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = sink::unfold(tx, |tx, msg: tungstenite::Message| async move {
            let _ = tx.send(msg);
            Ok::<_, tungstenite::Error>(tx)
        });
        (Box::pin(sink), rx)
    }

    #[tokio::test]
    async fn forwards_then_closes_on_cancel() {
        let (sink, mut sent) = capture();
        let (write_tx, write_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(write_pump(sink, write_rx, cancel.clone()));

        write_tx
            .send(tungstenite::Message::Text("hello".into()))
            .await
            .unwrap();
        assert!(matches!(sent.recv().await, Some(tungstenite::Message::Text(t)) if t.as_str() == "hello"));

        cancel.cancel();
        handle.await.unwrap();
        assert!(matches!(sent.recv().await, Some(tungstenite::Message::Close(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn pings_on_schedule() {
        let (sink, mut sent) = capture();
        let (_write_tx, write_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(write_pump(sink, write_rx, cancel.clone()));

        tokio::time::sleep(WS_PING_PERIOD + std::time::Duration::from_millis(10)).await;
        assert!(matches!(sent.recv().await, Some(tungstenite::Message::Ping(_))));

        cancel.cancel();
        handle.await.unwrap();
    }
}
