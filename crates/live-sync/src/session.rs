//! Reconnecting push-channel session.
//!
//! A [`PushSession`] owns its cancellation token and its subscription list.
//! A supervisor task keeps one [`PushClient`] alive, re-sends every
//! subscription after each (re)connect, and backs off exponentially while
//! the backend is unreachable.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use aecaxis_protocol::{ClientMessage, InboundEvent};

use crate::client::{Connector, PushClient, PushError};
use crate::types::{ConnectionState, LiveSyncEvent, ReconnectConfig};

const INBOUND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub project_id: String,
    /// RFQs to subscribe to from the start.
    pub rfq_ids: Vec<String>,
    pub reconnect: ReconnectConfig,
}

impl SessionConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            rfq_ids: Vec::new(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// What a session is subscribed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriptions {
    pub project_id: String,
    pub rfq_ids: BTreeSet<String>,
}

impl Subscriptions {
    /// Messages to send after connecting: the project first, then each RFQ.
    fn messages(&self) -> Vec<ClientMessage> {
        std::iter::once(ClientMessage::Subscribe {
            project_id: self.project_id.clone(),
        })
        .chain(self.rfq_ids.iter().map(|id| ClientMessage::SubscribeRfq {
            rfq_id: id.clone(),
        }))
        .collect()
    }
}

/// Handle to a running push session.
pub struct PushSession {
    subscriptions: Arc<Mutex<Subscriptions>>,
    commands: mpsc::UnboundedSender<ClientMessage>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PushSession {
    /// Spawns the supervisor and returns the session with its event stream.
    pub fn start(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
    ) -> (Self, mpsc::Receiver<LiveSyncEvent>) {
        let subscriptions = Arc::new(Mutex::new(Subscriptions {
            project_id: config.project_id,
            rfq_ids: config.rfq_ids.into_iter().collect(),
        }));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let cancel = CancellationToken::new();

        let supervisor = Supervisor {
            connector,
            subscriptions: Arc::clone(&subscriptions),
            commands: commands_rx,
            events: events_tx,
            state: state_tx,
            reconnect: config.reconnect,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(supervisor.run());

        let session = Self {
            subscriptions,
            commands: commands_tx,
            state: state_rx,
            cancel,
            task: Some(task),
        };
        (session, events_rx)
    }

    /// Adds an RFQ subscription. Sent immediately when connected and
    /// replayed after every reconnect. Returns `false` if already present.
    pub fn subscribe_rfq(&self, rfq_id: impl Into<String>) -> bool {
        let rfq_id = rfq_id.into();
        let added = lock(&self.subscriptions).rfq_ids.insert(rfq_id.clone());
        if added {
            let _ = self.commands.send(ClientMessage::SubscribeRfq { rfq_id });
        }
        added
    }

    pub fn subscriptions(&self) -> Subscriptions {
        lock(&self.subscriptions).clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Token cancelled when the session shuts down.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Closes the connection and waits for the supervisor to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PushSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn lock(subs: &Mutex<Subscriptions>) -> MutexGuard<'_, Subscriptions> {
    subs.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

struct Supervisor {
    connector: Arc<dyn Connector>,
    subscriptions: Arc<Mutex<Subscriptions>>,
    commands: mpsc::UnboundedReceiver<ClientMessage>,
    events: mpsc::Sender<LiveSyncEvent>,
    state: watch::Sender<ConnectionState>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
}

/// Why a connected period ended.
enum Exit {
    Lost,
    Shutdown,
}

impl Supervisor {
    async fn run(mut self) {
        let mut attempt = 0u32;

        loop {
            self.set_state(ConnectionState::Connecting).await;
            let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
            let connected = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                res = self.connector.connect(inbound_tx) => res,
            };

            match connected {
                Ok(client) => {
                    attempt = 0;
                    match self.serve(&client, inbound_rx).await {
                        Exit::Shutdown => {
                            client.close();
                            break;
                        }
                        Exit::Lost => warn!("push channel lost"),
                    }
                }
                Err(e) => warn!(error = %e, "push channel connect failed"),
            }

            attempt += 1;
            let delay = self.reconnect.delay_for_attempt(attempt);
            info!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "reconnecting push channel"
            );
            self.set_state(ConnectionState::Reconnecting { attempt }).await;
            self.emit(LiveSyncEvent::Reconnecting {
                attempt,
                next_retry_secs: delay.as_secs_f64(),
            })
            .await;

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected).await;
        debug!("push session stopped");
    }

    /// Subscribes, then relays traffic until the connection drops or the
    /// session is cancelled.
    async fn serve(
        &mut self,
        client: &PushClient,
        mut inbound: mpsc::Receiver<InboundEvent>,
    ) -> Exit {
        // Queued commands are already in the subscription list.
        while self.commands.try_recv().is_ok() {}

        let subscribe = lock(&self.subscriptions).messages();
        if let Err(e) = send_all(client, &subscribe).await {
            warn!(error = %e, "failed to subscribe");
            return Exit::Lost;
        }
        debug!(count = subscribe.len(), "subscriptions sent");
        self.set_state(ConnectionState::Connected).await;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Exit::Shutdown,

                cmd = self.commands.recv() => {
                    let Some(msg) = cmd else { return Exit::Shutdown };
                    if let Err(e) = client.send(&msg).await {
                        warn!(error = %e, "failed to send subscription");
                        return Exit::Lost;
                    }
                }

                ev = inbound.recv() => {
                    let Some(ev) = ev else { return Exit::Lost };
                    if self.events.send(LiveSyncEvent::Inbound(ev)).await.is_err() {
                        return Exit::Shutdown;
                    }
                }
            }
        }
    }

    async fn set_state(&self, state: ConnectionState) {
        if *self.state.borrow() == state {
            return;
        }
        self.state.send_replace(state.clone());
        self.emit(LiveSyncEvent::StateChanged(state)).await;
    }

    async fn emit(&self, event: LiveSyncEvent) {
        let _ = self.events.send(event).await;
    }
}

async fn send_all(client: &PushClient, messages: &[ClientMessage]) -> Result<(), PushError> {
    for msg in messages {
        client.send(msg).await?;
    }
    Ok(())
}
