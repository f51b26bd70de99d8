//! Reconciles pushed events into local state without letting a burst of
//! updates swamp the consumer.
//!
//! File-status updates are rate limited (terminal statuses always pass) and
//! batched per file, price updates are throttled per material, and
//! everything user-facing goes through a priority queue into a capped
//! activity feed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use aecaxis_flow::{
    CappedArray, MessageRateLimiter, PerformanceMonitor, PerformanceStats, Priority,
    PriorityMessageQueue, SharedClock, Throttle, ThrottleOptions, UpdateBatcher,
};
use aecaxis_protocol::messages::{IfcStatusUpdate, PriceUpdate};
use aecaxis_protocol::{EventKind, IfcFileStatus, InboundEvent, ServerMessage};

use crate::types::{ConnectionState, LiveSyncEvent};

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Quiet period after which pending file statuses are flushed.
    pub batch_window: Duration,
    /// Non-terminal status updates accepted per `rate_limit_window`.
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
    /// Minimum spacing of price updates for one material.
    pub price_throttle: Duration,
    /// Activity items kept in the feed.
    pub activity_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            batch_window: Duration::from_millis(100),
            rate_limit_max: 100,
            rate_limit_window: Duration::from_secs(1),
            price_throttle: Duration::from_millis(500),
            activity_capacity: 50,
        }
    }
}

/// Reconciled output, in the order it became visible.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeUpdate {
    /// One flushed batch, at most one entry per file.
    FileStatuses(Vec<IfcStatusUpdate>),
    Price(PriceUpdate),
    Activity(ActivityItem),
    Connection(ConnectionState),
}

/// One entry of the activity feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityItem {
    pub kind: EventKind,
    pub rfq_id: Option<String>,
    pub summary: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileStatusEntry {
    pub status: IfcFileStatus,
    pub filename: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupplierState {
    pub name: Option<String>,
    pub online: bool,
}

/// Shared, read-mostly view of reconciled state.
#[derive(Clone)]
pub struct StatusCache {
    inner: Arc<RwLock<CacheInner>>,
}

struct CacheInner {
    files: HashMap<String, FileStatusEntry>,
    suppliers: HashMap<String, SupplierState>,
    activity: CappedArray<ActivityItem>,
}

impl StatusCache {
    fn new(activity_capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                files: HashMap::new(),
                suppliers: HashMap::new(),
                activity: CappedArray::new(activity_capacity.max(1)),
            })),
        }
    }

    pub fn file_status(&self, file_id: &str) -> Option<FileStatusEntry> {
        self.read().files.get(file_id).cloned()
    }

    pub fn files(&self) -> HashMap<String, FileStatusEntry> {
        self.read().files.clone()
    }

    pub fn supplier(&self, supplier_id: &str) -> Option<SupplierState> {
        self.read().suppliers.get(supplier_id).cloned()
    }

    pub fn online_suppliers(&self) -> Vec<String> {
        let mut ids: Vec<_> = self
            .read()
            .suppliers
            .iter()
            .filter(|(_, s)| s.online)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Newest first.
    pub fn activity(&self) -> Vec<ActivityItem> {
        self.read().activity.to_vec()
    }

    fn apply_statuses(&self, batch: &[IfcStatusUpdate]) {
        let mut inner = self.write();
        for update in batch {
            inner.files.insert(
                update.ifc_file_id.clone(),
                FileStatusEntry {
                    status: update.status.clone(),
                    filename: update.filename.clone(),
                    updated_at: update.timestamp.clone(),
                },
            );
        }
    }

    fn push_activity(&self, item: ActivityItem) {
        self.write().activity.add(item);
    }

    fn set_presence(&self, supplier_id: String, name: Option<String>, online: bool) {
        let mut inner = self.write();
        let entry = inner
            .suppliers
            .entry(supplier_id)
            .or_insert(SupplierState { name: None, online });
        entry.online = online;
        if name.is_some() {
            entry.name = name;
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, CacheInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, CacheInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

type SharedMonitor = Arc<Mutex<PerformanceMonitor>>;

fn lock(monitor: &SharedMonitor) -> MutexGuard<'_, PerformanceMonitor> {
    monitor.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Single-owner reconciler for pushed events.
///
/// Drive it either with [`run`](Self::run) or by calling
/// [`handle`](Self::handle) and [`poll_due`](Self::poll_due) yourself.
pub struct StatusBridge {
    config: BridgeConfig,
    clock: SharedClock,
    cache: StatusCache,
    limiter: MessageRateLimiter,
    batcher: UpdateBatcher<String, IfcStatusUpdate>,
    prices: HashMap<String, Throttle<PriceUpdate>>,
    queue: PriorityMessageQueue<InboundEvent>,
    monitor: SharedMonitor,
    updates: mpsc::UnboundedSender<BridgeUpdate>,
}

impl StatusBridge {
    /// Must be called inside a tokio runtime; the activity queue spawns its
    /// drain task there.
    pub fn new(
        config: BridgeConfig,
        clock: SharedClock,
    ) -> (Self, mpsc::UnboundedReceiver<BridgeUpdate>) {
        let (updates, updates_rx) = mpsc::unbounded_channel();
        let cache = StatusCache::new(config.activity_capacity);
        let monitor: SharedMonitor = Arc::new(Mutex::new(PerformanceMonitor::new(clock.clone())));

        let batcher = {
            let cache = cache.clone();
            let updates = updates.clone();
            let monitor = Arc::clone(&monitor);
            UpdateBatcher::new(
                config.batch_window,
                clock.clone(),
                Box::new(move |batch: Vec<IfcStatusUpdate>| {
                    cache.apply_statuses(&batch);
                    lock(&monitor).record_batch(batch.len());
                    debug!(files = batch.len(), "file statuses flushed");
                    let _ = updates.send(BridgeUpdate::FileStatuses(batch));
                }),
            )
        };

        let queue = {
            let cache = cache.clone();
            let updates = updates.clone();
            let monitor = Arc::clone(&monitor);
            let clock = clock.clone();
            PriorityMessageQueue::new(move |event: InboundEvent| {
                let started = clock.now();
                if let Some(item) = apply_activity(&cache, &event) {
                    let _ = updates.send(BridgeUpdate::Activity(item));
                }
                lock(&monitor).record_processed(clock.now().duration_since(started));
                std::future::ready(())
            })
        };

        let bridge = Self {
            limiter: MessageRateLimiter::new(
                config.rate_limit_max,
                config.rate_limit_window,
                clock.clone(),
            ),
            config,
            clock,
            cache,
            batcher,
            prices: HashMap::new(),
            queue,
            monitor,
            updates,
        };
        (bridge, updates_rx)
    }

    pub fn cache(&self) -> StatusCache {
        self.cache.clone()
    }

    pub fn stats(&self) -> PerformanceStats {
        lock(&self.monitor).stats()
    }

    /// Routes one inbound event.
    pub fn handle(&mut self, event: InboundEvent) {
        let started = self.clock.now();
        lock(&self.monitor).record_received();

        match event.payload {
            ServerMessage::IfcStatusUpdate(update) => {
                if !update.status.is_terminal() && !self.limiter.can_process() {
                    trace!(file = %update.ifc_file_id, "status update rate limited");
                    lock(&self.monitor).record_dropped();
                    return;
                }
                self.batcher.add_update(update.ifc_file_id.clone(), update);
            }
            ServerMessage::PriceUpdate(update) => {
                let key = event.subject_id.clone();
                let throttle = self.prices.entry(key).or_insert_with(|| {
                    Throttle::new(
                        self.config.price_throttle,
                        ThrottleOptions::default(),
                        self.clock.clone(),
                    )
                });
                if let Some(update) = throttle.fire(update) {
                    let _ = self.updates.send(BridgeUpdate::Price(update));
                }
            }
            ServerMessage::Subscribed { .. } | ServerMessage::SubscribedRfq { .. } => {
                debug!(subject = %event.subject_id, "subscription confirmed");
            }
            ServerMessage::Unknown => {}
            _ => {
                let priority = priority_for(event.kind);
                self.queue.enqueue(event, priority);
                return;
            }
        }

        lock(&self.monitor).record_processed(self.clock.now().duration_since(started));
    }

    /// Handles a session event: inbound messages are routed, state changes
    /// are passed through.
    pub fn handle_session_event(&mut self, event: LiveSyncEvent) {
        match event {
            LiveSyncEvent::Inbound(ev) => self.handle(ev),
            LiveSyncEvent::StateChanged(state) => {
                let _ = self.updates.send(BridgeUpdate::Connection(state));
            }
            LiveSyncEvent::Reconnecting { .. } => {}
        }
    }

    /// Fires whatever timers are due and forgets price throttles whose
    /// window has closed with nothing held.
    pub fn poll_due(&mut self) {
        self.batcher.poll_due();
        for throttle in self.prices.values_mut() {
            if let Some(update) = throttle.poll_due() {
                let _ = self.updates.send(BridgeUpdate::Price(update));
            }
        }
        self.prices.retain(|_, throttle| !throttle.is_idle());
    }

    /// Earliest pending deadline across the batcher and price throttles.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.prices
            .values()
            .filter_map(Throttle::next_deadline)
            .chain(self.batcher.next_deadline())
            .min()
    }

    /// Delivers everything pending now.
    pub fn flush(&mut self) {
        self.batcher.flush();
        for (_, mut throttle) in self.prices.drain() {
            if let Some(update) = throttle.flush_pending() {
                let _ = self.updates.send(BridgeUpdate::Price(update));
            }
        }
    }

    /// Resolves once the activity queue is empty.
    pub async fn settle(&self) {
        self.queue.wait_idle().await;
    }

    /// Consumes session events until `events` closes or `cancel` fires,
    /// then flushes everything pending.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<LiveSyncEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep_until(deadline), if deadline.is_some() => self.poll_due(),
                ev = events.recv() => match ev {
                    Some(ev) => self.handle_session_event(ev),
                    None => break,
                },
            }
        }

        self.flush();
        self.settle().await;
        let stats = self.stats();
        debug!(
            received = stats.messages_received,
            processed = stats.messages_processed,
            dropped = stats.messages_dropped,
            batches = stats.batches_flushed,
            "status bridge stopped"
        );
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    if let Some(at) = deadline {
        tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await;
    }
}

fn priority_for(kind: EventKind) -> Priority {
    match kind {
        EventKind::DeadlineWarning | EventKind::Notification => Priority::High,
        EventKind::Quote => Priority::Normal,
        _ => Priority::Low,
    }
}

/// Applies a queued event to the cache and returns the feed item for it.
fn apply_activity(cache: &StatusCache, event: &InboundEvent) -> Option<ActivityItem> {
    let (rfq_id, summary) = match &event.payload {
        ServerMessage::QuoteReceived(q) => {
            let summary = match q.price {
                Some(price) => format!("Quote from {} ({price:.2})", q.supplier_id),
                None => format!("Quote from {}", q.supplier_id),
            };
            (Some(q.rfq_id.clone()), summary)
        }
        ServerMessage::Notification(n) => {
            let summary = match &n.data.message {
                Some(message) => format!("{}: {message}", n.data.title),
                None => n.data.title.clone(),
            };
            (Some(n.rfq_id.clone()), summary)
        }
        ServerMessage::DeadlineWarning(d) => (
            Some(d.rfq_id.clone()),
            format!(
                "Deadline in {}h ({:?})",
                d.data.hours_remaining, d.data.urgency_level
            ),
        ),
        ServerMessage::SupplierOnline(p) | ServerMessage::SupplierOffline(p) => {
            let online = matches!(event.payload, ServerMessage::SupplierOnline(_));
            let supplier = p.supplier()?.to_string();
            let name = p.data.supplier_name.clone();
            let label = name.clone().unwrap_or_else(|| supplier.clone());
            cache.set_presence(supplier, name, online);
            let verb = if online { "joined" } else { "left" };
            (p.rfq_id.clone(), format!("{label} {verb}"))
        }
        _ => return None,
    };

    let item = ActivityItem {
        kind: event.kind,
        rfq_id,
        summary,
        received_at: event.received_at,
    };
    cache.push_activity(item.clone());
    Some(item)
}
