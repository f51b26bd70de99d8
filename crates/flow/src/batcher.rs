use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::clock::SharedClock;

/// Callback receiving one flushed batch.
pub type FlushFn<V> = Box<dyn FnMut(Vec<V>) + Send + Sync>;

/// Coalesces keyed updates and delivers them as a single batch.
///
/// Each key keeps only its most recent value; keys stay in the order they
/// first arrived within the batch. Every `add_update` pushes the shared
/// deadline out to `now + window`, so a steady stream keeps accumulating
/// until it goes quiet for one window (or someone calls [`flush`]).
///
/// [`flush`]: UpdateBatcher::flush
pub struct UpdateBatcher<K, V> {
    window: Duration,
    clock: SharedClock,
    pending: Vec<(K, V)>,
    index: HashMap<K, usize>,
    deadline: Option<Instant>,
    on_flush: FlushFn<V>,
}

impl<K, V> UpdateBatcher<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(window: Duration, clock: SharedClock, on_flush: FlushFn<V>) -> Self {
        Self {
            window,
            clock,
            pending: Vec::new(),
            index: HashMap::new(),
            deadline: None,
            on_flush,
        }
    }

    /// Stores `value` under `key`, replacing any pending value for it.
    pub fn add_update(&mut self, key: K, value: V) {
        match self.index.get(&key) {
            Some(&slot) => self.pending[slot].1 = value,
            None => {
                self.index.insert(key.clone(), self.pending.len());
                self.pending.push((key, value));
            }
        }
        self.deadline = Some(self.clock.now() + self.window);
    }

    /// Flushes if the deadline has passed. Returns the number of values
    /// delivered.
    pub fn poll_due(&mut self) -> usize {
        match self.deadline {
            Some(deadline) if self.clock.now() >= deadline => self.flush(),
            _ => 0,
        }
    }

    /// Delivers everything pending as one batch. The callback is not invoked
    /// when nothing is pending.
    pub fn flush(&mut self) -> usize {
        self.deadline = None;
        if self.pending.is_empty() {
            return 0;
        }

        self.index.clear();
        let batch: Vec<V> = self.pending.drain(..).map(|(_, value)| value).collect();
        let count = batch.len();
        trace!(count, "flushing update batch");
        (self.on_flush)(batch);
        count
    }

    /// Discards pending values without delivering them.
    pub fn cancel(&mut self) {
        self.pending.clear();
        self.index.clear();
        self.deadline = None;
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<K, V> std::fmt::Debug for UpdateBatcher<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateBatcher")
            .field("window", &self.window)
            .field("pending", &self.pending.len())
            .field("deadline", &self.deadline)
            .finish()
    }
}
