//! Three-lane message queue with a serial, cooperative drain.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use tokio::sync::Notify;
use tracing::{trace, warn};

/// Lane a message is queued in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

/// Handles one dequeued message.
///
/// Implemented for any `Fn(M) -> impl Future<Output = ()>` closure.
pub trait MessageProcessor<M>: Send + Sync + 'static {
    fn process(&self, message: M) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

impl<M, F, Fut> MessageProcessor<M> for F
where
    F: Fn(M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn process(&self, message: M) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self(message))
    }
}

/// Queue that always drains High before Normal before Low.
///
/// Enqueuing on an idle queue spawns a drain task on the current tokio
/// runtime. The drain handles one message at a time and yields to the
/// scheduler between messages, so a message enqueued mid-drain is still
/// placed by priority. A processor that panics loses only the message it
/// was handling. Cloning shares the same queue.
pub struct PriorityMessageQueue<M> {
    inner: Arc<QueueInner<M>>,
}

struct QueueInner<M> {
    lanes: Mutex<Lanes<M>>,
    processor: Box<dyn MessageProcessor<M>>,
    idle: Notify,
}

struct Lanes<M> {
    high: VecDeque<M>,
    normal: VecDeque<M>,
    low: VecDeque<M>,
    draining: bool,
}

impl<M> Lanes<M> {
    fn pop_next(&mut self) -> Option<M> {
        self.high
            .pop_front()
            .or_else(|| self.normal.pop_front())
            .or_else(|| self.low.pop_front())
    }

    fn len(&self) -> usize {
        self.high.len() + self.normal.len() + self.low.len()
    }
}

impl<M> Clone for PriorityMessageQueue<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Send + 'static> PriorityMessageQueue<M> {
    pub fn new(processor: impl MessageProcessor<M>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                lanes: Mutex::new(Lanes {
                    high: VecDeque::new(),
                    normal: VecDeque::new(),
                    low: VecDeque::new(),
                    draining: false,
                }),
                processor: Box::new(processor),
                idle: Notify::new(),
            }),
        }
    }

    /// Queues a message and starts draining if the queue was idle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, message: M, priority: Priority) {
        let start_drain = {
            let mut lanes = self.inner.lock();
            match priority {
                Priority::High => lanes.high.push_back(message),
                Priority::Normal => lanes.normal.push_back(message),
                Priority::Low => lanes.low.push_back(message),
            }
            !std::mem::replace(&mut lanes.draining, true)
        };

        if start_drain {
            tokio::spawn(drain(Arc::clone(&self.inner)));
        }
    }

    /// Messages waiting, not counting one currently being processed.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_draining(&self) -> bool {
        self.inner.lock().draining
    }

    /// Resolves once the drain task has emptied every lane.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_draining() {
                return;
            }
            notified.await;
        }
    }

    /// Drops every queued message. A message already handed to the
    /// processor still completes.
    pub fn clear(&self) {
        let mut lanes = self.inner.lock();
        lanes.high.clear();
        lanes.normal.clear();
        lanes.low.clear();
    }
}

impl<M> QueueInner<M> {
    fn lock(&self) -> MutexGuard<'_, Lanes<M>> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn drain<M: Send + 'static>(inner: Arc<QueueInner<M>>) {
    loop {
        let next = {
            let mut lanes = inner.lock();
            match lanes.pop_next() {
                Some(message) => message,
                None => {
                    lanes.draining = false;
                    break;
                }
            }
        };

        if AssertUnwindSafe(inner.processor.process(next))
            .catch_unwind()
            .await
            .is_err()
        {
            warn!("message processor panicked, message dropped");
        }
        tokio::task::yield_now().await;
    }

    trace!("priority queue drained");
    inner.idle.notify_waiters();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn recording_queue() -> (
        PriorityMessageQueue<&'static str>,
        mpsc::UnboundedReceiver<&'static str>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = PriorityMessageQueue::new(move |msg: &'static str| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(msg);
            }
        });
        (queue, rx)
    }

    async fn collect(rx: &mut mpsc::UnboundedReceiver<&'static str>, n: usize) -> Vec<&'static str> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(rx.recv().await.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn high_lane_drains_before_low() {
        let (queue, mut rx) = recording_queue();
        queue.enqueue("low-1", Priority::Low);
        queue.enqueue("high-1", Priority::High);
        queue.enqueue("high-2", Priority::High);
        // Enqueued before the drain has run.
        queue.enqueue("low-2", Priority::Low);

        assert_eq!(
            collect(&mut rx, 4).await,
            vec!["high-1", "high-2", "low-1", "low-2"]
        );
        queue.wait_idle().await;
        assert!(queue.is_empty());
        assert!(!queue.is_draining());
    }

    #[tokio::test]
    async fn normal_sits_between_high_and_low() {
        let (queue, mut rx) = recording_queue();
        queue.enqueue("low", Priority::Low);
        queue.enqueue("normal", Priority::Normal);
        queue.enqueue("high", Priority::High);
        assert_eq!(collect(&mut rx, 3).await, vec!["high", "normal", "low"]);
    }

    #[tokio::test]
    async fn messages_enqueued_mid_drain_are_placed_by_priority() {
        let gate = Arc::new(Notify::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let processor_gate = gate.clone();
        let queue = PriorityMessageQueue::new(move |msg: &'static str| {
            let tx = tx.clone();
            let gate = processor_gate.clone();
            async move {
                if msg == "high-1" {
                    gate.notified().await;
                }
                let _ = tx.send(msg);
            }
        });

        queue.enqueue("high-1", Priority::High);
        queue.enqueue("high-2", Priority::High);
        queue.enqueue("low-1", Priority::Low);

        // Let the drain pick up high-1 and block on the gate.
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(queue.is_draining());

        queue.enqueue("low-2", Priority::Low);
        queue.enqueue("high-3", Priority::High);
        gate.notify_one();

        assert_eq!(
            collect(&mut rx, 5).await,
            vec!["high-1", "high-2", "high-3", "low-1", "low-2"]
        );
    }

    #[tokio::test]
    async fn wait_idle_on_empty_queue_returns() {
        let (queue, _rx) = recording_queue();
        queue.wait_idle().await;
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn panicking_processor_does_not_stall_the_queue() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue = PriorityMessageQueue::new(move |msg: &'static str| {
            let tx = tx.clone();
            async move {
                if msg == "boom" {
                    panic!("processor failure");
                }
                let _ = tx.send(msg);
            }
        });

        queue.enqueue("boom", Priority::High);
        queue.enqueue("queued", Priority::Low);
        assert_eq!(collect(&mut rx, 1).await, vec!["queued"]);
        queue.wait_idle().await;
        assert!(!queue.is_draining());

        queue.enqueue("after", Priority::High);
        let got = tokio::time::timeout(std::time::Duration::from_millis(500), rx.recv())
            .await
            .unwrap();
        assert_eq!(got, Some("after"));
        queue.wait_idle().await;
    }

    #[tokio::test]
    async fn queue_restarts_after_going_idle() {
        let (queue, mut rx) = recording_queue();
        queue.enqueue("first", Priority::Normal);
        assert_eq!(collect(&mut rx, 1).await, vec!["first"]);
        queue.wait_idle().await;

        queue.enqueue("second", Priority::Low);
        assert_eq!(collect(&mut rx, 1).await, vec!["second"]);
    }
}
