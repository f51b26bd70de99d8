//! Flow-control primitives for high-frequency update streams.
//!
//! Every timer-based type here is an explicit state machine driven by an
//! injected [`Clock`]: callers `fire` values in, `poll_due` when the
//! reported [`next_deadline`](Throttle::next_deadline) passes, and may
//! `flush_pending` or `cancel` at any time. Nothing spawns timers on its
//! own except [`PriorityMessageQueue`], whose drain runs on the tokio
//! runtime.

pub mod batcher;
pub mod buffer;
pub mod clock;
pub mod monitor;
pub mod priority;
pub mod rate_limit;
pub mod throttle;

pub use batcher::UpdateBatcher;
pub use buffer::{CappedArray, RingBuffer};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use monitor::{PerformanceMonitor, PerformanceStats};
pub use priority::{MessageProcessor, Priority, PriorityMessageQueue};
pub use rate_limit::MessageRateLimiter;
pub use throttle::{Debounce, Throttle, ThrottleOptions};
