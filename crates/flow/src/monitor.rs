use std::time::{Duration, Instant};

use tracing::warn;

use crate::buffer::RingBuffer;
use crate::clock::SharedClock;

const DURATION_HISTORY: usize = 100;
const ARRIVAL_HISTORY: usize = 1000;
const THROUGHPUT_WINDOW: Duration = Duration::from_secs(1);

/// Average processing time above which a warning is logged.
pub const DEFAULT_SLOW_THRESHOLD: Duration = Duration::from_millis(16);

/// Point-in-time view of a [`PerformanceMonitor`].
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceStats {
    pub messages_received: u64,
    pub messages_processed: u64,
    pub messages_dropped: u64,
    pub batches_flushed: u64,
    pub average_batch_size: f64,
    pub average_processing_time: Duration,
    /// Messages received during the last second.
    pub messages_per_second: f64,
    pub uptime: Duration,
}

/// Counters and timing history for the push-update pipeline.
#[derive(Debug)]
pub struct PerformanceMonitor {
    clock: SharedClock,
    started: Instant,
    received: u64,
    processed: u64,
    dropped: u64,
    batches: u64,
    batched_items: u64,
    durations: RingBuffer<Duration>,
    arrivals: RingBuffer<Instant>,
    slow_threshold: Duration,
    slow: bool,
}

impl PerformanceMonitor {
    pub fn new(clock: SharedClock) -> Self {
        let started = clock.now();
        Self {
            clock,
            started,
            received: 0,
            processed: 0,
            dropped: 0,
            batches: 0,
            batched_items: 0,
            durations: RingBuffer::new(DURATION_HISTORY),
            arrivals: RingBuffer::new(ARRIVAL_HISTORY),
            slow_threshold: DEFAULT_SLOW_THRESHOLD,
            slow: false,
        }
    }

    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }

    pub fn record_received(&mut self) {
        self.received += 1;
        self.arrivals.push(self.clock.now());
    }

    pub fn record_dropped(&mut self) {
        self.dropped += 1;
    }

    pub fn record_processed(&mut self, elapsed: Duration) {
        self.processed += 1;
        self.durations.push(elapsed);

        let average = self.average_processing_time();
        let slow = average > self.slow_threshold;
        if slow && !self.slow {
            warn!(
                average_ms = average.as_secs_f64() * 1000.0,
                threshold_ms = self.slow_threshold.as_secs_f64() * 1000.0,
                "update processing is slower than threshold"
            );
        }
        self.slow = slow;
    }

    pub fn record_batch(&mut self, size: usize) {
        self.batches += 1;
        self.batched_items += size as u64;
    }

    /// Mean of the recent processing durations.
    pub fn average_processing_time(&self) -> Duration {
        if self.durations.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.durations.iter().sum();
        total / self.durations.len() as u32
    }

    pub fn stats(&self) -> PerformanceStats {
        let now = self.clock.now();
        let recent = self
            .arrivals
            .iter()
            .rev()
            .take_while(|t| now.duration_since(**t) < THROUGHPUT_WINDOW)
            .count();

        PerformanceStats {
            messages_received: self.received,
            messages_processed: self.processed,
            messages_dropped: self.dropped,
            batches_flushed: self.batches,
            average_batch_size: if self.batches == 0 {
                0.0
            } else {
                self.batched_items as f64 / self.batches as f64
            },
            average_processing_time: self.average_processing_time(),
            messages_per_second: recent as f64 / THROUGHPUT_WINDOW.as_secs_f64(),
            uptime: now.duration_since(self.started),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.clock.clone()).with_slow_threshold(self.slow_threshold);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn counts_and_batch_average() {
        let clock = ManualClock::new();
        let mut m = PerformanceMonitor::new(clock.shared());
        for _ in 0..5 {
            m.record_received();
        }
        m.record_dropped();
        m.record_batch(2);
        m.record_batch(4);

        let s = m.stats();
        assert_eq!(s.messages_received, 5);
        assert_eq!(s.messages_dropped, 1);
        assert_eq!(s.batches_flushed, 2);
        assert!((s.average_batch_size - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn throughput_counts_only_the_last_second() {
        let clock = ManualClock::new();
        let mut m = PerformanceMonitor::new(clock.shared());
        m.record_received();
        m.record_received();
        clock.advance(Duration::from_millis(1500));
        m.record_received();

        let s = m.stats();
        assert!((s.messages_per_second - 1.0).abs() < f64::EPSILON);
        assert_eq!(s.uptime, Duration::from_millis(1500));
    }

    #[test]
    fn average_processing_time() {
        let clock = ManualClock::new();
        let mut m = PerformanceMonitor::new(clock.shared());
        assert_eq!(m.average_processing_time(), Duration::ZERO);
        m.record_processed(Duration::from_millis(10));
        m.record_processed(Duration::from_millis(30));
        assert_eq!(m.average_processing_time(), Duration::from_millis(20));
        assert_eq!(m.stats().messages_processed, 2);
    }

    #[test]
    fn reset_keeps_threshold() {
        let clock = ManualClock::new();
        let mut m = PerformanceMonitor::new(clock.shared())
            .with_slow_threshold(Duration::from_millis(5));
        m.record_received();
        m.record_processed(Duration::from_millis(50));
        m.reset();
        assert_eq!(m.stats().messages_received, 0);
        assert_eq!(m.slow_threshold, Duration::from_millis(5));
    }
}
