use std::time::{Duration, Instant};

use crate::clock::SharedClock;

/// Fixed-window message counter.
///
/// Admits up to `max_messages` per `window`. The window restarts on the
/// first check after it has elapsed.
#[derive(Debug)]
pub struct MessageRateLimiter {
    max_messages: u32,
    window: Duration,
    clock: SharedClock,
    window_start: Instant,
    count: u32,
}

impl MessageRateLimiter {
    pub fn new(max_messages: u32, window: Duration, clock: SharedClock) -> Self {
        let window_start = clock.now();
        Self {
            max_messages,
            window,
            clock,
            window_start,
            count: 0,
        }
    }

    /// Counts one message and reports whether it is within the limit.
    pub fn can_process(&mut self) -> bool {
        let now = self.clock.now();
        if now.duration_since(self.window_start) >= self.window {
            self.window_start = now;
            self.count = 0;
        }

        if self.count < self.max_messages {
            self.count += 1;
            true
        } else {
            false
        }
    }

    /// Messages still admissible in the current window.
    pub fn remaining(&self) -> u32 {
        if self.clock.now().duration_since(self.window_start) >= self.window {
            self.max_messages
        } else {
            self.max_messages.saturating_sub(self.count)
        }
    }

    pub fn reset(&mut self) {
        self.window_start = self.clock.now();
        self.count = 0;
    }
}
