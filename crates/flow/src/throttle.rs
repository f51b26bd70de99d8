//! Throttle and debounce as explicit state machines.
//!
//! Neither type owns a timer. The caller passes values to `fire`, runs
//! whatever `fire` hands back immediately, and calls `poll_due` once
//! `next_deadline` has passed to collect the deferred value.

use std::time::{Duration, Instant};

use crate::clock::SharedClock;

/// Edge behavior of a [`Throttle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleOptions {
    /// Fire on the first call of a window.
    pub leading: bool,
    /// Fire the last suppressed call once the window ends.
    pub trailing: bool,
}

impl Default for ThrottleOptions {
    fn default() -> Self {
        Self {
            leading: true,
            trailing: true,
        }
    }
}

/// Lets at most one value through per `delay`.
#[derive(Debug)]
pub struct Throttle<T> {
    delay: Duration,
    options: ThrottleOptions,
    clock: SharedClock,
    last_fire: Option<Instant>,
    pending: Option<T>,
}

impl<T> Throttle<T> {
    pub fn new(delay: Duration, options: ThrottleOptions, clock: SharedClock) -> Self {
        Self {
            delay,
            options,
            clock,
            last_fire: None,
            pending: None,
        }
    }

    /// Offers a value. Returns it back when it should run now; otherwise it
    /// is held as the trailing value (replacing any earlier one) or dropped.
    pub fn fire(&mut self, value: T) -> Option<T> {
        let now = self.clock.now();
        let window_open = match self.last_fire {
            None => true,
            Some(last) => now.duration_since(last) >= self.delay,
        };

        if window_open {
            self.last_fire = Some(now);
            if self.options.leading {
                self.pending = None;
                return Some(value);
            }
        }

        if self.options.trailing {
            self.pending = Some(value);
        }
        None
    }

    /// Releases the trailing value once its deadline has passed.
    pub fn poll_due(&mut self) -> Option<T> {
        let deadline = self.next_deadline()?;
        let now = self.clock.now();
        if now < deadline {
            return None;
        }
        self.last_fire = Some(now);
        self.pending.take()
    }

    /// Releases the trailing value immediately.
    pub fn flush_pending(&mut self) -> Option<T> {
        let value = self.pending.take()?;
        self.last_fire = Some(self.clock.now());
        Some(value)
    }

    /// Drops the trailing value and forgets the current window.
    pub fn cancel(&mut self) {
        self.pending = None;
        self.last_fire = None;
    }

    /// When the trailing value becomes due, if one is held.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (&self.pending, self.last_fire) {
            (Some(_), Some(last)) => Some(last + self.delay),
            _ => None,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// True when nothing is held and the last window has closed, so the
    /// throttle behaves exactly like a fresh one.
    pub fn is_idle(&self) -> bool {
        self.pending.is_none()
            && self
                .last_fire
                .is_none_or(|last| self.clock.now().duration_since(last) >= self.delay)
    }
}

/// Runs only the last value of a burst, `delay` after the burst ends.
#[derive(Debug)]
pub struct Debounce<T> {
    delay: Duration,
    clock: SharedClock,
    pending: Option<(T, Instant)>,
}

impl<T> Debounce<T> {
    pub fn new(delay: Duration, clock: SharedClock) -> Self {
        Self {
            delay,
            clock,
            pending: None,
        }
    }

    /// Replaces the pending value and restarts the quiet period.
    pub fn fire(&mut self, value: T) {
        let deadline = self.clock.now() + self.delay;
        self.pending = Some((value, deadline));
    }

    pub fn poll_due(&mut self) -> Option<T> {
        let deadline = self.next_deadline()?;
        if self.clock.now() < deadline {
            return None;
        }
        self.pending.take().map(|(value, _)| value)
    }

    pub fn flush_pending(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, deadline)| *deadline)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const DELAY: Duration = Duration::from_millis(100);

    fn throttle(options: ThrottleOptions) -> (Throttle<u32>, ManualClock) {
        let clock = ManualClock::new();
        (Throttle::new(DELAY, options, clock.shared()), clock)
    }

    #[test]
    fn leading_call_fires_immediately() {
        let (mut t, _clock) = throttle(ThrottleOptions::default());
        assert_eq!(t.fire(1), Some(1));
        assert!(!t.has_pending());
    }

    #[test]
    fn calls_inside_window_coalesce_into_trailing() {
        let (mut t, clock) = throttle(ThrottleOptions::default());
        assert_eq!(t.fire(1), Some(1));

        clock.advance(Duration::from_millis(20));
        assert_eq!(t.fire(2), None);
        clock.advance(Duration::from_millis(20));
        assert_eq!(t.fire(3), None);

        let deadline = t.next_deadline().unwrap();
        assert_eq!(deadline, clock.origin() + DELAY);

        assert_eq!(t.poll_due(), None);
        clock.advance(Duration::from_millis(60));
        assert_eq!(t.poll_due(), Some(3));
        assert_eq!(t.next_deadline(), None);
    }

    #[test]
    fn window_restarts_after_trailing_fire() {
        let (mut t, clock) = throttle(ThrottleOptions::default());
        t.fire(1);
        t.fire(2);
        clock.advance(DELAY);
        assert_eq!(t.poll_due(), Some(2));

        // Trailing fire opened a new window.
        clock.advance(Duration::from_millis(10));
        assert_eq!(t.fire(3), None);
        clock.advance(DELAY);
        assert_eq!(t.fire(4), Some(4));
    }

    #[test]
    fn trailing_only_defers_first_call() {
        let (mut t, clock) = throttle(ThrottleOptions {
            leading: false,
            trailing: true,
        });
        assert_eq!(t.fire(7), None);
        clock.advance(DELAY);
        assert_eq!(t.poll_due(), Some(7));
    }

    #[test]
    fn leading_only_drops_suppressed_calls() {
        let (mut t, clock) = throttle(ThrottleOptions {
            leading: true,
            trailing: false,
        });
        assert_eq!(t.fire(1), Some(1));
        assert_eq!(t.fire(2), None);
        assert!(!t.has_pending());
        clock.advance(DELAY);
        assert_eq!(t.poll_due(), None);
        assert_eq!(t.fire(3), Some(3));
    }

    #[test]
    fn idle_only_after_window_closes() {
        let (mut t, clock) = throttle(ThrottleOptions::default());
        assert!(t.is_idle());

        t.fire(1);
        assert!(!t.is_idle());
        t.fire(2);
        clock.advance(DELAY);
        assert_eq!(t.poll_due(), Some(2));
        // The trailing fire opened a new window.
        assert!(!t.is_idle());

        clock.advance(DELAY);
        assert!(t.is_idle());
    }

    #[test]
    fn flush_and_cancel() {
        let (mut t, _clock) = throttle(ThrottleOptions::default());
        t.fire(1);
        t.fire(2);
        assert_eq!(t.flush_pending(), Some(2));
        assert_eq!(t.flush_pending(), None);

        t.fire(3);
        t.cancel();
        assert!(!t.has_pending());
        // Cancel forgets the window, so the next call leads again.
        assert_eq!(t.fire(4), Some(4));
    }

    #[test]
    fn debounce_fires_after_quiet_period() {
        let clock = ManualClock::new();
        let mut d = Debounce::new(DELAY, clock.shared());

        d.fire("a");
        clock.advance(Duration::from_millis(80));
        d.fire("b");
        clock.advance(Duration::from_millis(80));
        assert_eq!(d.poll_due(), None, "second call restarted the timer");

        clock.advance(Duration::from_millis(20));
        assert_eq!(d.poll_due(), Some("b"));
        assert_eq!(d.poll_due(), None);
    }

    #[test]
    fn debounce_flush_and_cancel() {
        let clock = ManualClock::new();
        let mut d = Debounce::new(DELAY, clock.shared());
        d.fire(1);
        assert_eq!(d.flush_pending(), Some(1));

        d.fire(2);
        d.cancel();
        clock.advance(DELAY * 2);
        assert_eq!(d.poll_due(), None);
        assert_eq!(d.next_deadline(), None);
    }
}
