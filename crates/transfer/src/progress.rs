use std::time::Instant;

use aecaxis_flow::{RingBuffer, SharedClock};
use serde::Serialize;

/// Speed samples retained per session.
pub const SAMPLE_CAPACITY: usize = 10;

/// Samples included in the smoothed speed.
pub const SMOOTHING_WINDOW: usize = 5;

const CALCULATING: &str = "Calculating...";

/// One observation of transfer progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedSample {
    pub timestamp: Instant,
    pub loaded: u64,
    /// Cumulative bytes per second since the transfer started.
    pub speed: f64,
}

/// Progress of a transfer as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub loaded: u64,
    pub total: u64,
    /// 0-100, rounded.
    pub percentage: u8,
    /// Bytes per second averaged over the whole transfer.
    pub speed: f64,
    /// Weighted moving average of recent `speed` samples.
    pub average_speed: f64,
    /// Seconds left, `None` while there is no usable speed.
    pub remaining_time: Option<f64>,
    pub eta: String,
    /// Seconds since the transfer started.
    pub elapsed_time: f64,
}

/// Turns raw byte counts into [`ProgressSnapshot`]s.
///
/// Keeps the last [`SAMPLE_CAPACITY`] samples and smooths speed over the
/// newest [`SMOOTHING_WINDOW`] of them, weighting newer samples higher.
/// `loaded` never goes backwards: a retry that restarts from zero reports
/// the previous high-water mark until it overtakes it.
#[derive(Debug)]
pub struct ProgressEstimator {
    clock: SharedClock,
    started: Instant,
    samples: RingBuffer<SpeedSample>,
    high_water: u64,
}

impl ProgressEstimator {
    pub fn new(clock: SharedClock) -> Self {
        let started = clock.now();
        Self {
            clock,
            started,
            samples: RingBuffer::new(SAMPLE_CAPACITY),
            high_water: 0,
        }
    }

    pub fn update(&mut self, loaded: u64, total: u64) -> ProgressSnapshot {
        let now = self.clock.now();
        let loaded = loaded.min(total).max(self.high_water.min(total));
        self.high_water = loaded;

        let elapsed = now.duration_since(self.started).as_secs_f64();
        let percentage = percentage(loaded, total);
        let speed = if elapsed > 0.0 {
            loaded as f64 / elapsed
        } else {
            0.0
        };

        self.samples.push(SpeedSample {
            timestamp: now,
            loaded,
            speed,
        });
        let average_speed = weighted_average(self.samples.recent(SMOOTHING_WINDOW));

        let remaining_time = if average_speed > 0.0 && average_speed.is_finite() {
            Some((total - loaded) as f64 / average_speed)
        } else {
            None
        };
        let eta = remaining_time
            .map(format_eta)
            .unwrap_or_else(|| CALCULATING.to_string());

        ProgressSnapshot {
            loaded,
            total,
            percentage,
            speed,
            average_speed,
            remaining_time,
            eta,
            elapsed_time: elapsed,
        }
    }

    pub fn samples(&self) -> impl Iterator<Item = &SpeedSample> {
        self.samples.iter()
    }
}

/// `round(loaded / total * 100)`, clamped to 0..=100.
pub fn percentage(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (loaded as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Weighted moving average of sample speeds: the oldest sample has weight 1,
/// each newer one weighs one more.
pub fn weighted_average<'a>(samples: impl IntoIterator<Item = &'a SpeedSample>) -> f64 {
    let (weighted, weights) = samples
        .into_iter()
        .zip(1u32..)
        .fold((0.0, 0.0), |(sum, wsum), (sample, w)| {
            (sum + sample.speed * f64::from(w), wsum + f64::from(w))
        });
    if weights == 0.0 { 0.0 } else { weighted / weights }
}

/// `"42s remaining"`, `"3m 5s remaining"`, `"1h 20m remaining"`.
pub fn format_eta(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.round() as u64
    } else {
        0
    };

    if total < 60 {
        format!("{total}s remaining")
    } else if total < 3600 {
        let (m, s) = (total / 60, total % 60);
        if s == 0 {
            format!("{m}m remaining")
        } else {
            format!("{m}m {s}s remaining")
        }
    } else {
        let (h, m) = (total / 3600, (total % 3600) / 60);
        if m == 0 {
            format!("{h}h remaining")
        } else {
            format!("{h}h {m}m remaining")
        }
    }
}

/// Human-readable byte count with binary units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

pub fn format_speed(bytes_per_second: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_second.max(0.0) as u64))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use aecaxis_flow::ManualClock;

    use super::*;

    const MB: f64 = 1_000_000.0;

    fn sample(speed: f64) -> SpeedSample {
        SpeedSample {
            timestamp: Instant::now(),
            loaded: 0,
            speed,
        }
    }

    #[test]
    fn weighted_average_favors_recent_samples() {
        let samples: Vec<_> = [1.0, 2.0, 3.0, 4.0, 5.0].map(|s| sample(s * MB)).into();
        let avg = weighted_average(&samples);
        assert!((avg - 3_666_666.67).abs() < 1.0, "got {avg}");
    }

    #[test]
    fn weighted_average_of_nothing_is_zero() {
        assert_eq!(weighted_average(&Vec::<SpeedSample>::new()), 0.0);
    }

    #[test]
    fn percentage_is_rounded_and_bounded() {
        for total in [1u64, 3, 7, 1000, 524_288_000] {
            for loaded in [0, total / 3, total / 2, total] {
                let pct = percentage(loaded, total);
                let expected = (loaded as f64 / total as f64 * 100.0).round() as u8;
                assert_eq!(pct, expected);
                assert!(pct <= 100);
            }
        }
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
    }

    #[test]
    fn sample_history_is_capped() {
        let clock = ManualClock::new();
        let mut est = ProgressEstimator::new(clock.shared());
        for i in 1..=25u64 {
            clock.advance(Duration::from_millis(100));
            est.update(i * 1000, 100_000);
            assert!(est.samples().count() <= SAMPLE_CAPACITY);
        }
        assert_eq!(est.samples().count(), SAMPLE_CAPACITY);
    }

    #[test]
    fn snapshot_speed_and_eta() {
        let clock = ManualClock::new();
        let mut est = ProgressEstimator::new(clock.shared());

        let first = est.update(0, 10_000_000);
        assert_eq!(first.speed, 0.0);
        assert_eq!(first.remaining_time, None);
        assert_eq!(first.eta, "Calculating...");

        clock.advance(Duration::from_secs(2));
        let snap = est.update(2_000_000, 10_000_000);
        assert_eq!(snap.percentage, 20);
        assert!((snap.speed - 1_000_000.0).abs() < 1e-6);
        assert!((snap.elapsed_time - 2.0).abs() < 1e-9);
        // Samples 0 and 1 MB/s with weights 1 and 2.
        let expected_avg = 2_000_000.0 / 3.0;
        assert!((snap.average_speed - expected_avg).abs() < 1e-6);
        assert_eq!(snap.remaining_time.map(|r| r.round()), Some(12.0));
        assert_eq!(snap.eta, "12s remaining");
    }

    #[test]
    fn loaded_never_goes_backwards_or_past_total() {
        let clock = ManualClock::new();
        let mut est = ProgressEstimator::new(clock.shared());
        clock.advance(Duration::from_secs(1));
        assert_eq!(est.update(600, 1000).percentage, 60);
        assert_eq!(est.update(100, 1000).loaded, 600);
        assert_eq!(est.update(5000, 1000).loaded, 1000);
        assert_eq!(est.update(1000, 1000).percentage, 100);
    }

    #[test]
    fn eta_formats() {
        assert_eq!(format_eta(42.4), "42s remaining");
        assert_eq!(format_eta(180.0), "3m remaining");
        assert_eq!(format_eta(185.0), "3m 5s remaining");
        assert_eq!(format_eta(3600.0), "1h remaining");
        assert_eq!(format_eta(4800.0), "1h 20m remaining");
        assert_eq!(format_eta(-3.0), "0s remaining");
    }

    #[test]
    fn byte_formats() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(500 * 1024 * 1024), "500.0 MB");
        assert_eq!(format_speed(2.0 * 1024.0 * 1024.0), "2.0 MB/s");
    }
}
