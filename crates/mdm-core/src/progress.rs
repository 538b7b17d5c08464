//! Progress reporting for a single transfer (bytes done, throughput, ETA).
//!
//! The aggregator counts bytes as chunks arrive and decides when a sample may be
//! emitted. Throughput is measured between consecutive emissions, so it tracks
//! recent speed rather than the lifetime average.

use serde::Serialize;
use std::time::{Duration, Instant};

/// Default minimum spacing between emitted samples.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Snapshot of download progress for one task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressSample {
    /// Cumulative bytes received.
    pub bytes: u64,
    /// Declared total in bytes; 0 when the server did not send one.
    pub total: u64,
    /// 0–100, `None` when the total is unknown.
    pub percentage: Option<f64>,
    /// Bytes per second since the previous sample.
    pub bytes_per_sec: f64,
    /// Seconds remaining at the current throughput; `None` when throughput is zero or total unknown.
    pub eta_secs: Option<f64>,
}

impl ProgressSample {
    /// Computes a sample from the previous emission point and the current counters.
    pub fn compute(prev_bytes: u64, prev_at: Instant, bytes: u64, total: u64, now: Instant) -> Self {
        let elapsed = now.saturating_duration_since(prev_at).as_secs_f64();
        let delta = bytes.saturating_sub(prev_bytes);
        let bytes_per_sec = if elapsed > 0.0 {
            delta as f64 / elapsed
        } else {
            0.0
        };
        let percentage = if total > 0 {
            Some((bytes as f64 / total as f64 * 100.0).min(100.0))
        } else {
            None
        };
        let eta_secs = if total > 0 && bytes_per_sec > 0.0 {
            Some(total.saturating_sub(bytes) as f64 / bytes_per_sec)
        } else {
            None
        };
        Self {
            bytes,
            total,
            percentage,
            bytes_per_sec,
            eta_secs,
        }
    }

    pub fn is_indeterminate(&self) -> bool {
        self.percentage.is_none()
    }
}

/// Per-task counters plus the emission throttle.
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    bytes: u64,
    total: u64,
    interval: Duration,
    last_emit_at: Instant,
    last_emit_bytes: u64,
}

impl ProgressAggregator {
    /// `total` is the declared length (`None` / 0 = unknown). `now` is the transfer start.
    pub fn new(total: Option<u64>, interval: Duration, now: Instant) -> Self {
        Self {
            bytes: 0,
            total: total.unwrap_or(0),
            interval,
            last_emit_at: now,
            last_emit_bytes: 0,
        }
    }

    pub fn on_chunk(&mut self, len: usize) {
        self.bytes = self.bytes.saturating_add(len as u64);
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// True at most once per interval, however fast chunks arrive.
    pub fn should_emit(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_emit_at) >= self.interval
    }

    /// True when bytes arrived since the last emitted sample.
    pub fn has_unreported(&self) -> bool {
        self.bytes > self.last_emit_bytes
    }

    /// Computes a sample and makes `now` the new reference point.
    pub fn sample(&mut self, now: Instant) -> ProgressSample {
        let s = ProgressSample::compute(
            self.last_emit_bytes,
            self.last_emit_at,
            self.bytes,
            self.total,
            now,
        );
        self.last_emit_at = now;
        self.last_emit_bytes = self.bytes;
        s
    }
}

/// Human-readable size with 1024-based units, e.g. `1.5 GB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_with_known_total() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(2);
        let s = ProgressSample::compute(0, t0, 500, 1000, t1);
        assert_eq!(s.bytes, 500);
        assert_eq!(s.total, 1000);
        assert_eq!(s.percentage, Some(50.0));
        assert!((s.bytes_per_sec - 250.0).abs() < 1e-9);
        assert!((s.eta_secs.unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn sample_with_unknown_total_is_indeterminate() {
        let t0 = Instant::now();
        let s = ProgressSample::compute(0, t0, 500, 0, t0 + Duration::from_secs(1));
        assert!(s.is_indeterminate());
        assert!(s.eta_secs.is_none());
        assert!((s.bytes_per_sec - 500.0).abs() < 1e-9);
    }

    #[test]
    fn zero_throughput_has_no_eta() {
        let t0 = Instant::now();
        let s = ProgressSample::compute(100, t0, 100, 1000, t0 + Duration::from_secs(1));
        assert_eq!(s.bytes_per_sec, 0.0);
        assert!(s.eta_secs.is_none());
        assert_eq!(s.percentage, Some(10.0));
    }

    #[test]
    fn throughput_is_measured_since_previous_sample() {
        let t0 = Instant::now();
        let mut agg = ProgressAggregator::new(Some(10_000), Duration::from_secs(1), t0);
        agg.on_chunk(4000);
        let first = agg.sample(t0 + Duration::from_secs(1));
        assert!((first.bytes_per_sec - 4000.0).abs() < 1e-9);
        agg.on_chunk(1000);
        let second = agg.sample(t0 + Duration::from_secs(2));
        assert_eq!(second.bytes, 5000);
        assert!((second.bytes_per_sec - 1000.0).abs() < 1e-9);
        assert!((second.eta_secs.unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn should_emit_is_throttled_to_interval() {
        let t0 = Instant::now();
        let mut agg = ProgressAggregator::new(None, Duration::from_secs(1), t0);
        for _ in 0..100 {
            agg.on_chunk(10);
        }
        assert!(!agg.should_emit(t0 + Duration::from_millis(999)));
        assert!(agg.should_emit(t0 + Duration::from_secs(1)));
        agg.sample(t0 + Duration::from_secs(1));
        assert!(!agg.should_emit(t0 + Duration::from_millis(1500)));
        assert!(!agg.has_unreported());
        agg.on_chunk(1);
        assert!(agg.has_unreported());
    }

    #[test]
    fn percentage_never_exceeds_100() {
        let t0 = Instant::now();
        let s = ProgressSample::compute(0, t0, 1200, 1000, t0 + Duration::from_secs(1));
        assert_eq!(s.percentage, Some(100.0));
        assert_eq!(s.eta_secs, Some(0.0));
    }

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(0), "0 Bytes");
        assert_eq!(format_bytes(512), "512 Bytes");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5 GB");
    }
}
