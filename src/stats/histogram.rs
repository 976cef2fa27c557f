//! Latency histogram using HdrHistogram
//!
//! Wraps [`hdrhistogram::Histogram`] so percentiles come from a fixed-size
//! bucket structure instead of a list of every sample. Memory stays constant
//! no matter how long a phase runs.
//!
//! # Example
//!
//! ```
//! use insertpulse::stats::histogram::LatencyHistogram;
//! use std::time::Duration;
//!
//! let mut hist = LatencyHistogram::new();
//! hist.record(Duration::from_millis(12));
//! hist.record(Duration::from_millis(20));
//! hist.record(Duration::from_millis(35));
//!
//! let p50 = hist.percentile(50.0).unwrap();
//! assert!(p50 >= Duration::from_millis(19) && p50 <= Duration::from_millis(21));
//! ```

use hdrhistogram::Histogram;
use std::time::Duration;

/// Highest trackable latency: 1 hour in nanoseconds
const MAX_TRACKABLE_NANOS: u64 = 3_600_000_000_000;

/// Recorded latencies, 1ns to 1 hour, 3 significant digits
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    histogram: Histogram<u64>,
}

impl LatencyHistogram {
    pub fn new() -> Self {
        // Bounds are constants known to be valid
        let histogram = Histogram::new_with_bounds(1, MAX_TRACKABLE_NANOS, 3)
            .expect("valid histogram bounds");
        Self { histogram }
    }

    /// Record one sample; values outside 1ns..1h are clamped
    #[inline]
    pub fn record(&mut self, latency: Duration) {
        let nanos = latency.as_nanos().min(u128::from(MAX_TRACKABLE_NANOS)) as u64;
        let _ = self.histogram.record(nanos.max(1));
    }

    /// Latency at `percentile` (0.0 - 100.0), `None` if empty
    pub fn percentile(&self, percentile: f64) -> Option<Duration> {
        if self.is_empty() {
            return None;
        }
        Some(Duration::from_nanos(
            self.histogram.value_at_percentile(percentile),
        ))
    }

    /// Percentile in fractional milliseconds, 0.0 if empty
    pub fn percentile_millis(&self, percentile: f64) -> f64 {
        self.percentile(percentile)
            .map(|d| d.as_secs_f64() * 1_000.0)
            .unwrap_or(0.0)
    }

    pub fn min(&self) -> Option<Duration> {
        if self.is_empty() {
            return None;
        }
        Some(Duration::from_nanos(self.histogram.min()))
    }

    pub fn max(&self) -> Option<Duration> {
        if self.is_empty() {
            return None;
        }
        Some(Duration::from_nanos(self.histogram.max()))
    }

    pub fn mean(&self) -> Option<Duration> {
        if self.is_empty() {
            return None;
        }
        Some(Duration::from_nanos(self.histogram.mean() as u64))
    }

    pub fn len(&self) -> u64 {
        self.histogram.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histogram.len() == 0
    }

    pub fn reset(&mut self) {
        self.histogram.reset();
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_histogram() {
        let hist = LatencyHistogram::new();
        assert_eq!(hist.len(), 0);
        assert!(hist.is_empty());
        assert!(hist.percentile(50.0).is_none());
        assert_eq!(hist.percentile_millis(95.0), 0.0);
    }

    #[test]
    fn test_percentiles() {
        let mut hist = LatencyHistogram::new();
        for i in 1..=100 {
            hist.record(Duration::from_millis(i));
        }

        let p50 = hist.percentile_millis(50.0);
        let p95 = hist.percentile_millis(95.0);
        assert!((49.5..=50.5).contains(&p50), "p50 = {}", p50);
        assert!((94.5..=95.5).contains(&p95), "p95 = {}", p95);
    }

    #[test]
    fn test_min_max_mean() {
        let mut hist = LatencyHistogram::new();
        hist.record(Duration::from_millis(10));
        hist.record(Duration::from_millis(20));
        hist.record(Duration::from_millis(30));

        let min = hist.min().unwrap().as_micros();
        let max = hist.max().unwrap().as_micros();
        let mean = hist.mean().unwrap().as_micros();
        assert!((9_990..=10_010).contains(&min));
        assert!((29_970..=30_030).contains(&max));
        assert!((19_900..=20_100).contains(&mean));
    }

    #[test]
    fn test_clamps_out_of_range() {
        let mut hist = LatencyHistogram::new();
        hist.record(Duration::ZERO);
        hist.record(Duration::from_secs(7200));
        assert_eq!(hist.len(), 2);
        // Max reports the bucket's highest equivalent value: 3 significant
        // digits allow 0.1% above the clamp
        let ceiling = MAX_TRACKABLE_NANOS + MAX_TRACKABLE_NANOS / 1_000;
        let max = hist.max().unwrap();
        assert!(max >= Duration::from_secs(3600), "{:?}", max);
        assert!(max <= Duration::from_nanos(ceiling), "{:?}", max);
    }

    #[test]
    fn test_reset() {
        let mut hist = LatencyHistogram::new();
        hist.record(Duration::from_millis(1));
        hist.reset();
        assert!(hist.is_empty());
    }
}
