//! Phase metrics
//!
//! One [`PhaseMetrics`] is shared by every agent of a phase. Call counters are
//! cache-line aligned atomics; latencies go into an HdrHistogram behind a
//! mutex that is held only for the duration of a single `record`.
//!
//! # Example
//!
//! ```
//! use insertpulse::stats::PhaseMetrics;
//! use std::time::Duration;
//!
//! let metrics = PhaseMetrics::new(20);
//! metrics.report_success(Duration::from_millis(15));
//! metrics.report_success(Duration::from_millis(25));
//! metrics.report_failure(Duration::from_millis(900));
//!
//! assert_eq!(metrics.ok_calls(), 2);
//! assert_eq!(metrics.failed_calls(), 1);
//! println!("{}{}", metrics.summary_text(), metrics.throughput_text());
//! ```

pub mod histogram;

use crate::util::time::calculate_rate;
use histogram::LatencyHistogram;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Cache-line aligned atomic counter
///
/// Agents on different cores bump these on every call; padding each counter
/// to its own 64-byte line keeps them from invalidating one another.
#[repr(align(64))]
#[derive(Debug)]
pub struct AlignedCounter {
    value: AtomicU64,
    _padding: [u8; 56],
}

impl AlignedCounter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
            _padding: [0; 56],
        }
    }

    #[inline]
    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for AlignedCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Concurrently updated statistics for one phase
#[derive(Debug)]
pub struct PhaseMetrics {
    batch_size: usize,
    started: Instant,
    ok_calls: AlignedCounter,
    failed_calls: AlignedCounter,
    ok_latency: Mutex<LatencyHistogram>,
    failed_latency: Mutex<LatencyHistogram>,
}

impl PhaseMetrics {
    /// Fresh metrics; the throughput clock starts now
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            started: Instant::now(),
            ok_calls: AlignedCounter::new(),
            failed_calls: AlignedCounter::new(),
            ok_latency: Mutex::new(LatencyHistogram::new()),
            failed_latency: Mutex::new(LatencyHistogram::new()),
        }
    }

    pub fn report_success(&self, latency: Duration) {
        self.ok_calls.increment();
        lock(&self.ok_latency).record(latency);
    }

    /// Failed calls are counted; their latency is kept apart from successes
    pub fn report_failure(&self, latency: Duration) {
        self.failed_calls.increment();
        lock(&self.failed_latency).record(latency);
    }

    pub fn ok_calls(&self) -> u64 {
        self.ok_calls.get()
    }

    pub fn failed_calls(&self) -> u64 {
        self.failed_calls.get()
    }

    pub fn total_calls(&self) -> u64 {
        self.ok_calls() + self.failed_calls()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Calls per second since the metrics were created
    pub fn ops_per_sec(&self) -> f64 {
        calculate_rate(self.total_calls(), self.elapsed())
    }

    /// Records per second: calls per second times the batch size
    pub fn records_per_sec(&self) -> f64 {
        self.ops_per_sec() * self.batch_size as f64
    }

    /// Copy of the success-latency histogram
    pub fn ok_latency(&self) -> LatencyHistogram {
        lock(&self.ok_latency).clone()
    }

    /// `[OK: n (p50/p95: a/b ms), Fail: f]`
    pub fn summary_text(&self) -> String {
        let (p50, p95) = {
            let hist = lock(&self.ok_latency);
            (hist.percentile_millis(50.0), hist.percentile_millis(95.0))
        };
        format!(
            "[OK: {} (p50/p95: {:.1}/{:.1} ms), Fail: {}]",
            self.ok_calls(),
            p50,
            p95,
            self.failed_calls()
        )
    }

    /// `; x ops/sec (y records/sec)`, appended to the summary in progress lines
    pub fn throughput_text(&self) -> String {
        let ops = self.ops_per_sec();
        format!(
            "; {:.1} ops/sec ({:.1} records/sec)",
            ops,
            ops * self.batch_size as f64
        )
    }

    /// Point-in-time copy of every figure, rates over the time since creation
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot_over(self.elapsed())
    }

    /// Copy of every figure with rates computed over a fixed `elapsed`
    ///
    /// Used to freeze a finished phase, whose figures must not keep decaying
    /// as the metrics clock runs on.
    pub fn snapshot_over(&self, elapsed: Duration) -> MetricsSnapshot {
        let ok = lock(&self.ok_latency).clone();
        let failed = lock(&self.failed_latency).clone();
        let ok_calls = self.ok_calls();
        let failed_calls = self.failed_calls();
        let ops_per_sec = calculate_rate(ok_calls + failed_calls, elapsed);
        MetricsSnapshot {
            ok_calls,
            failed_calls,
            batch_size: self.batch_size,
            elapsed_secs: elapsed.as_secs_f64(),
            ops_per_sec,
            records_per_sec: ops_per_sec * self.batch_size as f64,
            ok_latency: LatencySummary::from_histogram(&ok),
            failed_latency: LatencySummary::from_histogram(&failed),
        }
    }
}

fn lock(hist: &Mutex<LatencyHistogram>) -> MutexGuard<'_, LatencyHistogram> {
    hist.lock().unwrap_or_else(|e| e.into_inner())
}

/// Latency figures in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: u64,
    pub min_ms: f64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

impl LatencySummary {
    pub fn from_histogram(hist: &LatencyHistogram) -> Self {
        let ms = |d: Option<Duration>| d.map(|d| d.as_secs_f64() * 1_000.0).unwrap_or(0.0);
        Self {
            count: hist.len(),
            min_ms: ms(hist.min()),
            mean_ms: ms(hist.mean()),
            p50_ms: hist.percentile_millis(50.0),
            p95_ms: hist.percentile_millis(95.0),
            p99_ms: hist.percentile_millis(99.0),
            max_ms: ms(hist.max()),
        }
    }
}

/// Serializable copy of [`PhaseMetrics`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub ok_calls: u64,
    pub failed_calls: u64,
    pub batch_size: usize,
    pub elapsed_secs: f64,
    pub ops_per_sec: f64,
    pub records_per_sec: f64,
    pub ok_latency: LatencySummary,
    pub failed_latency: LatencySummary,
}

impl MetricsSnapshot {
    pub fn total_calls(&self) -> u64 {
        self.ok_calls + self.failed_calls
    }
}
