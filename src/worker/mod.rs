//! Insert agents
//!
//! An [`Agent`] is the unit of concurrent load. While its phase is active it
//! repeatedly asks the shared [`RateLimiter`] for a permit, generates one
//! batch from the shared [`ItemGenerator`], submits it through the
//! [`Container`] and reports the outcome to the shared [`PhaseMetrics`].
//!
//! Backend failures are counted and the loop carries on; the only way out is
//! the phase deadline. The one exception is a duplicate key, which means ids
//! are no longer unique and the phase's numbers cannot be trusted.
//!
//! # Example
//!
//! ```
//! use insertpulse::container::mock::MockContainer;
//! use insertpulse::item::ItemGenerator;
//! use insertpulse::item::id::ItemIdGenerator;
//! use insertpulse::ratelimit::RateLimiter;
//! use insertpulse::stats::PhaseMetrics;
//! use insertpulse::worker::Agent;
//! use std::sync::Arc;
//! use std::time::{Duration, Instant};
//!
//! let container = Arc::new(MockContainer::new());
//! let generator = Arc::new(ItemGenerator::new(ItemIdGenerator::increasing(0), 0));
//! let agent = Agent::new(0, container.clone(), generator, 5, false);
//!
//! let limiter = RateLimiter::new(50).unwrap();
//! let metrics = PhaseMetrics::new(5);
//! let deadline = Instant::now() + Duration::from_millis(200);
//!
//! let report = agent.run("demo", deadline, &limiter, &metrics).unwrap();
//! assert_eq!(report.ok_batches, metrics.ok_calls());
//! ```

use crate::container::Container;
use crate::item::ItemGenerator;
use crate::ratelimit::RateLimiter;
use crate::stats::PhaseMetrics;
use crate::Result;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Pause after the rate limiter turns a request down
pub const THROTTLE_BACKOFF: Duration = Duration::from_millis(10);

/// Failed batches an agent reports individually before going quiet
const MAX_LOGGED_FAILURES: u64 = 5;

/// What one agent did during a phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentReport {
    pub agent_id: usize,
    pub ok_batches: u64,
    pub failed_batches: u64,
    /// Times the rate limiter refused a permit
    pub throttled: u64,
}

/// One concurrent inserter
pub struct Agent {
    id: usize,
    container: Arc<dyn Container>,
    generator: Arc<ItemGenerator>,
    batch_size: usize,
    ordered: bool,
    verbose: bool,
}

impl Agent {
    pub fn new(
        id: usize,
        container: Arc<dyn Container>,
        generator: Arc<ItemGenerator>,
        batch_size: usize,
        ordered: bool,
    ) -> Self {
        Self {
            id,
            container,
            generator,
            batch_size,
            ordered,
            verbose: false,
        }
    }

    /// Print start/finish lines for this agent
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Insert batches until `deadline`
    ///
    /// # Errors
    ///
    /// Only when the container reports a duplicate key. Every other failure
    /// is recorded in `metrics` and the loop continues.
    pub fn run(
        &self,
        phase: &str,
        deadline: Instant,
        limiter: &RateLimiter,
        metrics: &PhaseMetrics,
    ) -> Result<AgentReport> {
        let mut report = AgentReport {
            agent_id: self.id,
            ..AgentReport::default()
        };
        if self.verbose {
            println!("DEBUG: {} started '{}'", self, phase);
        }

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if !limiter.try_consume(1) {
                report.throttled += 1;
                thread::sleep(THROTTLE_BACKOFF.min(deadline - now));
                continue;
            }

            let batch = self.generator.generate_batch(self.batch_size);
            let start = Instant::now();
            let result = self.container.insert_many(&batch, self.ordered);
            let latency = start.elapsed();

            match result {
                Ok(true) => {
                    metrics.report_success(latency);
                    report.ok_batches += 1;
                }
                Ok(false) => {
                    metrics.report_failure(latency);
                    report.failed_batches += 1;
                    self.log_failure(&report, "not all items were acknowledged");
                }
                Err(e) if e.is_invariant_violation() => {
                    metrics.report_failure(latency);
                    return Err(anyhow::Error::new(e).context(format!(
                        "{} observed a duplicate id during '{}'",
                        self, phase
                    )));
                }
                Err(e) => {
                    metrics.report_failure(latency);
                    report.failed_batches += 1;
                    self.log_failure(&report, &e.to_string());
                }
            }
        }

        if self.verbose {
            println!(
                "DEBUG: {} finished '{}' (ok: {}, failed: {}, throttled: {})",
                self, phase, report.ok_batches, report.failed_batches, report.throttled
            );
        }
        Ok(report)
    }

    fn log_failure(&self, report: &AgentReport, message: &str) {
        if report.failed_batches <= MAX_LOGGED_FAILURES {
            eprintln!("WARN: exception for {}: {}", self, message);
        }
        if report.failed_batches == MAX_LOGGED_FAILURES {
            eprintln!("WARN: {} suppressing further failure messages", self);
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Agent #{}]", self.id)
    }
}
