//! InsertPulse - rate-limited insert benchmark
//!
//! InsertPulse measures how many item inserts a storage backend sustains at a
//! target rate, and at what latency, with many concurrent agents sharing one
//! pacing budget.
//!
//! # Architecture
//!
//! - **Deterministic items**: content derived from `(cycle, step)` ids, so any
//!   stored item can be regenerated and verified
//! - **Token-bucket pacing**: one limiter shared by every agent of a phase
//! - **Streaming stats**: HdrHistogram latencies, lock-free call counters
//! - **Phases**: barrier start, periodic progress, deadline and bounded drain
//! - **Pluggable containers**: document and table backends behind one trait

pub mod config;
pub mod container;
pub mod coordinator;
pub mod item;
pub mod output;
pub mod ratelimit;
pub mod stats;
pub mod util;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use container::Container;
pub use coordinator::BenchmarkClient;

/// Result type used throughout InsertPulse
pub type Result<T> = anyhow::Result<T>;
