//! Token-bucket pacing shared by all agents of a phase
//!
//! The bucket holds at most `capacity` permits (target rate plus a 10% burst
//! allowance) and is refilled greedily: tokens trickle in continuously at the
//! target rate instead of arriving in one lump per second.
//!
//! A fresh bucket starts with only the burst allowance, not a full second's
//! worth of tokens. Over any window of at least one second the number of
//! permits handed out therefore stays within `rate * seconds * 1.1`.
//!
//! # Example
//!
//! ```
//! use insertpulse::ratelimit::RateLimiter;
//!
//! let limiter = RateLimiter::new(100).unwrap();
//! assert_eq!(limiter.capacity(), 110);
//!
//! // Non-blocking: callers back off and retry on `false`
//! if limiter.try_consume(1) {
//!     // perform one operation
//! }
//! ```

use crate::Result;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Extra capacity on top of the target rate
pub const BURST_FRACTION: f64 = 0.1;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Thread-safe token bucket
///
/// Refill and consumption happen under one short critical section, so two
/// callers can never take the same token and the level never exceeds
/// capacity.
#[derive(Debug)]
pub struct RateLimiter {
    target_rate: u32,
    capacity: u64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Bucket for `target_rate` operations per second
    ///
    /// # Errors
    ///
    /// Fails for a zero rate, which would give the bucket no capacity.
    pub fn new(target_rate: u32) -> Result<Self> {
        if target_rate == 0 {
            anyhow::bail!("rate limiter needs a positive target rate, got 0");
        }
        let burst = (f64::from(target_rate) * BURST_FRACTION).round() as u64;
        let capacity = u64::from(target_rate) + burst;
        Ok(Self::with_limits(target_rate, capacity, burst))
    }

    /// Bucket with explicit capacity and starting level
    pub fn with_limits(target_rate: u32, capacity: u64, initial_tokens: u64) -> Self {
        Self {
            target_rate,
            capacity,
            refill_per_sec: f64::from(target_rate),
            state: Mutex::new(BucketState {
                tokens: initial_tokens.min(capacity) as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Take `tokens` permits if available; never blocks
    pub fn try_consume(&self, tokens: u64) -> bool {
        let mut state = self.refilled();
        let needed = tokens as f64;
        if state.tokens >= needed {
            state.tokens -= needed;
            true
        } else {
            false
        }
    }

    /// Current token level after refill
    pub fn available_tokens(&self) -> f64 {
        self.refilled().tokens
    }

    fn refilled(&self) -> MutexGuard<'_, BucketState> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill);
        if !elapsed.is_zero() {
            let refill = elapsed.as_secs_f64() * self.refill_per_sec;
            state.tokens = (state.tokens + refill).min(self.capacity as f64);
            state.last_refill = now;
        }
        state
    }
}
