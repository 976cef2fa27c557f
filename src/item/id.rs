//! Two-level item identifiers
//!
//! Every generation call allocates one *cycle*; the items produced by that
//! call are numbered by *step* inside the cycle. Because cycles are handed out
//! by a single atomic counter, ids stay unique across all agents sharing one
//! generator, no matter how their calls interleave.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Immutable `(cycle, step)` identifier of a generated item
///
/// Doubles as the seed for the item's pseudo-random content, so any item can
/// be rebuilt from its id alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId {
    cycle: i64,
    step: u32,
}

impl ItemId {
    pub const fn new(cycle: i64, step: u32) -> Self {
        Self { cycle, step }
    }

    #[inline]
    pub fn cycle(&self) -> i64 {
        self.cycle
    }

    #[inline]
    pub fn step(&self) -> u32 {
        self.step
    }

    /// Seed for content generation: cycle in the high 32 bits, step in the low
    #[inline]
    pub fn seed(&self) -> u64 {
        ((self.cycle as u64) << 32) | u64::from(self.step)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id#{}_{}", self.cycle, self.step)
    }
}

/// Direction in which the cycle counter moves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleDirection {
    Increasing,
    Decreasing,
}

impl CycleDirection {
    #[inline]
    fn delta(self) -> i64 {
        match self {
            CycleDirection::Increasing => 1,
            CycleDirection::Decreasing => -1,
        }
    }
}

/// Thread-safe generator of [`ItemId`]s
///
/// The only mutable state is the cycle counter, advanced with a single atomic
/// read-modify-write so that no two callers ever observe the same cycle.
#[derive(Debug)]
pub struct ItemIdGenerator {
    direction: CycleDirection,
    cycle: AtomicI64,
}

impl ItemIdGenerator {
    /// Generator whose first allocated cycle is `start_cycle + 1`
    pub fn increasing(start_cycle: i64) -> Self {
        Self {
            direction: CycleDirection::Increasing,
            cycle: AtomicI64::new(start_cycle),
        }
    }

    /// Generator whose first allocated cycle is `start_cycle - 1`
    pub fn decreasing(start_cycle: i64) -> Self {
        Self {
            direction: CycleDirection::Decreasing,
            cycle: AtomicI64::new(start_cycle),
        }
    }

    pub fn direction(&self) -> CycleDirection {
        self.direction
    }

    /// Advance the counter once and return the newly allocated cycle
    #[inline]
    pub fn allocate_cycle(&self) -> i64 {
        let delta = self.direction.delta();
        self.cycle.fetch_add(delta, Ordering::Relaxed) + delta
    }

    /// Most recently allocated cycle (or the start value if none yet)
    pub fn current_cycle(&self) -> i64 {
        self.cycle.load(Ordering::Relaxed)
    }

    /// Id for a single item: a fresh cycle with step 0
    pub fn next_id(&self) -> ItemId {
        ItemId::new(self.allocate_cycle(), 0)
    }

    /// `count` ids sharing one fresh cycle, steps `0..count`
    pub fn next_ids(&self, count: usize) -> Vec<ItemId> {
        let cycle = self.allocate_cycle();
        (0..count as u32).map(|step| ItemId::new(cycle, step)).collect()
    }
}
