//! Storage container abstraction
//!
//! A container is the collection- or table-like unit the benchmark writes
//! into. The load generator only needs a narrow capability set (insert, fetch
//! by key, count, wipe), captured by the [`Container`] trait so that
//! document-style and tabular backends are interchangeable.
//!
//! # Backends
//!
//! - [`memory::MemoryCollection`]: document store, supports exact counting
//! - [`table::MemoryTable`]: row store, counting unsupported
//! - [`mock::MockContainer`]: call-recording backend for tests
//!
//! # Count sentinel
//!
//! Some stores cannot count. Instead of a magic negative number they return
//! [`ItemCount::Unsupported`], and callers skip the check (or fall back to an
//! existence probe) when they see it.

pub mod memory;
pub mod mock;
pub mod table;

use crate::item::Item;
use memory::MemoryCollection;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use table::MemoryTable;
use thiserror::Error;

/// Items counted before `validate_empty` gives up on an exact figure
pub const EMPTY_CHECK_LIMIT: u64 = 100;

/// Default maximum number of items a backend accepts in one insert call
pub const DEFAULT_MAX_BATCH: usize = 50;

/// Storage style of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    /// Document collection
    #[default]
    Collection,
    /// Table with typed columns
    Table,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerKind::Collection => write!(f, "Collection"),
            ContainerKind::Table => write!(f, "Table"),
        }
    }
}

/// Result of a count or delete that the backend may not be able to size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemCount {
    Exact(u64),
    /// The backend does not report counts; skip any check relying on one
    Unsupported,
}

impl ItemCount {
    pub fn exact(self) -> Option<u64> {
        match self {
            ItemCount::Exact(n) => Some(n),
            ItemCount::Unsupported => None,
        }
    }

    pub fn is_supported(self) -> bool {
        matches!(self, ItemCount::Exact(_))
    }
}

impl fmt::Display for ItemCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemCount::Exact(n) => write!(f, "{}", n),
            ItemCount::Unsupported => write!(f, "(count unsupported)"),
        }
    }
}

/// Errors raised by a container
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The backend rejected or failed the call
    #[error("backend error: {0}")]
    Backend(String),

    #[error("{kind} '{name}' not empty; {detail}")]
    NotEmpty {
        kind: ContainerKind,
        name: String,
        detail: String,
    },

    /// Insert acknowledged under a different id than the one sent
    #[error("unexpected id for inserted item: expected '{expected}', got '{actual}'")]
    IdMismatch { expected: String, actual: String },

    /// An id was written twice; the generator's uniqueness guarantee is broken
    #[error("duplicate key '{0}'")]
    DuplicateKey(String),

    /// A freshly inserted item could not be read back
    #[error("item '{0}' not found")]
    NotFound(String),
}

impl ContainerError {
    /// Whether the error signals a broken id-uniqueness invariant
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, ContainerError::DuplicateKey(_))
    }
}

/// Capability set the benchmark needs from a storage backend
///
/// Implementations must be safe for concurrent use: every agent of a phase
/// calls into the same container.
pub trait Container: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> ContainerKind;

    /// Largest batch the backend accepts in a single insert call
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH
    }

    /// Count items, stopping at `max_count`
    fn count_up_to(&self, max_count: u64) -> Result<ItemCount, ContainerError>;

    /// Existence probe: does the container hold at least one item?
    fn contains_any(&self) -> Result<bool, ContainerError>;

    /// Insert one item, failing unless the acknowledged id matches `item.id`
    fn insert_one(&self, item: &Item) -> Result<(), ContainerError>;

    /// Insert at most [`max_batch_size`](Container::max_batch_size) items;
    /// returns how many were acknowledged
    ///
    /// With `ordered`, insertion stops at the first failing item. Without it,
    /// the remaining items are still attempted and the first failure is
    /// reported afterwards.
    fn insert_chunk(&self, items: &[Item], ordered: bool) -> Result<usize, ContainerError>;

    fn find_by_key(&self, id: &str) -> Result<Option<Item>, ContainerError>;

    /// Remove every item; returns the number deleted if the backend knows it
    fn delete_all(&self) -> Result<ItemCount, ContainerError>;

    /// Fail with [`ContainerError::NotEmpty`] if the container holds items
    ///
    /// Uses an exact count when available and an existence probe otherwise.
    fn validate_empty(&self) -> Result<(), ContainerError> {
        let detail = match self.count_up_to(EMPTY_CHECK_LIMIT)? {
            ItemCount::Exact(0) => return Ok(()),
            ItemCount::Exact(n) if n >= EMPTY_CHECK_LIMIT => {
                format!("has over {} items", EMPTY_CHECK_LIMIT)
            }
            ItemCount::Exact(n) => format!("has {} items", n),
            ItemCount::Unsupported => {
                if !self.contains_any()? {
                    return Ok(());
                }
                "has at least one item".to_string()
            }
        };
        Err(ContainerError::NotEmpty {
            kind: self.kind(),
            name: self.name().to_string(),
            detail,
        })
    }

    /// Insert a batch; `Ok(true)` only if every item was acknowledged
    ///
    /// A single item goes through [`insert_one`](Container::insert_one);
    /// larger batches are split to respect the backend's batch limit. An
    /// unordered insert still tries every chunk after one fails and returns
    /// the first error at the end.
    fn insert_many(&self, items: &[Item], ordered: bool) -> Result<bool, ContainerError> {
        match items {
            [] => Ok(true),
            [item] => {
                self.insert_one(item)?;
                Ok(true)
            }
            _ => {
                let mut acknowledged = 0;
                let mut first_error = None;
                for chunk in items.chunks(self.max_batch_size().max(1)) {
                    match self.insert_chunk(chunk, ordered) {
                        Ok(n) => acknowledged += n,
                        Err(e) if ordered => return Err(e),
                        Err(e) => {
                            first_error.get_or_insert(e);
                        }
                    }
                }
                match first_error {
                    Some(e) => Err(e),
                    None => Ok(acknowledged == items.len()),
                }
            }
        }
    }
}

/// Simulated backend behaviour shared by the in-process containers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendOptions {
    /// Delay added to every write call
    #[serde(default)]
    pub latency_ms: u64,
    /// Fail every Nth write call with a backend error
    #[serde(default)]
    pub fail_every: Option<u64>,
    /// Largest batch accepted per insert call
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
}

fn default_max_batch() -> usize {
    DEFAULT_MAX_BATCH
}

impl BackendOptions {
    pub fn new() -> Self {
        Self {
            latency_ms: 0,
            fail_every: None,
            max_batch: DEFAULT_MAX_BATCH,
        }
    }
}

/// Open the in-process backend for `kind`
pub fn create_container(
    kind: ContainerKind,
    name: &str,
    options: &BackendOptions,
) -> Arc<dyn Container> {
    match kind {
        ContainerKind::Collection => Arc::new(MemoryCollection::new(name, options)),
        ContainerKind::Table => Arc::new(MemoryTable::new(name, options)),
    }
}

/// Applies [`BackendOptions`] to write calls
#[derive(Debug)]
pub(crate) struct WriteSimulator {
    latency: Duration,
    fail_every: Option<u64>,
    writes: AtomicU64,
}

impl WriteSimulator {
    pub(crate) fn new(options: &BackendOptions) -> Self {
        Self {
            latency: Duration::from_millis(options.latency_ms),
            fail_every: options.fail_every.filter(|n| *n > 0),
            writes: AtomicU64::new(0),
        }
    }

    /// Called at the start of every write; sleeps, then maybe injects a failure
    pub(crate) fn on_write(&self) -> Result<(), ContainerError> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        let n = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        match self.fail_every {
            Some(every) if n % every == 0 => Err(ContainerError::Backend(format!(
                "injected failure on write #{}",
                n
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_count_display() {
        assert_eq!(ItemCount::Exact(12).to_string(), "12");
        assert_eq!(ItemCount::Unsupported.to_string(), "(count unsupported)");
        assert_eq!(ItemCount::Exact(3).exact(), Some(3));
        assert_eq!(ItemCount::Unsupported.exact(), None);
        assert!(!ItemCount::Unsupported.is_supported());
    }

    #[test]
    fn test_invariant_violation_classification() {
        assert!(ContainerError::DuplicateKey("id#1_0".into()).is_invariant_violation());
        assert!(!ContainerError::Backend("timeout".into()).is_invariant_violation());
    }

    #[test]
    fn test_write_simulator_fail_every() {
        let sim = WriteSimulator::new(&BackendOptions {
            fail_every: Some(3),
            ..BackendOptions::new()
        });
        let results: Vec<bool> = (0..6).map(|_| sim.on_write().is_ok()).collect();
        assert_eq!(results, vec![true, true, false, true, true, false]);
    }

    #[test]
    fn test_write_simulator_zero_disables_failures() {
        let sim = WriteSimulator::new(&BackendOptions {
            fail_every: Some(0),
            ..BackendOptions::new()
        });
        assert!((0..10).all(|_| sim.on_write().is_ok()));
    }

    #[test]
    fn test_create_container() {
        let options = BackendOptions::new();
        let collection = create_container(ContainerKind::Collection, "docs", &options);
        assert_eq!(collection.kind(), ContainerKind::Collection);
        assert_eq!(collection.name(), "docs");
        assert!(collection.count_up_to(10).unwrap().is_supported());

        let table = create_container(ContainerKind::Table, "rows", &options);
        assert_eq!(table.kind(), ContainerKind::Table);
        assert!(!table.count_up_to(10).unwrap().is_supported());
    }

    #[test]
    fn test_not_empty_message() {
        let err = ContainerError::NotEmpty {
            kind: ContainerKind::Table,
            name: "items".into(),
            detail: "has at least one item".into(),
        };
        assert_eq!(err.to_string(), "Table 'items' not empty; has at least one item");
    }
}
