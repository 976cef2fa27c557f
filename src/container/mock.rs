//! Mock container for testing
//!
//! Records every call in order and can be told to fail inserts, to report
//! duplicate keys, to refuse counting or to slow writes down. Clones share
//! state, so a test can keep a handle for inspection while agents use another.
//!
//! # Example
//!
//! ```
//! use insertpulse::container::Container;
//! use insertpulse::container::mock::{ContainerCall, MockContainer};
//! use insertpulse::item::ItemGenerator;
//! use insertpulse::item::id::ItemIdGenerator;
//!
//! let mock = MockContainer::new();
//! let gen = ItemGenerator::new(ItemIdGenerator::increasing(0), 0);
//!
//! mock.delete_all().unwrap();
//! assert!(mock.insert_many(&gen.generate_batch(3), false).unwrap());
//!
//! assert_eq!(mock.calls()[0], ContainerCall::DeleteAll);
//! assert_eq!(mock.stored_count(), 3);
//! ```

use super::{Container, ContainerError, ContainerKind, ItemCount, DEFAULT_MAX_BATCH};
use crate::item::Item;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerCall {
    CountUpTo(u64),
    ContainsAny,
    InsertOne(String),
    /// Number of items in the chunk
    InsertChunk(usize),
    FindByKey(String),
    DeleteAll,
}

impl ContainerCall {
    pub fn is_insert(&self) -> bool {
        matches!(self, ContainerCall::InsertOne(_) | ContainerCall::InsertChunk(_))
    }
}

/// Call-recording container backed by a hash map
#[derive(Clone)]
pub struct MockContainer {
    kind: ContainerKind,
    items: Arc<Mutex<HashMap<String, Item>>>,
    calls: Arc<Mutex<Vec<ContainerCall>>>,
    should_fail: Arc<AtomicBool>,
    report_duplicates: Arc<AtomicBool>,
    count_supported: Arc<AtomicBool>,
    write_latency_micros: Arc<AtomicU64>,
}

impl MockContainer {
    /// Collection-style mock: inserts succeed, counting supported
    pub fn new() -> Self {
        Self {
            kind: ContainerKind::Collection,
            items: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            should_fail: Arc::new(AtomicBool::new(false)),
            report_duplicates: Arc::new(AtomicBool::new(false)),
            count_supported: Arc::new(AtomicBool::new(true)),
            write_latency_micros: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Table-style mock: counting reports the unsupported sentinel
    pub fn table() -> Self {
        let mock = Self {
            kind: ContainerKind::Table,
            ..Self::new()
        };
        mock.set_count_supported(false);
        mock
    }

    /// Make every insert fail with a backend error
    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }

    /// Make every insert fail as if its first item already existed
    pub fn set_report_duplicates(&self, report: bool) {
        self.report_duplicates.store(report, Ordering::SeqCst);
    }

    pub fn set_count_supported(&self, supported: bool) {
        self.count_supported.store(supported, Ordering::SeqCst);
    }

    /// Delay applied to every insert call
    pub fn set_write_latency(&self, latency: Duration) {
        self.write_latency_micros
            .store(latency.as_micros() as u64, Ordering::SeqCst);
    }

    /// Put an item in place without recording a call
    pub fn preload(&self, item: Item) {
        self.lock_items().insert(item.id.clone(), item);
    }

    /// Copy of all recorded calls, oldest first
    pub fn calls(&self) -> Vec<ContainerCall> {
        self.lock_calls().clone()
    }

    pub fn clear_calls(&self) {
        self.lock_calls().clear();
    }

    pub fn stored_count(&self) -> usize {
        self.lock_items().len()
    }

    /// Number of insert calls (single or chunk) recorded so far
    pub fn insert_calls(&self) -> usize {
        self.lock_calls().iter().filter(|c| c.is_insert()).count()
    }

    fn lock_items(&self) -> MutexGuard<'_, HashMap<String, Item>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_calls(&self) -> MutexGuard<'_, Vec<ContainerCall>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: ContainerCall) {
        self.lock_calls().push(call);
    }

    fn before_write(&self, first_id: &str) -> Result<(), ContainerError> {
        let micros = self.write_latency_micros.load(Ordering::SeqCst);
        if micros > 0 {
            std::thread::sleep(Duration::from_micros(micros));
        }
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(ContainerError::Backend("Mock insert error".to_string()));
        }
        if self.report_duplicates.load(Ordering::SeqCst) {
            return Err(ContainerError::DuplicateKey(first_id.to_string()));
        }
        Ok(())
    }

    fn store(&self, item: &Item) -> Result<(), ContainerError> {
        let mut items = self.lock_items();
        if items.contains_key(&item.id) {
            return Err(ContainerError::DuplicateKey(item.id.clone()));
        }
        items.insert(item.id.clone(), item.clone());
        Ok(())
    }
}

impl Default for MockContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl Container for MockContainer {
    fn name(&self) -> &str {
        "mock"
    }

    fn kind(&self) -> ContainerKind {
        self.kind
    }

    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH
    }

    fn count_up_to(&self, max_count: u64) -> Result<ItemCount, ContainerError> {
        self.record(ContainerCall::CountUpTo(max_count));
        if !self.count_supported.load(Ordering::SeqCst) {
            return Ok(ItemCount::Unsupported);
        }
        Ok(ItemCount::Exact((self.stored_count() as u64).min(max_count)))
    }

    fn contains_any(&self) -> Result<bool, ContainerError> {
        self.record(ContainerCall::ContainsAny);
        Ok(self.stored_count() > 0)
    }

    fn insert_one(&self, item: &Item) -> Result<(), ContainerError> {
        self.record(ContainerCall::InsertOne(item.id.clone()));
        self.before_write(&item.id)?;
        self.store(item)
    }

    fn insert_chunk(&self, items: &[Item], ordered: bool) -> Result<usize, ContainerError> {
        self.record(ContainerCall::InsertChunk(items.len()));
        self.before_write(items.first().map(|i| i.id.as_str()).unwrap_or_default())?;
        let mut inserted = 0;
        let mut first_error = None;
        for item in items {
            match self.store(item) {
                Ok(()) => inserted += 1,
                Err(e) if ordered => return Err(e),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(inserted),
        }
    }

    fn find_by_key(&self, id: &str) -> Result<Option<Item>, ContainerError> {
        self.record(ContainerCall::FindByKey(id.to_string()));
        Ok(self.lock_items().get(id).cloned())
    }

    fn delete_all(&self) -> Result<ItemCount, ContainerError> {
        self.record(ContainerCall::DeleteAll);
        let mut items = self.lock_items();
        let deleted = items.len() as u64;
        items.clear();
        if self.count_supported.load(Ordering::SeqCst) {
            Ok(ItemCount::Exact(deleted))
        } else {
            Ok(ItemCount::Unsupported)
        }
    }
}
