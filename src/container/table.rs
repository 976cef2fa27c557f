//! In-process table
//!
//! Rows carry typed columns (`id`, `value`, `description`, `vector`) keyed by
//! `id`. The table cannot count rows and does not report how many rows a
//! truncate removed, so both return [`ItemCount::Unsupported`] and emptiness
//! is checked with an existence probe.

use super::{BackendOptions, Container, ContainerError, ContainerKind, ItemCount, WriteSimulator};
use crate::item::Item;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// One stored row
#[derive(Debug, Clone, PartialEq)]
struct Row {
    id: String,
    value: i64,
    description: String,
    vector: Option<Vec<f32>>,
}

impl Row {
    fn from_item(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            value: item.value,
            description: item.description.clone(),
            vector: item.vector.clone(),
        }
    }

    fn to_item(&self) -> Item {
        Item::from_parts(
            self.id.clone(),
            self.value,
            self.description.clone(),
            self.vector.clone(),
        )
    }
}

/// Table held in memory
#[derive(Debug)]
pub struct MemoryTable {
    name: String,
    max_batch: usize,
    simulator: WriteSimulator,
    rows: Mutex<BTreeMap<String, Row>>,
}

impl MemoryTable {
    pub fn new(name: impl Into<String>, options: &BackendOptions) -> Self {
        Self {
            name: name.into(),
            max_batch: options.max_batch.max(1),
            simulator: WriteSimulator::new(options),
            rows: Mutex::new(BTreeMap::new()),
        }
    }

    fn rows(&self) -> MutexGuard<'_, BTreeMap<String, Row>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a row, returning its primary key columns
    fn put(rows: &mut BTreeMap<String, Row>, row: Row) -> Result<Vec<String>, ContainerError> {
        if rows.contains_key(&row.id) {
            return Err(ContainerError::DuplicateKey(row.id));
        }
        let key = vec![row.id.clone()];
        rows.insert(row.id.clone(), row);
        Ok(key)
    }
}

impl Container for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::Table
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }

    fn count_up_to(&self, _max_count: u64) -> Result<ItemCount, ContainerError> {
        Ok(ItemCount::Unsupported)
    }

    fn contains_any(&self) -> Result<bool, ContainerError> {
        Ok(self.rows().values().next().is_some())
    }

    fn insert_one(&self, item: &Item) -> Result<(), ContainerError> {
        self.simulator.on_write()?;
        let key = Self::put(&mut self.rows(), Row::from_item(item))?;
        match key.as_slice() {
            [id] if *id == item.id => Ok(()),
            [id] => Err(ContainerError::IdMismatch {
                expected: item.id.clone(),
                actual: id.clone(),
            }),
            other => Err(ContainerError::Backend(format!(
                "expected 1 primary key column for inserted row, got {}",
                other.len()
            ))),
        }
    }

    fn insert_chunk(&self, items: &[Item], ordered: bool) -> Result<usize, ContainerError> {
        if items.len() > self.max_batch {
            return Err(ContainerError::Backend(format!(
                "too many rows in one insert: {} (max {})",
                items.len(),
                self.max_batch
            )));
        }
        self.simulator.on_write()?;

        let mut rows = self.rows();
        let mut inserted = 0;
        let mut first_error = None;
        for item in items {
            match Self::put(&mut rows, Row::from_item(item)) {
                Ok(_) => inserted += 1,
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
        Ok(self.rows().get(id).map(Row::to_item))
    }

    fn delete_all(&self) -> Result<ItemCount, ContainerError> {
        self.rows().clear();
        Ok(ItemCount::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::id::ItemIdGenerator;
    use crate::item::ItemGenerator;

    #[test]
    fn test_counts_unsupported() {
        let table = MemoryTable::new("rows", &BackendOptions::new());
        assert_eq!(table.count_up_to(10).unwrap(), ItemCount::Unsupported);
        assert_eq!(table.delete_all().unwrap(), ItemCount::Unsupported);
    }

    #[test]
    fn test_validate_empty_uses_existence_probe() {
        let table = MemoryTable::new("rows", &BackendOptions::new());
        table.validate_empty().unwrap();

        let gen = ItemGenerator::new(ItemIdGenerator::increasing(0), 0);
        table.insert_one(&gen.generate_one()).unwrap();
        let err = table.validate_empty().unwrap_err();
        assert!(matches!(err, ContainerError::NotEmpty { .. }));
        assert!(err.to_string().contains("at least one item"));

        table.delete_all().unwrap();
        table.validate_empty().unwrap();
    }

    #[test]
    fn test_rows_keep_vector() {
        let table = MemoryTable::new("rows", &BackendOptions::new());
        let gen = ItemGenerator::new(ItemIdGenerator::increasing(0), 6);
        let batch = gen.generate_batch(4);
        assert!(table.insert_many(&batch, true).unwrap());

        let found = table.find_by_key(&batch[1].id).unwrap().unwrap();
        assert_eq!(found, batch[1]);
    }

    #[test]
    fn test_single_item_batch_inserts_one_row() {
        let table = MemoryTable::new("rows", &BackendOptions::new());
        let gen = ItemGenerator::new(ItemIdGenerator::increasing(0), 0);
        let batch = gen.generate_batch(1);
        assert!(table.insert_many(&batch, false).unwrap());
        assert!(table.find_by_key("id#1_0").unwrap().is_some());
        assert_eq!(table.rows().len(), 1);
    }

    #[test]
    fn test_duplicate_row_rejected() {
        let table = MemoryTable::new("rows", &BackendOptions::new());
        let gen = ItemGenerator::new(ItemIdGenerator::increasing(0), 0);
        let item = gen.generate_one();
        table.insert_one(&item).unwrap();
        assert!(matches!(
            table.insert_one(&item),
            Err(ContainerError::DuplicateKey(_))
        ));
    }
}
