//! In-process document collection
//!
//! Items are stored as JSON documents keyed by `_id`, with the vector under
//! `$vector`. Like most document stores, reads leave the vector out and
//! counting is exact up to the requested limit.

use super::{BackendOptions, Container, ContainerError, ContainerKind, ItemCount, WriteSimulator};
use crate::item::Item;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Document collection held in memory
#[derive(Debug)]
pub struct MemoryCollection {
    name: String,
    max_batch: usize,
    simulator: WriteSimulator,
    documents: Mutex<BTreeMap<String, Value>>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>, options: &BackendOptions) -> Self {
        Self {
            name: name.into(),
            max_batch: options.max_batch.max(1),
            simulator: WriteSimulator::new(options),
            documents: Mutex::new(BTreeMap::new()),
        }
    }

    fn documents(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.documents.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store a document and return the `_id` it was filed under
    fn store(
        documents: &mut BTreeMap<String, Value>,
        doc: Value,
    ) -> Result<String, ContainerError> {
        let id = doc
            .get("_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ContainerError::Backend("document without string '_id'".into()))?
            .to_string();
        if documents.contains_key(&id) {
            return Err(ContainerError::DuplicateKey(id));
        }
        documents.insert(id.clone(), doc);
        Ok(id)
    }
}

/// Document form of an item
pub fn to_document(item: &Item) -> Value {
    let mut doc = json!({
        "_id": item.id,
        "value": item.value,
        "description": item.description,
    });
    if let Some(vector) = &item.vector {
        doc["$vector"] = json!(vector);
    }
    doc
}

/// Item read back from a document; the vector is not returned
pub fn from_document(doc: &Value) -> Result<Item, ContainerError> {
    let id = doc
        .get("_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ContainerError::Backend("document without string '_id'".into()))?;
    let value = doc.get("value").and_then(Value::as_i64).unwrap_or(0);
    let description = doc
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Ok(Item::from_parts(id, value, description, None))
}

impl Container for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ContainerKind {
        ContainerKind::Collection
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }

    fn count_up_to(&self, max_count: u64) -> Result<ItemCount, ContainerError> {
        let count = self.documents().len() as u64;
        Ok(ItemCount::Exact(count.min(max_count)))
    }

    fn contains_any(&self) -> Result<bool, ContainerError> {
        Ok(!self.documents().is_empty())
    }

    fn insert_one(&self, item: &Item) -> Result<(), ContainerError> {
        self.simulator.on_write()?;
        let inserted_id = Self::store(&mut self.documents(), to_document(item))?;
        if inserted_id != item.id {
            return Err(ContainerError::IdMismatch {
                expected: item.id.clone(),
                actual: inserted_id,
            });
        }
        Ok(())
    }

    fn insert_chunk(&self, items: &[Item], ordered: bool) -> Result<usize, ContainerError> {
        if items.len() > self.max_batch {
            return Err(ContainerError::Backend(format!(
                "too many documents in one insert: {} (max {})",
                items.len(),
                self.max_batch
            )));
        }
        self.simulator.on_write()?;

        let mut documents = self.documents();
        let mut inserted = 0;
        let mut first_error = None;
        for item in items {
            match Self::store(&mut documents, to_document(item)) {
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
        self.documents().get(id).map(from_document).transpose()
    }

    fn delete_all(&self) -> Result<ItemCount, ContainerError> {
        let mut documents = self.documents();
        let deleted = documents.len() as u64;
        documents.clear();
        Ok(ItemCount::Exact(deleted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::id::{ItemId, ItemIdGenerator};
    use crate::item::ItemGenerator;

    fn collection() -> MemoryCollection {
        MemoryCollection::new("test_items", &BackendOptions::new())
    }

    #[test]
    fn test_document_round_trip_drops_vector() {
        let item = Item::from_id(ItemId::new(4, 2), 8);
        let doc = to_document(&item);
        assert_eq!(doc["_id"], "id#4_2");
        assert_eq!(doc["$vector"].as_array().unwrap().len(), 8);

        let back = from_document(&doc).unwrap();
        assert!(back.vector.is_none());
        assert!(Item::verify_similarity(&item, &back).is_ok());
    }

    #[test]
    fn test_insert_find_count_delete() {
        let coll = collection();
        coll.validate_empty().unwrap();

        let gen = ItemGenerator::new(ItemIdGenerator::increasing(0), 0);
        let single = gen.generate_one();
        coll.insert_one(&single).unwrap();
        let batch = gen.generate_batch(10);
        assert!(coll.insert_many(&batch, false).unwrap());

        assert_eq!(coll.count_up_to(100).unwrap(), ItemCount::Exact(11));
        assert_eq!(coll.count_up_to(5).unwrap(), ItemCount::Exact(5));
        let found = coll.find_by_key(&batch[3].id).unwrap().unwrap();
        assert!(Item::verify_similarity(&batch[3], &found).is_ok());
        assert!(coll.find_by_key("id#999_0").unwrap().is_none());

        assert!(coll.validate_empty().is_err());
        assert_eq!(coll.delete_all().unwrap(), ItemCount::Exact(11));
        coll.validate_empty().unwrap();
    }

    #[test]
    fn test_insert_many_chunks_large_batches() {
        let options = BackendOptions {
            max_batch: 4,
            ..BackendOptions::new()
        };
        let coll = MemoryCollection::new("chunked", &options);
        let gen = ItemGenerator::new(ItemIdGenerator::increasing(0), 0);
        let batch = gen.generate_batch(10);

        assert!(coll.insert_chunk(&batch, false).is_err());
        assert!(coll.insert_many(&batch, false).unwrap());
        assert_eq!(coll.count_up_to(100).unwrap(), ItemCount::Exact(10));
    }

    #[test]
    fn test_ordered_insert_stops_at_duplicate() {
        let coll = collection();
        let a = Item::from_id(ItemId::new(1, 0), 0);
        let b = Item::from_id(ItemId::new(1, 1), 0);
        let c = Item::from_id(ItemId::new(1, 2), 0);
        coll.insert_one(&b).unwrap();

        let err = coll.insert_chunk(&[a, b, c.clone()], true).unwrap_err();
        assert!(err.is_invariant_violation());
        assert!(coll.find_by_key(&c.id).unwrap().is_none());
        assert_eq!(coll.count_up_to(100).unwrap(), ItemCount::Exact(2));
    }

    #[test]
    fn test_unordered_insert_continues_past_duplicate() {
        let coll = collection();
        let a = Item::from_id(ItemId::new(1, 0), 0);
        let b = Item::from_id(ItemId::new(1, 1), 0);
        let c = Item::from_id(ItemId::new(1, 2), 0);
        coll.insert_one(&b).unwrap();

        let err = coll.insert_chunk(&[a, b, c.clone()], false).unwrap_err();
        assert!(matches!(err, ContainerError::DuplicateKey(ref id) if id == "id#1_1"));
        assert!(coll.find_by_key(&c.id).unwrap().is_some());
        assert_eq!(coll.count_up_to(100).unwrap(), ItemCount::Exact(3));
    }

    fn small_chunks() -> MemoryCollection {
        let options = BackendOptions {
            max_batch: 2,
            ..BackendOptions::new()
        };
        MemoryCollection::new("small_chunks", &options)
    }

    #[test]
    fn test_unordered_batch_tries_every_chunk() {
        let coll = small_chunks();
        let batch: Vec<Item> = (0..4).map(|s| Item::from_id(ItemId::new(1, s), 0)).collect();
        coll.insert_one(&batch[0]).unwrap();

        let err = coll.insert_many(&batch, false).unwrap_err();
        assert!(matches!(err, ContainerError::DuplicateKey(ref id) if id == "id#1_0"));
        for item in &batch {
            assert!(coll.find_by_key(&item.id).unwrap().is_some(), "{}", item.id);
        }
    }

    #[test]
    fn test_ordered_batch_stops_at_failing_chunk() {
        let coll = small_chunks();
        let batch: Vec<Item> = (0..4).map(|s| Item::from_id(ItemId::new(1, s), 0)).collect();
        coll.insert_one(&batch[0]).unwrap();

        assert!(coll.insert_many(&batch, true).is_err());
        assert!(coll.find_by_key(&batch[2].id).unwrap().is_none());
        assert!(coll.find_by_key(&batch[3].id).unwrap().is_none());
        assert_eq!(coll.count_up_to(100).unwrap(), ItemCount::Exact(1));
    }

    #[test]
    fn test_validate_empty_reports_over_limit() {
        let coll = collection();
        let gen = ItemGenerator::new(ItemIdGenerator::increasing(0), 0);
        for _ in 0..3 {
            coll.insert_many(&gen.generate_batch(50), false).unwrap();
        }
        let err = coll.validate_empty().unwrap_err();
        assert!(err.to_string().contains("over 100"));
    }

    #[test]
    fn test_injected_failures() {
        let options = BackendOptions {
            fail_every: Some(2),
            ..BackendOptions::new()
        };
        let coll = MemoryCollection::new("flaky", &options);
        let gen = ItemGenerator::new(ItemIdGenerator::increasing(0), 0);
        assert!(coll.insert_many(&gen.generate_batch(3), false).is_ok());
        assert!(matches!(
            coll.insert_many(&gen.generate_batch(3), false),
            Err(ContainerError::Backend(_))
        ));
    }
}
