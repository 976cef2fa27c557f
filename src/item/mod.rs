//! Deterministic synthetic items
//!
//! Items are pure functions of their [`ItemId`]: the numeric value, the text
//! description and the optional vector are all derived from a xoshiro256++
//! stream seeded by the id. Anything written during a benchmark can therefore
//! be regenerated later and compared field by field without keeping a copy.
//!
//! # Example
//!
//! ```
//! use insertpulse::item::{Item, ItemGenerator};
//! use insertpulse::item::id::ItemIdGenerator;
//!
//! let gen = ItemGenerator::new(ItemIdGenerator::increasing(0), 8);
//! let batch = gen.generate_batch(4);
//! assert_eq!(batch.len(), 4);
//!
//! // Any item can be rebuilt from its id
//! let again = Item::from_id(batch[2].item_id().unwrap(), 8);
//! assert_eq!(again, batch[2]);
//! ```

pub mod id;

use crate::Result;
use id::{ItemId, ItemIdGenerator};
use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

/// Length of the generated `description` text
pub const DESCRIPTION_LENGTH: usize = 100;

/// A record to insert into a container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub value: i64,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    /// Source id; not part of the stored record
    #[serde(skip)]
    source: Option<ItemId>,
}

impl Item {
    /// Build the item for `id`; `vector_length == 0` disables the vector
    pub fn from_id(id: ItemId, vector_length: usize) -> Self {
        let vector = if vector_length == 0 {
            None
        } else {
            Some(generate_vector(id, vector_length))
        };
        Self {
            id: id.to_string(),
            value: generate_value(id),
            description: generate_description(id, DESCRIPTION_LENGTH),
            vector,
            source: Some(id),
        }
    }

    /// Assemble an item read back from a container
    pub fn from_parts(
        id: impl Into<String>,
        value: i64,
        description: impl Into<String>,
        vector: Option<Vec<f32>>,
    ) -> Self {
        Self {
            id: id.into(),
            value,
            description: description.into(),
            vector,
            source: None,
        }
    }

    /// The id this item was generated from; `None` for fetched items
    pub fn item_id(&self) -> Option<ItemId> {
        self.source
    }

    /// Compare a fetched item against the expected one
    ///
    /// Checks `id`, `value` and `description`. The vector is left out since
    /// stores commonly omit it from read results.
    pub fn verify_similarity(expected: &Item, actual: &Item) -> Result<()> {
        if expected.id != actual.id {
            anyhow::bail!(
                "Unexpected 'id': expected '{}', got '{}'",
                expected.id,
                actual.id
            );
        }
        if expected.value != actual.value {
            anyhow::bail!(
                "Unexpected 'value' for '{}': expected {}, got {}",
                expected.id,
                expected.value,
                actual.value
            );
        }
        if expected.description != actual.description {
            anyhow::bail!(
                "Unexpected 'description' for '{}': expected '{}', got '{}'",
                expected.id,
                expected.description,
                actual.description
            );
        }
        Ok(())
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.value == other.value
            && self.description == other.description
            && self.vector == other.vector
    }
}

fn generate_value(id: ItemId) -> i64 {
    id.cycle().wrapping_mul(16).wrapping_add(i64::from(id.step()))
}

/// Lowercase words of 7 letters separated by single spaces
fn generate_description(id: ItemId, length: usize) -> String {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(id.seed());
    (0..length)
        .map(|i| {
            if i & 7 == 7 {
                ' '
            } else {
                (b'a' + rng.gen_range(0..25u8)) as char
            }
        })
        .collect()
}

/// Components uniformly spread over `[-1.0, 1.0)`
fn generate_vector(id: ItemId, length: usize) -> Vec<f32> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(id.seed());
    (0..length).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect()
}

/// Produces items from a shared [`ItemIdGenerator`]
///
/// Both generation calls advance the id sequence by exactly one cycle, so a
/// generator can be shared by every agent of a phase.
#[derive(Debug)]
pub struct ItemGenerator {
    ids: ItemIdGenerator,
    vector_length: usize,
}

impl ItemGenerator {
    pub fn new(ids: ItemIdGenerator, vector_length: usize) -> Self {
        Self { ids, vector_length }
    }

    pub fn vector_length(&self) -> usize {
        self.vector_length
    }

    pub fn ids(&self) -> &ItemIdGenerator {
        &self.ids
    }

    pub fn generate_one(&self) -> Item {
        Item::from_id(self.ids.next_id(), self.vector_length)
    }

    pub fn generate_batch(&self, count: usize) -> Vec<Item> {
        self.ids
            .next_ids(count)
            .into_iter()
            .map(|id| Item::from_id(id, self.vector_length))
            .collect()
    }
}
