//! Combination of one item per layer and its canonical hash.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ItemId, LayerId};

/// Separator between `layerId:itemId` entries in a combination hash.
pub const HASH_DELIMITER: char = '|';

/// One choice of item per layer, representing one generated artifact.
///
/// Holds at most one entry per layer. Entries are kept ordered by layer id,
/// which makes [`Combination::hash`] independent of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Combination {
    selections: BTreeMap<LayerId, ItemId>,
}

impl Combination {
    /// Creates an empty combination.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            selections: BTreeMap::new(),
        }
    }

    /// Assigns an item to a layer, returning the previous assignment.
    pub fn insert(&mut self, layer_id: LayerId, item_id: ItemId) -> Option<ItemId> {
        self.selections.insert(layer_id, item_id)
    }

    /// Removes the assignment of a layer.
    pub fn remove(&mut self, layer_id: LayerId) -> Option<ItemId> {
        self.selections.remove(&layer_id)
    }

    /// Item assigned to a layer, if any.
    #[must_use]
    pub fn get(&self, layer_id: LayerId) -> Option<ItemId> {
        self.selections.get(&layer_id).copied()
    }

    /// Whether the layer already has an assignment.
    #[must_use]
    pub fn contains_layer(&self, layer_id: LayerId) -> bool {
        self.selections.contains_key(&layer_id)
    }

    /// Whether the given item is assigned to the given layer.
    #[must_use]
    pub fn has(&self, layer_id: LayerId, item_id: ItemId) -> bool {
        self.get(layer_id) == Some(item_id)
    }

    /// Number of assigned layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.selections.len()
    }

    /// Whether no layer is assigned. An empty result signals generation failure.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    /// Iterates `(layer_id, item_id)` pairs in ascending layer id order.
    pub fn iter(&self) -> impl Iterator<Item = (LayerId, ItemId)> + '_ {
        self.selections.iter().map(|(layer, item)| (*layer, *item))
    }

    /// Canonical signature, e.g. `"1:10|2:21"`.
    #[must_use]
    pub fn hash(&self) -> String {
        create_combination_hash(self)
    }

    /// Parses a signature produced by [`Combination::hash`].
    ///
    /// Returns `None` for malformed input or a layer listed twice.
    #[must_use]
    pub fn from_hash(hash: &str) -> Option<Self> {
        let mut combination = Self::new();
        for entry in hash.split(HASH_DELIMITER) {
            let (layer, item) = entry.split_once(':')?;
            let layer_id = layer.trim().parse().ok()?;
            let item_id = item.trim().parse().ok()?;
            if combination.insert(layer_id, item_id).is_some() {
                return None;
            }
        }
        Some(combination)
    }
}

impl FromIterator<(LayerId, ItemId)> for Combination {
    fn from_iter<T: IntoIterator<Item = (LayerId, ItemId)>>(iter: T) -> Self {
        Self {
            selections: iter.into_iter().collect(),
        }
    }
}

/// Builds the uniqueness key of a combination.
///
/// Entries are sorted by numeric layer id and joined as `layerId:itemId|...`.
#[must_use]
pub fn create_combination_hash(combination: &Combination) -> String {
    let mut hash = String::new();
    for (index, (layer_id, item_id)) in combination.iter().enumerate() {
        if index > 0 {
            hash.push(HASH_DELIMITER);
        }
        hash.push_str(&format!("{layer_id}:{item_id}"));
    }
    hash
}
