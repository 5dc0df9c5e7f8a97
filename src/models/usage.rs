//! Mutable generation state: quotas, pair usage, trait usage, hash history.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{Combination, ItemId, LayerId, RuleId, TraitCatalog};

/// Remaining allowed occurrences per `(layer, item)` in exact-count layers.
///
/// Counts never go negative; decrementing an exhausted entry is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuotaState {
    remaining: BTreeMap<LayerId, BTreeMap<ItemId, u32>>,
}

impl QuotaState {
    /// Creates an empty quota state.
    ///
    /// Nothing is tracked, so while quotas are enforced no item of an
    /// exact-count layer is admitted until [`QuotaState::set`] gives it a count.
    /// Layers outside exact-count mode are never restricted.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            remaining: BTreeMap::new(),
        }
    }

    /// Sets the remaining count of one item.
    pub fn set(&mut self, layer_id: LayerId, item_id: ItemId, remaining: u32) {
        self.remaining
            .entry(layer_id)
            .or_default()
            .insert(item_id, remaining);
    }

    /// Whether quotas are tracked for the layer.
    #[must_use]
    pub fn tracks_layer(&self, layer_id: LayerId) -> bool {
        self.remaining.contains_key(&layer_id)
    }

    /// Remaining count of an item, zero if untracked.
    #[must_use]
    pub fn remaining(&self, layer_id: LayerId, item_id: ItemId) -> u32 {
        self.remaining
            .get(&layer_id)
            .and_then(|items| items.get(&item_id))
            .copied()
            .unwrap_or(0)
    }

    /// Whether the item can still be used.
    #[must_use]
    pub fn has_remaining(&self, layer_id: LayerId, item_id: ItemId) -> bool {
        self.remaining(layer_id, item_id) > 0
    }

    /// Consumes one unit of an item's quota.
    pub fn decrement(&mut self, layer_id: LayerId, item_id: ItemId) {
        if let Some(count) = self
            .remaining
            .get_mut(&layer_id)
            .and_then(|items| items.get_mut(&item_id))
        {
            *count = count.saturating_sub(1);
        }
    }

    /// Total remaining units of a layer.
    #[must_use]
    pub fn layer_total(&self, layer_id: LayerId) -> u64 {
        self.remaining
            .get(&layer_id)
            .map(|items| items.values().map(|count| u64::from(*count)).sum())
            .unwrap_or(0)
    }

    /// Checks that every exact-count selection of the combination has quota left.
    #[must_use]
    pub fn admits(&self, catalog: &TraitCatalog, combination: &Combination) -> bool {
        combination.iter().all(|(layer_id, item_id)| {
            let exact = catalog
                .layer(layer_id)
                .is_some_and(|layer| layer.exact_count_mode);
            !exact || self.has_remaining(layer_id, item_id)
        })
    }

    /// Consumes one unit for each exact-count selection of the combination.
    pub fn consume(&mut self, catalog: &TraitCatalog, combination: &Combination) {
        for (layer_id, item_id) in combination.iter() {
            if catalog
                .layer(layer_id)
                .is_some_and(|layer| layer.exact_count_mode)
            {
                self.decrement(layer_id, item_id);
            }
        }
    }

    /// Whether no layer is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Identifies a rule-driven pairing whose occurrences are counted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PairKey {
    /// A matching rule paired `source_item` with `target_item`
    Rule {
        /// Stable key of the (possibly built-in) rule
        rule_key: String,
        /// Item that triggered the rule
        source_item: ItemId,
        /// Item that was chosen
        target_item: ItemId,
    },
    /// A manual mapping assigned `target_item`
    Manual {
        /// Mapping identifier
        mapping_id: RuleId,
        /// Item that was assigned
        target_item: ItemId,
    },
}

impl PairKey {
    /// Serialized form used as the map key in session snapshots.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Rule {
                rule_key,
                source_item,
                target_item,
            } => format!("{rule_key}:{source_item}:{target_item}"),
            Self::Manual {
                mapping_id,
                target_item,
            } => format!("manual-{mapping_id}:{target_item}"),
        }
    }
}

/// Occurrence counters of rule-driven pairings.
///
/// Only biases balanced selection, never a correctness constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairUsage {
    counts: BTreeMap<String, u32>,
}

impl PairUsage {
    /// Creates empty pair usage.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    /// How often the pairing was chosen.
    #[must_use]
    pub fn count(&self, key: &PairKey) -> u32 {
        self.counts.get(&key.encode()).copied().unwrap_or(0)
    }

    /// Records one more occurrence.
    pub fn increment(&mut self, key: &PairKey) {
        *self.counts.entry(key.encode()).or_insert(0) += 1;
    }

    /// Number of distinct pairings seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Per-layer, per-item usage counts across all produced combinations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraitUsageStats {
    usage: BTreeMap<LayerId, BTreeMap<ItemId, u64>>,
}

impl TraitUsageStats {
    /// Creates empty usage stats.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            usage: BTreeMap::new(),
        }
    }

    /// Usage count of an item.
    #[must_use]
    pub fn count(&self, layer_id: LayerId, item_id: ItemId) -> u64 {
        self.usage
            .get(&layer_id)
            .and_then(|items| items.get(&item_id))
            .copied()
            .unwrap_or(0)
    }

    /// Records every selection of a combination.
    pub fn record(&mut self, combination: &Combination) {
        for (layer_id, item_id) in combination.iter() {
            *self
                .usage
                .entry(layer_id)
                .or_default()
                .entry(item_id)
                .or_insert(0) += 1;
        }
    }

    /// Clears all counts.
    pub fn reset(&mut self) {
        self.usage.clear();
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.usage.is_empty()
    }
}

/// Canonical hashes of every combination produced for a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneratedHashes {
    hashes: BTreeSet<String>,
}

impl GeneratedHashes {
    /// Creates an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hashes: BTreeSet::new(),
        }
    }

    /// Whether the hash was produced before.
    #[must_use]
    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    /// Adds a hash, returning false if it was already present.
    pub fn insert(&mut self, hash: impl Into<String>) -> bool {
        self.hashes.insert(hash.into())
    }

    /// Adds many hashes.
    pub fn extend<I: IntoIterator<Item = String>>(&mut self, hashes: I) {
        self.hashes.extend(hashes);
    }

    /// Number of recorded hashes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Iterates the hashes in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &String> + '_ {
        self.hashes.iter()
    }

    /// Forgets every hash.
    pub fn clear(&mut self) {
        self.hashes.clear();
    }

    /// Number of hashes that describe a combination the catalog can still
    /// produce.
    ///
    /// A hash counts only if it assigns exactly one existing item to every
    /// non-empty layer. Hashes left over from removed layers or items, or
    /// from another catalog, do not use up capacity.
    #[must_use]
    pub fn count_within(&self, catalog: &TraitCatalog) -> u64 {
        let layers = catalog.non_empty_layers();
        if layers.is_empty() {
            return 0;
        }
        self.hashes
            .iter()
            .filter_map(|hash| Combination::from_hash(hash))
            .filter(|combination| {
                combination.len() == layers.len()
                    && layers.iter().all(|layer| {
                        combination
                            .get(layer.id)
                            .is_some_and(|item_id| layer.item(item_id).is_some())
                    })
            })
            .count() as u64
    }
}
