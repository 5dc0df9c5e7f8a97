//! Weighted, usage-balanced, and quota-aware item selection for one layer.

use rand::Rng;

use crate::models::{Item, ItemId, Layer, QuotaState, RarityMode, TraitUsageStats};

/// Multiplier applied to items that have never been used.
pub const UNUSED_MULTIPLIER: f64 = 10.0;

/// Picks an index proportionally to `weights` with a cumulative-threshold draw.
///
/// Non-positive and non-finite weights are never picked. Returns `None` when
/// no weight is positive. The last positive entry absorbs floating-point drift.
pub fn cumulative_pick<R: Rng + ?Sized>(rng: &mut R, weights: &[f64]) -> Option<usize> {
    let usable = |weight: f64| weight.is_finite() && weight > 0.0;
    let total: f64 = weights.iter().copied().filter(|w| usable(*w)).sum();
    if total <= 0.0 {
        return None;
    }

    let mut threshold = rng.gen::<f64>() * total;
    let mut last = None;
    for (index, weight) in weights.iter().copied().enumerate() {
        if !usable(weight) {
            continue;
        }
        last = Some(index);
        threshold -= weight;
        if threshold <= 0.0 {
            return Some(index);
        }
    }
    last
}

/// Picks one element uniformly.
pub fn pick_uniform<'a, T, R: Rng + ?Sized>(rng: &mut R, items: &[&'a T]) -> Option<&'a T> {
    if items.is_empty() {
        return None;
    }
    Some(items[rng.gen_range(0..items.len())])
}

/// Selection strategy for one layer under the current usage statistics.
#[derive(Debug, Clone, Copy)]
pub struct Selector<'a> {
    usage: &'a TraitUsageStats,
    rarity_mode: RarityMode,
}

impl<'a> Selector<'a> {
    /// Creates a selector reading the given usage statistics.
    #[must_use]
    pub const fn new(usage: &'a TraitUsageStats, rarity_mode: RarityMode) -> Self {
        Self { usage, rarity_mode }
    }

    /// Global rarity mode.
    #[must_use]
    pub const fn rarity_mode(&self) -> RarityMode {
        self.rarity_mode
    }

    /// Mean usage over every item of the layer.
    #[must_use]
    pub fn layer_average_usage(&self, layer: &Layer) -> f64 {
        if layer.items.is_empty() {
            return 0.0;
        }
        let total: u64 = layer
            .items
            .iter()
            .map(|item| self.usage.count(layer.id, item.id))
            .sum();
        total as f64 / layer.items.len() as f64
    }

    /// Bias toward under-used items.
    ///
    /// Unused items get [`UNUSED_MULTIPLIER`], items below the layer average
    /// get `1 + (avg - usage) / avg * 2`, everything else gets 1.
    #[must_use]
    pub fn usage_boost(&self, layer: &Layer, item_id: ItemId) -> f64 {
        let used = self.usage.count(layer.id, item_id);
        if used == 0 {
            return UNUSED_MULTIPLIER;
        }
        let average = self.layer_average_usage(layer);
        let used = used as f64;
        if average > 0.0 && used < average {
            1.0 + (average - used) / average * 2.0
        } else {
            1.0
        }
    }

    /// Rarity weight of an item under the current rarity mode.
    #[must_use]
    pub fn base_weight(&self, item: &Item) -> f64 {
        match self.rarity_mode {
            RarityMode::Weighted => item.rarity.unwrap_or(0.0).max(0.0),
            RarityMode::Equal => 1.0,
        }
    }

    /// Selects one item of the layer.
    ///
    /// See [`Selector::select_from`].
    pub fn select_weighted_random<'l, R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        layer: &'l Layer,
        force_balance: bool,
    ) -> Option<&'l Item> {
        let candidates: Vec<&Item> = layer.items.iter().collect();
        self.select_from(rng, layer, &candidates, force_balance)
    }

    /// Selects one of `candidates`, which belong to `layer`.
    ///
    /// Without balancing, equal rarity mode or a layer without any rarity value
    /// picks uniformly; otherwise the draw is proportional to rarity. With
    /// balancing, rarity is multiplied by [`Selector::usage_boost`]. A zero
    /// total weight falls back to a uniform pick.
    pub fn select_from<'l, R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        layer: &Layer,
        candidates: &[&'l Item],
        force_balance: bool,
    ) -> Option<&'l Item> {
        if candidates.is_empty() {
            return None;
        }

        if !force_balance
            && (self.rarity_mode == RarityMode::Equal
                || candidates.iter().all(|item| item.rarity.is_none()))
        {
            return pick_uniform(rng, candidates);
        }

        let weights: Vec<f64> = candidates
            .iter()
            .map(|item| {
                let base = self.base_weight(item);
                if force_balance {
                    base * self.usage_boost(layer, item.id)
                } else {
                    base
                }
            })
            .collect();

        match cumulative_pick(rng, &weights) {
            Some(index) => Some(candidates[index]),
            None => pick_uniform(rng, candidates),
        }
    }

    /// Selects an item with remaining quota, weighted by the remaining count.
    ///
    /// Returns `None` when every item of the layer is exhausted.
    pub fn select_with_quota<'l, R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        layer: &'l Layer,
        quotas: &QuotaState,
    ) -> Option<&'l Item> {
        let candidates: Vec<&Item> = layer
            .items
            .iter()
            .filter(|item| quotas.has_remaining(layer.id, item.id))
            .collect();
        let weights: Vec<f64> = candidates
            .iter()
            .map(|item| f64::from(quotas.remaining(layer.id, item.id)))
            .collect();
        cumulative_pick(rng, &weights).map(|index| candidates[index])
    }
}
