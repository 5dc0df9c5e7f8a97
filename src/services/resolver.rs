//! Constraint resolver.
//!
//! Fills dependent layers of a partial combination from manual mappings and
//! matching rules until nothing changes, and repairs head/body color
//! mismatches. The resolver only reads shared generation state; the pairings
//! it chooses are buffered on the [`Attempt`] and committed by the caller once
//! the combination is accepted.

use std::collections::BTreeSet;

use rand::Rng;

use crate::models::{
    Combination, Item, ItemId, Layer, LayerId, PairKey, PairUsage, QuotaState, TraitCatalog,
};
use crate::services::property::color_family_from_name;
use crate::services::rules::RuleStore;
use crate::services::selector::{cumulative_pick, Selector};

/// Default cap on fixpoint passes.
pub const DEFAULT_MAX_PASSES: usize = 3;

/// Floor applied to the quota factor of a candidate score.
const MIN_QUOTA_FACTOR: f64 = 0.001;

/// A combination under construction plus what resolving it decided.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attempt {
    /// Current selections
    pub combination: Combination,
    /// Rule-driven pairings chosen so far, keyed by the layer they filled
    pub pair_picks: Vec<(LayerId, PairKey)>,
    /// Layers filled by a manual mapping
    pub manual_layers: BTreeSet<LayerId>,
}

impl Attempt {
    /// Starts an empty attempt.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairings to commit if the attempt is accepted.
    pub fn pair_keys(&self) -> impl Iterator<Item = &PairKey> + '_ {
        self.pair_picks.iter().map(|(_, key)| key)
    }

    /// Replaces a layer's selection and forgets pairings that filled it.
    fn replace(&mut self, layer_id: LayerId, item_id: ItemId) {
        self.combination.insert(layer_id, item_id);
        self.pair_picks.retain(|(layer, _)| *layer != layer_id);
    }
}

/// Read-only view of everything the resolver consults.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintResolver<'a> {
    catalog: &'a TraitCatalog,
    rules: &'a RuleStore,
    selector: Selector<'a>,
    quotas: &'a QuotaState,
    pair_usage: &'a PairUsage,
    max_passes: usize,
}

impl<'a> ConstraintResolver<'a> {
    /// Creates a resolver over the current generation state.
    #[must_use]
    pub const fn new(
        catalog: &'a TraitCatalog,
        rules: &'a RuleStore,
        selector: Selector<'a>,
        quotas: &'a QuotaState,
        pair_usage: &'a PairUsage,
    ) -> Self {
        Self {
            catalog,
            rules,
            selector,
            quotas,
            pair_usage,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }

    /// Overrides the fixpoint pass cap (at least one pass always runs).
    #[must_use]
    pub const fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = if max_passes == 0 { 1 } else { max_passes };
        self
    }

    /// Whether a selection fits the quotas.
    ///
    /// Layers outside exact-count mode, and every layer when quotas are not
    /// enforced, always fit.
    #[must_use]
    pub fn quota_allows(&self, layer: &Layer, item_id: ItemId, respect_quotas: bool) -> bool {
        !respect_quotas || !layer.exact_count_mode || self.quotas.has_remaining(layer.id, item_id)
    }

    fn would_violate(&self, attempt: &Attempt, layer_id: LayerId, item_id: ItemId) -> bool {
        let mut tentative = attempt.combination.clone();
        tentative.insert(layer_id, item_id);
        self.rules.violates_exclusions(self.catalog, &tentative)
    }

    /// Applies manual mappings then matching rules until a pass changes
    /// nothing or the pass cap is reached.
    ///
    /// Returns the number of layers filled.
    pub fn apply_all_matching<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        attempt: &mut Attempt,
        respect_quotas: bool,
    ) -> usize {
        let mut filled = 0;
        for _ in 0..self.max_passes {
            let changed = self.apply_manual_mappings(attempt, respect_quotas)
                + self.apply_matching_rules(rng, attempt, respect_quotas);
            if changed == 0 {
                break;
            }
            filled += changed;
        }
        filled
    }

    fn apply_manual_mappings(&self, attempt: &mut Attempt, respect_quotas: bool) -> usize {
        let mut filled = 0;
        for mapping in self.rules.manual_mappings() {
            if !attempt
                .combination
                .has(mapping.source_layer_id, mapping.source_item_id)
                || attempt.combination.contains_layer(mapping.target_layer_id)
            {
                continue;
            }
            let Some(target) = self.catalog.layer(mapping.target_layer_id) else {
                continue;
            };
            if target.item(mapping.target_item_id).is_none()
                || !self.quota_allows(target, mapping.target_item_id, respect_quotas)
                || self.would_violate(attempt, target.id, mapping.target_item_id)
            {
                continue;
            }

            attempt.combination.insert(target.id, mapping.target_item_id);
            attempt.manual_layers.insert(target.id);
            attempt.pair_picks.push((
                target.id,
                PairKey::Manual {
                    mapping_id: mapping.id,
                    target_item: mapping.target_item_id,
                },
            ));
            filled += 1;
        }
        filled
    }

    fn apply_matching_rules<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        attempt: &mut Attempt,
        respect_quotas: bool,
    ) -> usize {
        let mut filled = 0;
        for effective in self.rules.effective_matching_rules() {
            let rule = &effective.rule;
            let Some(source_item_id) = attempt.combination.get(rule.source_layer_id) else {
                continue;
            };
            if attempt.combination.contains_layer(rule.target_layer_id) {
                continue;
            }
            let (Some(source_item), Some(target)) = (
                self.catalog.item(rule.source_layer_id, source_item_id),
                self.catalog.layer(rule.target_layer_id),
            ) else {
                continue;
            };

            let candidates: Vec<&Item> = self
                .rules
                .rule_candidates(self.catalog, rule, source_item)
                .into_iter()
                .filter(|item| self.quota_allows(target, item.id, respect_quotas))
                .filter(|item| !self.would_violate(attempt, target.id, item.id))
                .collect();

            let rule_key = effective.usage_key();
            let pair_key = |target_item: ItemId| PairKey::Rule {
                rule_key: rule_key.clone(),
                source_item: source_item_id,
                target_item,
            };

            let Some(chosen) =
                self.choose_candidate_balanced(rng, &candidates, target, &pair_key, respect_quotas)
            else {
                continue;
            };

            attempt.combination.insert(target.id, chosen.id);
            attempt.pair_picks.push((target.id, pair_key(chosen.id)));
            filled += 1;
        }
        filled
    }

    /// Picks a rule candidate, spreading assignments across valid targets.
    ///
    /// Score is `max(0.001, quota) * usage_boost / (1 + pair_count)`, where the
    /// quota factor is 1 for layers without enforced quotas.
    pub fn choose_candidate_balanced<'c, R, F>(
        &self,
        rng: &mut R,
        candidates: &[&'c Item],
        target: &Layer,
        pair_key: F,
        respect_quotas: bool,
    ) -> Option<&'c Item>
    where
        R: Rng + ?Sized,
        F: Fn(ItemId) -> PairKey,
    {
        let scores: Vec<f64> = candidates
            .iter()
            .map(|item| {
                let quota_factor = if respect_quotas && target.exact_count_mode {
                    f64::from(self.quotas.remaining(target.id, item.id)).max(MIN_QUOTA_FACTOR)
                } else {
                    1.0
                };
                let pair_count = f64::from(self.pair_usage.count(&pair_key(item.id)));
                quota_factor * self.selector.usage_boost(target, item.id) / (1.0 + pair_count)
            })
            .collect();

        cumulative_pick(rng, &scores).map(|index| candidates[index])
    }

    /// Repairs head/body color mismatches by replacing the body selection.
    ///
    /// Returns false when a mismatch cannot be repaired: the body was placed
    /// by a manual mapping, or no color-matching body fits quotas and
    /// exclusions.
    pub fn ensure_coherence<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        attempt: &mut Attempt,
        respect_quotas: bool,
    ) -> bool {
        for _ in 0..=self.rules.coherence_pairs().len() {
            let Some((head_id, body_id)) = self.rules.incoherent_pair(self.catalog, &attempt.combination)
            else {
                return true;
            };
            if attempt.manual_layers.contains(&body_id) {
                return false;
            }
            let Some(replacement) = self.fix_body_to_match_head(rng, attempt, head_id, body_id, respect_quotas)
            else {
                return false;
            };
            attempt.replace(body_id, replacement);
        }
        self.rules.is_coherent(self.catalog, &attempt.combination)
    }

    fn fix_body_to_match_head<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        attempt: &Attempt,
        head_id: LayerId,
        body_id: LayerId,
        respect_quotas: bool,
    ) -> Option<ItemId> {
        let head_family = attempt
            .combination
            .get(head_id)
            .and_then(|item_id| self.catalog.item(head_id, item_id))
            .and_then(|item| color_family_from_name(&item.name))?;
        let body = self.catalog.layer(body_id)?;

        let candidates: Vec<&Item> = body
            .items
            .iter()
            .filter(|item| color_family_from_name(&item.name) == Some(head_family))
            .filter(|item| self.quota_allows(body, item.id, respect_quotas))
            .filter(|item| !self.would_violate(attempt, body_id, item.id))
            .collect();

        self.selector
            .select_from(rng, body, &candidates, true)
            .map(|item| item.id)
    }
}
