//! Rule store: effective matching rules, exclusion checks, head/body coherence.
//!
//! User rules are composed with a fixed list of built-in heuristics. The only
//! built-in today links any head-like layer to any body-like layer on color,
//! and the same layer pairs are subject to the coherence check.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{
    Combination, ExclusionKind, ExclusionRule, Item, LayerId, ManualMapping, MatchProperty,
    MatchingRule, RuleSet, TraitCatalog,
};
use crate::services::property::{color_family_from_name, names_share_property};

static HEAD_LAYER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)head|face|skull").unwrap());
static BODY_LAYER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)body|torso").unwrap());

/// Whether a layer name looks like a head layer.
#[must_use]
pub fn is_head_layer(name: &str) -> bool {
    HEAD_LAYER.is_match(name)
}

/// Whether a layer name looks like a body layer.
#[must_use]
pub fn is_body_layer(name: &str) -> bool {
    BODY_LAYER.is_match(name)
}

/// Where an effective rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOrigin {
    /// Created by the user and persisted in the project
    User,
    /// Synthesized at generation time, never persisted
    Builtin,
}

impl std::fmt::Display for RuleOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Builtin => write!(f, "built-in"),
        }
    }
}

/// A matching rule as applied during generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveRule {
    /// Underlying rule; built-ins carry id 0
    pub rule: MatchingRule,
    /// Origin of the rule
    pub origin: RuleOrigin,
}

impl EffectiveRule {
    /// Stable key used in pair-usage counters.
    #[must_use]
    pub fn usage_key(&self) -> String {
        match self.origin {
            RuleOrigin::User => format!("rule-{}", self.rule.id),
            RuleOrigin::Builtin => format!(
                "implicit-{}-{}",
                self.rule.source_layer_id, self.rule.target_layer_id
            ),
        }
    }
}

/// Head/body layer pairs of the catalog, head first.
#[must_use]
pub fn head_body_pairs(catalog: &TraitCatalog) -> Vec<(LayerId, LayerId)> {
    let mut pairs = Vec::new();
    for head in catalog.layers().iter().filter(|l| is_head_layer(&l.name)) {
        for body in catalog.layers().iter().filter(|l| is_body_layer(&l.name)) {
            if head.id != body.id {
                pairs.push((head.id, body.id));
            }
        }
    }
    pairs
}

/// Built-in color rules not already covered by an explicit rule.
#[must_use]
pub fn builtin_matching_rules(catalog: &TraitCatalog, rules: &RuleSet) -> Vec<MatchingRule> {
    head_body_pairs(catalog)
        .into_iter()
        .filter(|(head, body)| {
            !rules.matching_rules.iter().any(|rule| {
                rule.source_layer_id == *head
                    && rule.target_layer_id == *body
                    && rule.property == MatchProperty::Color
            })
        })
        .map(|(head, body)| MatchingRule {
            id: 0,
            source_layer_id: head,
            target_layer_id: body,
            property: MatchProperty::Color,
        })
        .collect()
}

/// Rules in effect for one generation run.
///
/// A default store holds nothing and enforces nothing, which is how
/// generation without rules is expressed.
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    matching: Vec<EffectiveRule>,
    exclusions: Vec<ExclusionRule>,
    mappings: Vec<ManualMapping>,
    coherence_pairs: Vec<(LayerId, LayerId)>,
}

impl RuleStore {
    /// Composes user rules with the built-in heuristics.
    ///
    /// User rules come first so they win any first-applicable tie-break.
    #[must_use]
    pub fn new(catalog: &TraitCatalog, rules: &RuleSet) -> Self {
        let mut store = Self::without_builtins(rules);
        store
            .matching
            .extend(builtin_matching_rules(catalog, rules).into_iter().map(|rule| {
                EffectiveRule {
                    rule,
                    origin: RuleOrigin::Builtin,
                }
            }));
        store.coherence_pairs = head_body_pairs(catalog);
        store
    }

    /// User rules only, with no implicit rule and no coherence check.
    #[must_use]
    pub fn without_builtins(rules: &RuleSet) -> Self {
        Self {
            matching: rules
                .matching_rules
                .iter()
                .cloned()
                .map(|rule| EffectiveRule {
                    rule,
                    origin: RuleOrigin::User,
                })
                .collect(),
            exclusions: rules.exclusion_rules.clone(),
            mappings: rules.manual_mappings.clone(),
            coherence_pairs: Vec::new(),
        }
    }

    /// A store that enforces nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Matching rules in application order.
    #[must_use]
    pub fn effective_matching_rules(&self) -> &[EffectiveRule] {
        &self.matching
    }

    /// Stored exclusion rules.
    #[must_use]
    pub fn exclusion_rules(&self) -> &[ExclusionRule] {
        &self.exclusions
    }

    /// Stored manual mappings.
    #[must_use]
    pub fn manual_mappings(&self) -> &[ManualMapping] {
        &self.mappings
    }

    /// Head/body pairs subject to the coherence check.
    #[must_use]
    pub fn coherence_pairs(&self) -> &[(LayerId, LayerId)] {
        &self.coherence_pairs
    }

    /// Whether no rule of any kind is in effect.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matching.is_empty()
            && self.exclusions.is_empty()
            && self.mappings.is_empty()
            && self.coherence_pairs.is_empty()
    }

    /// Layers that drive a matching rule or a manual mapping.
    #[must_use]
    pub fn source_layer_ids(&self) -> BTreeSet<LayerId> {
        self.matching
            .iter()
            .map(|effective| effective.rule.source_layer_id)
            .chain(self.mappings.iter().map(|mapping| mapping.source_layer_id))
            .collect()
    }

    /// Items of the rule's target layer compatible with `source_item`.
    #[must_use]
    pub fn rule_candidates<'c>(
        &self,
        catalog: &'c TraitCatalog,
        rule: &MatchingRule,
        source_item: &Item,
    ) -> Vec<&'c Item> {
        let Some(target) = catalog.layer(rule.target_layer_id) else {
            return Vec::new();
        };
        target
            .items
            .iter()
            .filter(|item| names_share_property(&source_item.name, &item.name, &rule.property))
            .collect()
    }

    /// Whether any exclusion rule holds between the combination's selections.
    #[must_use]
    pub fn violates_exclusions(&self, catalog: &TraitCatalog, combination: &Combination) -> bool {
        self.exclusions
            .iter()
            .any(|rule| exclusion_holds(catalog, rule, combination))
    }

    /// First head/body pair whose color families disagree.
    ///
    /// A missing color family on either side is not a violation.
    #[must_use]
    pub fn incoherent_pair(
        &self,
        catalog: &TraitCatalog,
        combination: &Combination,
    ) -> Option<(LayerId, LayerId)> {
        self.coherence_pairs.iter().copied().find(|(head, body)| {
            let family = |layer_id: LayerId| {
                combination
                    .get(layer_id)
                    .and_then(|item_id| catalog.item(layer_id, item_id))
                    .and_then(|item| color_family_from_name(&item.name))
            };
            match (family(*head), family(*body)) {
                (Some(head_family), Some(body_family)) => head_family != body_family,
                _ => false,
            }
        })
    }

    /// Whether every head/body pair agrees on color.
    #[must_use]
    pub fn is_coherent(&self, catalog: &TraitCatalog, combination: &Combination) -> bool {
        self.incoherent_pair(catalog, combination).is_none()
    }
}

fn exclusion_holds(catalog: &TraitCatalog, rule: &ExclusionRule, combination: &Combination) -> bool {
    let (Some(source_item), Some(target_item)) = (
        combination.get(rule.source_layer_id),
        combination.get(rule.target_layer_id),
    ) else {
        return false;
    };

    match &rule.kind {
        ExclusionKind::SpecificPair {
            source_item_id,
            target_item_id,
        } => source_item == *source_item_id && target_item == *target_item_id,
        ExclusionKind::Property(property) => {
            match (
                catalog.item(rule.source_layer_id, source_item),
                catalog.item(rule.target_layer_id, target_item),
            ) {
                (Some(source), Some(target)) => {
                    names_share_property(&source.name, &target.name, property)
                }
                _ => false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Layer;

    fn catalog() -> TraitCatalog {
        TraitCatalog::from_layers(vec![
            Layer::new(
                1,
                "Head",
                vec![Item::new(10, "Red Head"), Item::new(11, "Blue Head"), Item::new(12, "Skull")],
            )
            .unwrap(),
            Layer::new(
                2,
                "Body",
                vec![Item::new(20, "Crimson Body"), Item::new(21, "Navy Body"), Item::new(22, "Bones")],
            )
            .unwrap(),
            Layer::new(3, "Hats", vec![Item::new(30, "Red Hat"), Item::new(31, "Pirate Hat")]).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_layer_name_patterns() {
        assert!(is_head_layer("Head"));
        assert!(is_head_layer("FACE paint"));
        assert!(is_head_layer("skulls"));
        assert!(!is_head_layer("Hats"));
        assert!(is_body_layer("Torso"));
        assert!(is_body_layer("base_body"));
        assert!(!is_body_layer("Background"));
    }

    #[test]
    fn test_builtin_rule_added_after_user_rules() {
        let catalog = catalog();
        let mut rules = RuleSet::new();
        rules.matching_rules.push(MatchingRule {
            id: 7,
            source_layer_id: 3,
            target_layer_id: 2,
            property: MatchProperty::Color,
        });

        let store = RuleStore::new(&catalog, &rules);
        let effective = store.effective_matching_rules();
        assert_eq!(effective.len(), 2);
        assert_eq!(effective[0].origin, RuleOrigin::User);
        assert_eq!(effective[0].usage_key(), "rule-7");
        assert_eq!(effective[1].origin, RuleOrigin::Builtin);
        assert_eq!(effective[1].usage_key(), "implicit-1-2");
        assert_eq!(store.source_layer_ids(), BTreeSet::from([1, 3]));
    }

    #[test]
    fn test_explicit_rule_suppresses_builtin() {
        let catalog = catalog();
        let mut rules = RuleSet::new();
        rules.matching_rules.push(MatchingRule {
            id: 1,
            source_layer_id: 1,
            target_layer_id: 2,
            property: MatchProperty::Color,
        });
        assert!(builtin_matching_rules(&catalog, &rules).is_empty());

        rules.matching_rules[0].property = MatchProperty::NamePrefix;
        assert_eq!(builtin_matching_rules(&catalog, &rules).len(), 1);
    }

    #[test]
    fn test_without_builtins() {
        let store = RuleStore::without_builtins(&RuleSet::new());
        assert!(store.is_empty());
        assert!(RuleStore::disabled().is_empty());
    }

    #[test]
    fn test_rule_candidates_by_color_family() {
        let catalog = catalog();
        let store = RuleStore::new(&catalog, &RuleSet::new());
        let rule = &store.effective_matching_rules()[0].rule;

        let red_head = catalog.item(1, 10).unwrap();
        let ids: Vec<u64> = store
            .rule_candidates(&catalog, rule, red_head)
            .iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(ids, vec![20]);

        let skull = catalog.item(1, 12).unwrap();
        assert!(store.rule_candidates(&catalog, rule, skull).is_empty());
    }

    #[test]
    fn test_specific_pair_exclusion() {
        let catalog = catalog();
        let mut rules = RuleSet::new();
        rules.exclusion_rules.push(ExclusionRule {
            id: 1,
            source_layer_id: 3,
            target_layer_id: 2,
            kind: ExclusionKind::SpecificPair {
                source_item_id: 30,
                target_item_id: 21,
            },
        });
        let store = RuleStore::without_builtins(&rules);

        let forbidden: Combination = [(3, 30), (2, 21)].into_iter().collect();
        let allowed: Combination = [(3, 31), (2, 21)].into_iter().collect();
        let partial: Combination = [(3, 30)].into_iter().collect();
        assert!(store.violates_exclusions(&catalog, &forbidden));
        assert!(!store.violates_exclusions(&catalog, &allowed));
        assert!(!store.violates_exclusions(&catalog, &partial));
    }

    #[test]
    fn test_property_exclusion_uses_color_family() {
        let catalog = catalog();
        let mut rules = RuleSet::new();
        rules.exclusion_rules.push(ExclusionRule {
            id: 1,
            source_layer_id: 3,
            target_layer_id: 2,
            kind: ExclusionKind::Property(MatchProperty::Color),
        });
        let store = RuleStore::without_builtins(&rules);

        let same_family: Combination = [(3, 30), (2, 20)].into_iter().collect();
        let different: Combination = [(3, 30), (2, 21)].into_iter().collect();
        let no_color: Combination = [(3, 31), (2, 22)].into_iter().collect();
        assert!(store.violates_exclusions(&catalog, &same_family));
        assert!(!store.violates_exclusions(&catalog, &different));
        assert!(!store.violates_exclusions(&catalog, &no_color));
    }

    #[test]
    fn test_coherence() {
        let catalog = catalog();
        let store = RuleStore::new(&catalog, &RuleSet::new());

        let matching: Combination = [(1, 10), (2, 20)].into_iter().collect();
        let clashing: Combination = [(1, 10), (2, 21)].into_iter().collect();
        let colorless: Combination = [(1, 12), (2, 21)].into_iter().collect();
        assert!(store.is_coherent(&catalog, &matching));
        assert_eq!(store.incoherent_pair(&catalog, &clashing), Some((1, 2)));
        assert!(store.is_coherent(&catalog, &colorless));
        assert!(RuleStore::disabled().is_coherent(&catalog, &clashing));
    }
}
