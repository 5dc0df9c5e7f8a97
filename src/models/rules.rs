//! Matching rules, exclusion rules, and manual mappings.

use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{ItemId, LayerId, TraitCatalog};

/// Identifier of a user-created rule or mapping.
pub type RuleId = u64;

/// How a rule derives a comparable value from an item name.
///
/// Serialized as a plain string: `"color"`, `"name"`, or any other keyword.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MatchProperty {
    /// Color family derived from color words in the name
    Color,
    /// Shared prefix before the first dash or underscore
    NamePrefix,
    /// Word following the token that contains the keyword
    Keyword(String),
}

impl MatchProperty {
    /// Parses a property string as stored in project files.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let normalized = value.trim().to_lowercase();
        match normalized.as_str() {
            "color" => Self::Color,
            "name" => Self::NamePrefix,
            _ => Self::Keyword(normalized),
        }
    }

    /// Property string as stored in project files.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Color => "color",
            Self::NamePrefix => "name",
            Self::Keyword(keyword) => keyword,
        }
    }
}

impl From<String> for MatchProperty {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<MatchProperty> for String {
    fn from(value: MatchProperty) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for MatchProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derivation constraint: an item chosen in the source layer determines the
/// valid choices in the target layer via a shared property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchingRule {
    /// Rule identifier
    pub id: RuleId,
    /// Layer whose selection drives the rule
    pub source_layer_id: LayerId,
    /// Layer that gets filled from the source selection
    pub target_layer_id: LayerId,
    /// Property used to compare item names
    pub property: MatchProperty,
}

/// Condition under which an exclusion rule forbids a pair of selections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionKind {
    /// Any two items whose derived property values match are forbidden together
    Property(MatchProperty),
    /// Exactly this source item and this target item are forbidden together
    SpecificPair {
        /// Forbidden item in the source layer
        source_item_id: ItemId,
        /// Forbidden item in the target layer
        target_item_id: ItemId,
    },
}

/// Forbidden co-occurrence between two layers' selections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawExclusionRule", into = "RawExclusionRule")]
pub struct ExclusionRule {
    /// Rule identifier
    pub id: RuleId,
    /// First layer of the pair
    pub source_layer_id: LayerId,
    /// Second layer of the pair
    pub target_layer_id: LayerId,
    /// Which pairs are forbidden
    pub kind: ExclusionKind,
}

/// Flat on-disk shape of an exclusion rule with optional fields.
///
/// Exactly one of `property` or the `source_item_id`/`target_item_id` pair is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawExclusionRule {
    /// Rule identifier
    pub id: RuleId,
    /// First layer of the pair
    pub source_layer_id: LayerId,
    /// Second layer of the pair
    pub target_layer_id: LayerId,
    /// Property for property-based rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    /// Source item for specific-pair rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_item_id: Option<ItemId>,
    /// Target item for specific-pair rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_item_id: Option<ItemId>,
}

impl TryFrom<RawExclusionRule> for ExclusionRule {
    type Error = String;

    fn try_from(raw: RawExclusionRule) -> Result<Self, Self::Error> {
        let kind = match (raw.property, raw.source_item_id, raw.target_item_id) {
            (Some(property), None, None) => ExclusionKind::Property(MatchProperty::parse(&property)),
            (None, Some(source_item_id), Some(target_item_id)) => ExclusionKind::SpecificPair {
                source_item_id,
                target_item_id,
            },
            _ => {
                return Err(format!(
                    "Exclusion rule {} must have either a property or both item ids",
                    raw.id
                ))
            }
        };

        Ok(Self {
            id: raw.id,
            source_layer_id: raw.source_layer_id,
            target_layer_id: raw.target_layer_id,
            kind,
        })
    }
}

impl From<ExclusionRule> for RawExclusionRule {
    fn from(rule: ExclusionRule) -> Self {
        let (property, source_item_id, target_item_id) = match rule.kind {
            ExclusionKind::Property(property) => (Some(String::from(property)), None, None),
            ExclusionKind::SpecificPair {
                source_item_id,
                target_item_id,
            } => (None, Some(source_item_id), Some(target_item_id)),
        };
        Self {
            id: rule.id,
            source_layer_id: rule.source_layer_id,
            target_layer_id: rule.target_layer_id,
            property,
            source_item_id,
            target_item_id,
        }
    }
}

/// Hard override: selecting the source item forces the target item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualMapping {
    /// Mapping identifier
    pub id: RuleId,
    /// Layer of the triggering item
    pub source_layer_id: LayerId,
    /// Triggering item
    pub source_item_id: ItemId,
    /// Layer that receives the forced item
    pub target_layer_id: LayerId,
    /// Forced item
    pub target_item_id: ItemId,
}

/// All user-created rules of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    /// Matching rules in creation order
    #[serde(default, rename = "traitMatchingRules")]
    pub matching_rules: Vec<MatchingRule>,
    /// Exclusion rules in creation order
    #[serde(default, rename = "traitExclusionRules")]
    pub exclusion_rules: Vec<ExclusionRule>,
    /// Manual mappings in creation order
    #[serde(default)]
    pub manual_mappings: Vec<ManualMapping>,
}

impl RuleSet {
    /// Creates an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no rules of any kind exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matching_rules.is_empty()
            && self.exclusion_rules.is_empty()
            && self.manual_mappings.is_empty()
    }

    /// Adds a matching rule after validating it against the catalog.
    pub fn add_matching_rule(&mut self, catalog: &TraitCatalog, rule: MatchingRule) -> Result<()> {
        validate_layer_pair(catalog, rule.source_layer_id, rule.target_layer_id)?;
        if let MatchProperty::Keyword(keyword) = &rule.property {
            if keyword.is_empty() {
                anyhow::bail!("Matching rule {} has an empty property", rule.id);
            }
        }
        self.matching_rules.push(rule);
        Ok(())
    }

    /// Adds an exclusion rule after validating it against the catalog.
    pub fn add_exclusion_rule(&mut self, catalog: &TraitCatalog, rule: ExclusionRule) -> Result<()> {
        validate_layer_pair(catalog, rule.source_layer_id, rule.target_layer_id)?;
        if let ExclusionKind::SpecificPair {
            source_item_id,
            target_item_id,
        } = rule.kind
        {
            validate_item(catalog, rule.source_layer_id, source_item_id)?;
            validate_item(catalog, rule.target_layer_id, target_item_id)?;
        }
        self.exclusion_rules.push(rule);
        Ok(())
    }

    /// Adds a manual mapping after validating it against the catalog.
    pub fn add_manual_mapping(&mut self, catalog: &TraitCatalog, mapping: ManualMapping) -> Result<()> {
        validate_layer_pair(catalog, mapping.source_layer_id, mapping.target_layer_id)?;
        validate_item(catalog, mapping.source_layer_id, mapping.source_item_id)?;
        validate_item(catalog, mapping.target_layer_id, mapping.target_item_id)?;
        self.manual_mappings.push(mapping);
        Ok(())
    }

    /// Drops every rule and mapping that references the given layer.
    pub fn remove_layer_references(&mut self, layer_id: LayerId) {
        self.matching_rules
            .retain(|rule| rule.source_layer_id != layer_id && rule.target_layer_id != layer_id);
        self.exclusion_rules
            .retain(|rule| rule.source_layer_id != layer_id && rule.target_layer_id != layer_id);
        self.manual_mappings.retain(|mapping| {
            mapping.source_layer_id != layer_id && mapping.target_layer_id != layer_id
        });
    }

    /// Removes a rule or mapping by id. Returns true if anything was removed.
    pub fn remove(&mut self, rule_id: RuleId) -> bool {
        let before = self.matching_rules.len() + self.exclusion_rules.len() + self.manual_mappings.len();
        self.matching_rules.retain(|rule| rule.id != rule_id);
        self.exclusion_rules.retain(|rule| rule.id != rule_id);
        self.manual_mappings.retain(|mapping| mapping.id != rule_id);
        let after = self.matching_rules.len() + self.exclusion_rules.len() + self.manual_mappings.len();
        after < before
    }

    /// Validates every stored rule against the catalog.
    pub fn validate(&self, catalog: &TraitCatalog) -> Result<()> {
        for rule in &self.matching_rules {
            validate_layer_pair(catalog, rule.source_layer_id, rule.target_layer_id)?;
        }
        for rule in &self.exclusion_rules {
            validate_layer_pair(catalog, rule.source_layer_id, rule.target_layer_id)?;
            if let ExclusionKind::SpecificPair {
                source_item_id,
                target_item_id,
            } = rule.kind
            {
                validate_item(catalog, rule.source_layer_id, source_item_id)?;
                validate_item(catalog, rule.target_layer_id, target_item_id)?;
            }
        }
        for mapping in &self.manual_mappings {
            validate_layer_pair(catalog, mapping.source_layer_id, mapping.target_layer_id)?;
            validate_item(catalog, mapping.source_layer_id, mapping.source_item_id)?;
            validate_item(catalog, mapping.target_layer_id, mapping.target_item_id)?;
        }
        Ok(())
    }
}

fn validate_layer_pair(catalog: &TraitCatalog, source: LayerId, target: LayerId) -> Result<()> {
    if source == target {
        anyhow::bail!("Rule source and target must be different layers (both are {source})");
    }
    if catalog.layer(source).is_none() {
        anyhow::bail!("Rule references unknown source layer {source}");
    }
    if catalog.layer(target).is_none() {
        anyhow::bail!("Rule references unknown target layer {target}");
    }
    Ok(())
}

fn validate_item(catalog: &TraitCatalog, layer_id: LayerId, item_id: ItemId) -> Result<()> {
    if catalog.item(layer_id, item_id).is_none() {
        anyhow::bail!("Item {item_id} does not belong to layer {layer_id}");
    }
    Ok(())
}
