//! Project document: the full reproducibility contract of a collection.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{
    ExclusionKind, ExclusionRule, GeneratedHashes, Item, ItemId, Layer, LayerId, ManualMapping,
    MatchProperty, MatchingRule, RuleId, RuleSet, TraitCatalog, TraitUsageStats,
};

/// Global rarity handling for non-quota layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RarityMode {
    /// Sample proportionally to item rarity
    #[default]
    Weighted,
    /// Ignore rarity and sample uniformly
    Equal,
}

impl std::fmt::Display for RarityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Weighted => write!(f, "weighted"),
            Self::Equal => write!(f, "equal"),
        }
    }
}

/// Importable/exportable project.
///
/// Re-importing this document and regenerating avoids every hash listed in
/// `generated_combinations`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Layers and items
    #[serde(default, rename = "layers")]
    pub catalog: TraitCatalog,
    /// Matching rules, exclusion rules, and manual mappings
    #[serde(flatten)]
    pub rules: RuleSet,
    /// Global rarity mode
    #[serde(default)]
    pub rarity_mode: RarityMode,
    /// Accumulated usage counts
    #[serde(default)]
    pub trait_usage_stats: TraitUsageStats,
    /// Hashes of every combination produced so far
    #[serde(default)]
    pub generated_combinations: GeneratedHashes,
    /// Next free layer id
    #[serde(default = "first_id")]
    pub next_layer_id: LayerId,
    /// Next free item id
    #[serde(default = "first_id")]
    pub next_item_id: ItemId,
    /// Next free rule/mapping id
    #[serde(default = "first_id")]
    pub next_rule_id: RuleId,
}

/// Ids start at 1 so 0 never names a user object.
const fn first_id() -> u64 {
    1
}

impl Project {
    /// Creates an empty project.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_layer_id: first_id(),
            next_item_id: first_id(),
            next_rule_id: first_id(),
            ..Self::default()
        }
    }

    /// Parses a project document and checks its internal consistency.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed JSON, colliding ids, or rules that
    /// reference unknown layers/items.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut project: Self = serde_json::from_str(json)?;
        project.catalog = TraitCatalog::from_layers(project.catalog.layers().to_vec())?;
        project.rules.validate(&project.catalog)?;
        project.repair_counters();
        Ok(project)
    }

    /// Serializes the project as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Raises the id counters above every id in use.
    fn repair_counters(&mut self) {
        let max_layer = self.catalog.layers().iter().map(|layer| layer.id).max();
        let max_item = self
            .catalog
            .layers()
            .iter()
            .flat_map(|layer| layer.items.iter().map(|item| item.id))
            .max();
        let max_rule = self
            .rules
            .matching_rules
            .iter()
            .map(|rule| rule.id)
            .chain(self.rules.exclusion_rules.iter().map(|rule| rule.id))
            .chain(self.rules.manual_mappings.iter().map(|mapping| mapping.id))
            .max();

        if let Some(max) = max_layer {
            self.next_layer_id = self.next_layer_id.max(max + 1);
        }
        if let Some(max) = max_item {
            self.next_item_id = self.next_item_id.max(max + 1);
        }
        if let Some(max) = max_rule {
            self.next_rule_id = self.next_rule_id.max(max + 1);
        }
    }

    /// Adds a layer built from item names, spreading rarity evenly.
    ///
    /// Returns the new layer id.
    pub fn add_layer<S: AsRef<str>>(&mut self, name: &str, item_names: &[S]) -> Result<LayerId> {
        if item_names.is_empty() {
            anyhow::bail!("Layer '{name}' needs at least one item");
        }

        let rarity = 100.0 / item_names.len() as f64;
        let mut next_item = self.next_item_id;
        let items = item_names
            .iter()
            .map(|item_name| {
                let item = Item::new(next_item, item_name.as_ref().trim()).with_rarity(rarity);
                next_item += 1;
                item
            })
            .collect();

        let layer_id = self.next_layer_id;
        self.catalog.add_layer(Layer::new(layer_id, name, items)?)?;
        self.next_layer_id += 1;
        self.next_item_id = next_item;
        Ok(layer_id)
    }

    /// Removes a layer together with every rule that references it.
    pub fn remove_layer(&mut self, layer_id: LayerId) -> Result<Layer> {
        let layer = self.catalog.remove_layer(layer_id)?;
        self.rules.remove_layer_references(layer_id);
        Ok(layer)
    }

    /// Adds a matching rule and returns its id.
    pub fn add_matching_rule(
        &mut self,
        source_layer_id: LayerId,
        target_layer_id: LayerId,
        property: &str,
    ) -> Result<RuleId> {
        let id = self.next_rule_id;
        self.rules.add_matching_rule(
            &self.catalog,
            MatchingRule {
                id,
                source_layer_id,
                target_layer_id,
                property: MatchProperty::parse(property),
            },
        )?;
        self.next_rule_id += 1;
        Ok(id)
    }

    /// Adds an exclusion rule and returns its id.
    pub fn add_exclusion_rule(
        &mut self,
        source_layer_id: LayerId,
        target_layer_id: LayerId,
        kind: ExclusionKind,
    ) -> Result<RuleId> {
        let id = self.next_rule_id;
        self.rules.add_exclusion_rule(
            &self.catalog,
            ExclusionRule {
                id,
                source_layer_id,
                target_layer_id,
                kind,
            },
        )?;
        self.next_rule_id += 1;
        Ok(id)
    }

    /// Adds a manual mapping and returns its id.
    pub fn add_manual_mapping(
        &mut self,
        source_layer_id: LayerId,
        source_item_id: ItemId,
        target_layer_id: LayerId,
        target_item_id: ItemId,
    ) -> Result<RuleId> {
        let id = self.next_rule_id;
        self.rules.add_manual_mapping(
            &self.catalog,
            ManualMapping {
                id,
                source_layer_id,
                source_item_id,
                target_layer_id,
                target_item_id,
            },
        )?;
        self.next_rule_id += 1;
        Ok(id)
    }

    /// Looks up an item id by layer name and item name (case-insensitive).
    #[must_use]
    pub fn find_item(&self, layer_name: &str, item_name: &str) -> Option<(LayerId, ItemId)> {
        let layer = self
            .catalog
            .layers()
            .iter()
            .find(|layer| layer.name.eq_ignore_ascii_case(layer_name))?;
        let item = layer
            .items
            .iter()
            .find(|item| item.name.eq_ignore_ascii_case(item_name))?;
        Some((layer.id, item.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_layer_assigns_ids_and_even_rarity() {
        let mut project = Project::new();
        let head = project.add_layer("Head", &["Red Head", "Blue Head"]).unwrap();
        let body = project.add_layer("Body", &["Red Body", "Blue Body", "Green Body", "Gold Body"]).unwrap();

        assert_eq!(head, 1);
        assert_eq!(body, 2);
        assert_eq!(project.next_item_id, 7);

        let body_layer = project.catalog.layer(body).unwrap();
        assert_eq!(body_layer.z_index, 1);
        assert!(body_layer
            .items
            .iter()
            .all(|item| item.rarity == Some(25.0)));
    }

    #[test]
    fn test_add_layer_without_items_fails() {
        let mut project = Project::new();
        let empty: [&str; 0] = [];
        assert!(project.add_layer("Head", &empty).is_err());
        assert_eq!(project.next_layer_id, 1);
    }

    #[test]
    fn test_remove_layer_drops_rules() {
        let mut project = Project::new();
        let hats = project.add_layer("Hats", &["Pirate Hat"]).unwrap();
        let outfits = project.add_layer("Outfits", &["Pirate Coat"]).unwrap();
        project.add_matching_rule(hats, outfits, "name").unwrap();
        project.remove_layer(outfits).unwrap();
        assert!(project.rules.is_empty());
        assert_eq!(project.catalog.len(), 1);
    }

    #[test]
    fn test_json_field_names() {
        let mut project = Project::new();
        let hats = project.add_layer("Hats", &["Red Hat"]).unwrap();
        let shirts = project.add_layer("Shirts", &["Blue Shirt"]).unwrap();
        let (_, red_hat) = project.find_item("hats", "red hat").unwrap();
        let (_, blue_shirt) = project.find_item("Shirts", "Blue Shirt").unwrap();
        project
            .add_exclusion_rule(
                hats,
                shirts,
                ExclusionKind::SpecificPair {
                    source_item_id: red_hat,
                    target_item_id: blue_shirt,
                },
            )
            .unwrap();
        project.generated_combinations.insert("1:1|2:2");

        let json: serde_json::Value = serde_json::from_str(&project.to_json().unwrap()).unwrap();
        for key in [
            "layers",
            "traitMatchingRules",
            "traitExclusionRules",
            "manualMappings",
            "rarityMode",
            "traitUsageStats",
            "generatedCombinations",
            "nextLayerId",
            "nextItemId",
            "nextRuleId",
        ] {
            assert!(json.get(key).is_some(), "missing field {key}");
        }
        assert_eq!(json["rarityMode"], "weighted");
        assert_eq!(json["generatedCombinations"][0], "1:1|2:2");
    }

    #[test]
    fn test_from_json_repairs_counters() {
        let json = r#"{
            "layers": [
                {"id": 4, "name": "Eyes", "items": [{"id": 9, "name": "Green Eyes"}]}
            ],
            "rarityMode": "equal"
        }"#;
        let project = Project::from_json(json).unwrap();
        assert_eq!(project.next_layer_id, 5);
        assert_eq!(project.next_item_id, 10);
        assert_eq!(project.rarity_mode, RarityMode::Equal);
    }

    #[test]
    fn test_from_json_rejects_dangling_rules() {
        let json = r#"{
            "layers": [{"id": 1, "name": "Eyes", "items": [{"id": 1, "name": "A"}]}],
            "traitMatchingRules": [
                {"id": 1, "sourceLayerId": 1, "targetLayerId": 2, "property": "color"}
            ]
        }"#;
        assert!(Project::from_json(json).is_err());
        assert!(Project::from_json("{not json").is_err());
    }
}
