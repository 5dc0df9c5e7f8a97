//! Inspect command: show a project's layers, rules, and capacity.

use crate::cli::common::{load_project, CliError, CliResult};
use crate::models::{ExclusionKind, Project, TraitCatalog};
use crate::services::RuleStore;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

/// Display layers, rules, and capacity of a project
#[derive(Debug, Clone, Args)]
pub struct InspectArgs {
    /// Path to project JSON file
    #[arg(short, long, value_name = "FILE")]
    pub project: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize, Debug)]
struct InspectOutput {
    rarity_mode: String,
    layers: Vec<LayerOutput>,
    matching_rules: Vec<RuleOutput>,
    exclusion_rules: Vec<RuleOutput>,
    manual_mappings: Vec<RuleOutput>,
    theoretical_max: u64,
    generated: usize,
    remaining_capacity: u64,
}

#[derive(Serialize, Debug)]
struct LayerOutput {
    id: u64,
    name: String,
    z_index: usize,
    exact_count_mode: bool,
    items: Vec<ItemOutput>,
}

#[derive(Serialize, Debug)]
struct ItemOutput {
    id: u64,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    rarity: Option<f64>,
    count: u32,
}

#[derive(Serialize, Debug)]
struct RuleOutput {
    origin: String,
    description: String,
}

impl InspectArgs {
    /// Execute the inspect command
    pub fn execute(&self) -> CliResult<()> {
        let project = load_project(&self.project)?;
        let output = build_output(&project);

        if self.json {
            let json = serde_json::to_string_pretty(&output)
                .map_err(|e| CliError::io(format!("Failed to serialize JSON: {e}")))?;
            println!("{json}");
        } else {
            print_human_readable(&output);
        }
        Ok(())
    }
}

fn layer_name(catalog: &TraitCatalog, layer_id: u64) -> String {
    catalog
        .layer(layer_id)
        .map_or_else(|| format!("<layer {layer_id}>"), |layer| layer.name.clone())
}

fn item_name(catalog: &TraitCatalog, layer_id: u64, item_id: u64) -> String {
    catalog
        .item(layer_id, item_id)
        .map_or_else(|| format!("<item {item_id}>"), |item| item.name.clone())
}

fn build_output(project: &Project) -> InspectOutput {
    let catalog = &project.catalog;
    let store = RuleStore::new(catalog, &project.rules);

    let layers = catalog
        .layers_by_z()
        .into_iter()
        .map(|layer| LayerOutput {
            id: layer.id,
            name: layer.name.clone(),
            z_index: layer.z_index,
            exact_count_mode: layer.exact_count_mode,
            items: layer
                .items
                .iter()
                .map(|item| ItemOutput {
                    id: item.id,
                    name: item.name.clone(),
                    rarity: item.rarity,
                    count: item.count,
                })
                .collect(),
        })
        .collect();

    let matching_rules = store
        .effective_matching_rules()
        .iter()
        .map(|effective| RuleOutput {
            origin: effective.origin.to_string(),
            description: format!(
                "{} -> {} by {}",
                layer_name(catalog, effective.rule.source_layer_id),
                layer_name(catalog, effective.rule.target_layer_id),
                effective.rule.property
            ),
        })
        .collect();

    let exclusion_rules = store
        .exclusion_rules()
        .iter()
        .map(|rule| {
            let source = layer_name(catalog, rule.source_layer_id);
            let target = layer_name(catalog, rule.target_layer_id);
            let description = match &rule.kind {
                ExclusionKind::Property(property) => {
                    format!("{source} x {target} must not share {property}")
                }
                ExclusionKind::SpecificPair {
                    source_item_id,
                    target_item_id,
                } => format!(
                    "{source}: {} x {target}: {}",
                    item_name(catalog, rule.source_layer_id, *source_item_id),
                    item_name(catalog, rule.target_layer_id, *target_item_id)
                ),
            };
            RuleOutput {
                origin: "user".to_string(),
                description,
            }
        })
        .collect();

    let manual_mappings = store
        .manual_mappings()
        .iter()
        .map(|mapping| RuleOutput {
            origin: "user".to_string(),
            description: format!(
                "{}: {} => {}: {}",
                layer_name(catalog, mapping.source_layer_id),
                item_name(catalog, mapping.source_layer_id, mapping.source_item_id),
                layer_name(catalog, mapping.target_layer_id),
                item_name(catalog, mapping.target_layer_id, mapping.target_item_id)
            ),
        })
        .collect();

    let theoretical_max = catalog.theoretical_max();
    let generated = project.generated_combinations.len();

    InspectOutput {
        rarity_mode: project.rarity_mode.to_string(),
        layers,
        matching_rules,
        exclusion_rules,
        manual_mappings,
        theoretical_max,
        generated,
        remaining_capacity: theoretical_max
            .saturating_sub(project.generated_combinations.count_within(catalog)),
    }
}

fn print_human_readable(output: &InspectOutput) {
    println!("Layers (bottom to top):");
    for layer in &output.layers {
        let mode = if layer.exact_count_mode {
            " [exact count]"
        } else {
            ""
        };
        println!("  {}. {} (id {}){}", layer.z_index, layer.name, layer.id, mode);
        for item in &layer.items {
            let mut line = format!("     - {} (id {})", item.name, item.id);
            if let Some(rarity) = item.rarity {
                line.push_str(&format!(" rarity {rarity:.1}%"));
            }
            if layer.exact_count_mode {
                line.push_str(&format!(" count {}", item.count));
            }
            println!("{line}");
        }
    }
    println!();

    println!("Rarity mode: {}", output.rarity_mode);
    println!();

    for (title, rules) in [
        ("Matching rules", &output.matching_rules),
        ("Exclusion rules", &output.exclusion_rules),
        ("Manual mappings", &output.manual_mappings),
    ] {
        println!("{title}:");
        if rules.is_empty() {
            println!("  (none)");
        }
        for rule in rules {
            println!("  [{}] {}", rule.origin, rule.description);
        }
        println!();
    }

    println!("Theoretical capacity: {}", output.theoretical_max);
    println!("Already generated:    {}", output.generated);
    println!("Remaining capacity:   {}", output.remaining_capacity);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_output_marks_builtin_rules() {
        let mut project = Project::new();
        let head = project.add_layer("Head", &["Red Head", "Blue Head"]).unwrap();
        project.add_layer("Body", &["Red Body", "Blue Body"]).unwrap();
        let hat = project.add_layer("Hat", &["Cap"]).unwrap();
        project.add_matching_rule(head, hat, "name").unwrap();
        project.generated_combinations.insert("1:1|2:3|3:5");

        let output = build_output(&project);
        assert_eq!(output.layers.len(), 3);
        assert_eq!(output.theoretical_max, 4);
        assert_eq!(output.generated, 1);
        assert_eq!(output.remaining_capacity, 3);

        let origins: Vec<&str> = output
            .matching_rules
            .iter()
            .map(|rule| rule.origin.as_str())
            .collect();
        assert_eq!(origins, vec!["user", "built-in"]);
        assert_eq!(output.matching_rules[1].description, "Head -> Body by color");
    }
}
