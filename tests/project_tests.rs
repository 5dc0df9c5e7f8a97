//! Project import/export and catalog editing.

use std::collections::HashSet;

mod fixtures;

use fixtures::*;
use traitforge::models::{ExclusionKind, Project, RarityMode};
use traitforge::services::{GenerationContext, ProjectService};

fn sample_project() -> Project {
    let mut project = project_with_layers(&[
        ("Background", &["Sky", "Sand", "Night"]),
        ("Hat", &["Red Hat", "Blue Hat"]),
        ("Shirt", &["Red Shirt", "Blue Shirt"]),
    ]);
    let (hat, red_hat) = item(&project, "Hat", "Red Hat");
    let (shirt, blue_shirt) = item(&project, "Shirt", "Blue Shirt");
    project.add_matching_rule(hat, shirt, "color").unwrap();
    project
        .add_exclusion_rule(
            hat,
            shirt,
            ExclusionKind::SpecificPair {
                source_item_id: red_hat,
                target_item_id: blue_shirt,
            },
        )
        .unwrap();
    project.rarity_mode = RarityMode::Equal;
    project
}

#[test]
fn test_project_json_field_names() {
    let project = sample_project();
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
    assert_eq!(json["rarityMode"], "equal");
    assert_eq!(json["layers"][1]["name"], "Hat");
    assert_eq!(json["traitMatchingRules"][0]["property"], "color");
    assert!(json["traitExclusionRules"][0].get("property").is_none());
}

#[test]
fn test_reimported_project_avoids_generated_hashes() {
    let mut project = sample_project();
    let mut generator = seeded_generator();
    let mut context = GenerationContext::from_project(&project);
    let first = run_batch(&mut generator, &project, &mut context, 3, false);
    assert_eq!(first.combinations.len(), 3);

    project.generated_combinations = context.generated.clone();
    project.trait_usage_stats = context.usage.clone();
    let (path, _temp_dir) = create_temp_project_file(&project);
    let reloaded = ProjectService::load(&path).unwrap();
    assert_eq!(reloaded.generated_combinations, project.generated_combinations);
    assert_eq!(reloaded.trait_usage_stats, project.trait_usage_stats);
    assert_eq!(reloaded.rules, project.rules);

    let earlier: HashSet<String> = first.combinations.iter().map(|c| c.hash()).collect();
    let mut context = GenerationContext::from_project(&reloaded);
    let mut generator = seeded_generator();
    let second = run_batch(&mut generator, &reloaded, &mut context, 3, false);
    assert!(!second.combinations.is_empty());
    for combination in &second.combinations {
        assert!(!earlier.contains(&combination.hash()));
    }
}

#[test]
fn test_remove_layer_drops_rules_and_compacts() {
    let mut project = sample_project();
    let (hat, _) = item(&project, "Hat", "Red Hat");
    let (shirt, _) = item(&project, "Shirt", "Red Shirt");

    project.remove_layer(hat).unwrap();
    assert!(project.rules.matching_rules.is_empty());
    assert!(project.rules.exclusion_rules.is_empty());
    assert_eq!(project.catalog.layer(shirt).unwrap().z_index, 1);

    let mut z: Vec<usize> = project.catalog.layers().iter().map(|l| l.z_index).collect();
    z.sort_unstable();
    assert_eq!(z, vec![0, 1]);
}

#[test]
fn test_rule_validation_rejects_unknown_references() {
    let mut project = sample_project();
    let (hat, red_hat) = item(&project, "Hat", "Red Hat");
    let (shirt, _) = item(&project, "Shirt", "Red Shirt");

    assert!(project.add_matching_rule(hat, 999, "color").is_err());
    assert!(project.add_matching_rule(hat, hat, "color").is_err());
    assert!(project.add_manual_mapping(hat, red_hat, shirt, 999).is_err());
    assert_eq!(project.rules.matching_rules.len(), 1);
}

#[test]
fn test_load_rejects_dangling_rule() {
    let json = r#"{
        "layers": [
            {"id": 1, "name": "Hat", "items": [{"id": 1, "name": "Cap"}], "zIndex": 0, "exactCountMode": false}
        ],
        "traitMatchingRules": [
            {"id": 1, "sourceLayerId": 1, "targetLayerId": 7, "property": "color"}
        ]
    }"#;
    assert!(Project::from_json(json).is_err());
}

#[test]
fn test_load_repairs_id_counters() {
    let json = r#"{
        "layers": [
            {"id": 4, "name": "Hat", "items": [{"id": 9, "name": "Cap"}], "zIndex": 0, "exactCountMode": false}
        ],
        "nextLayerId": 1,
        "nextItemId": 1
    }"#;
    let mut project = Project::from_json(json).unwrap();
    assert_eq!(project.next_layer_id, 5);
    assert_eq!(project.next_item_id, 10);

    let layer = project.add_layer("Eyes", &["Round"]).unwrap();
    assert_eq!(layer, 5);
    assert_eq!(project.find_item("eyes", "round"), Some((5, 10)));
}
