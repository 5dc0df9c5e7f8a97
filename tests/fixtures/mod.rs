//! Shared test fixtures for integration and CLI tests.
#![allow(dead_code)] // Not every test binary uses every fixture

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use traitforge::models::{Combination, ItemId, LayerId, Project, TraitCatalog};
use traitforge::services::{
    BatchRequest, BatchResult, CancelToken, CombinationGenerator, GenerationContext,
    GenerationInput, GenerationOptions, ProjectService,
};

/// Seed used by every generation test.
pub const SEED: u64 = 0x7EA5_0001;

/// Builds a project from `(layer name, item names)` pairs, bottom layer first.
pub fn project_with_layers(layers: &[(&str, &[&str])]) -> Project {
    let mut project = Project::new();
    for &(name, items) in layers {
        project
            .add_layer(name, items)
            .expect("Failed to add fixture layer");
    }
    project
}

/// Item names `"<prefix> 0"` .. `"<prefix> n-1"`.
pub fn numbered_items(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix} {i}")).collect()
}

/// Adds a layer with `n` numbered items and returns its id.
pub fn add_numbered_layer(project: &mut Project, name: &str, n: usize) -> LayerId {
    project
        .add_layer(name, &numbered_items(name, n))
        .expect("Failed to add numbered layer")
}

/// Looks up `(layer id, item id)` by names.
pub fn item(project: &Project, layer: &str, item: &str) -> (LayerId, ItemId) {
    project
        .find_item(layer, item)
        .unwrap_or_else(|| panic!("Fixture item {layer}/{item} not found"))
}

/// Name of the item chosen for a layer, if any.
pub fn chosen_name(catalog: &TraitCatalog, combination: &Combination, layer_id: LayerId) -> Option<String> {
    let item_id = combination.get(layer_id)?;
    catalog.item(layer_id, item_id).map(|item| item.name.clone())
}

/// Seeded generator with default options.
pub fn seeded_generator() -> CombinationGenerator {
    CombinationGenerator::new(GenerationOptions::default(), Some(SEED))
}

/// Runs one batch over a project with a fresh cancel token.
pub fn run_batch(
    generator: &mut CombinationGenerator,
    project: &Project,
    context: &mut GenerationContext,
    size: usize,
    respect_quotas: bool,
) -> BatchResult {
    let input = GenerationInput::from_project(project);
    let request = BatchRequest {
        size,
        use_rules: true,
        respect_quotas,
    };
    generator.generate_batch(&input, context, &request, &CancelToken::new(), |_| {})
}

/// Writes a project into a temp dir and returns its path.
pub fn create_temp_project_file(project: &Project) -> (PathBuf, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let path = temp_dir.path().join("project.json");
    ProjectService::save(project, &path).expect("Failed to write project");
    (path, temp_dir)
}

/// Number of `.json` entries in a zip archive.
pub fn zip_json_entries(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).expect("Failed to open zip");
    let archive = zip::ZipArchive::new(file).expect("Failed to read zip");
    archive
        .file_names()
        .filter(|name| name.ends_with(".json"))
        .map(str::to_string)
        .collect()
}
