//! Preview command: sample combinations without touching quotas or history.

use crate::cli::common::{load_config, load_project, CliError, CliResult};
use crate::services::{
    trait_metadata, CombinationGenerator, GenerationContext, GenerationInput, GenerationOptions,
    TraitAttribute,
};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

/// Print sample combinations of a project
#[derive(Debug, Clone, Args)]
pub struct PreviewArgs {
    /// Path to project JSON file
    #[arg(short, long, value_name = "FILE")]
    pub project: PathBuf,

    /// Number of combinations to print
    #[arg(short = 'n', long, default_value_t = 5)]
    pub count: usize,

    /// RNG seed for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,

    /// Ignore matching/exclusion rules and manual mappings
    #[arg(long)]
    pub no_rules: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize, Debug)]
struct PreviewEntry {
    hash: String,
    attributes: Vec<TraitAttribute>,
}

impl PreviewArgs {
    /// Execute the preview command
    pub fn execute(&self) -> CliResult<()> {
        if self.count == 0 {
            return Err(CliError::validation("Count must be greater than 0"));
        }

        let config = load_config()?;
        let project = load_project(&self.project)?;
        if project.catalog.non_empty_layers().is_empty() {
            return Err(CliError::validation("Project has no layers with items"));
        }

        let input = GenerationInput::from_project(&project);
        let mut generator =
            CombinationGenerator::new(GenerationOptions::from_config(&config.generation), self.seed);
        let mut context = GenerationContext::from_project(&project);

        let entries: Vec<Option<PreviewEntry>> = (0..self.count)
            .map(|_| {
                let combination =
                    generator.generate_combination(&input, &mut context, !self.no_rules, false);
                (!combination.is_empty()).then(|| PreviewEntry {
                    hash: combination.hash(),
                    attributes: trait_metadata(&project.catalog, &combination),
                })
            })
            .collect();

        if self.json {
            let json = serde_json::to_string_pretty(&entries)
                .map_err(|e| CliError::io(format!("Failed to serialize JSON: {e}")))?;
            println!("{json}");
            return Ok(());
        }

        for (index, entry) in entries.iter().enumerate() {
            match entry {
                Some(entry) => {
                    let traits: Vec<String> = entry
                        .attributes
                        .iter()
                        .map(|attr| format!("{}: {}", attr.trait_type, attr.value))
                        .collect();
                    println!("#{} {}", index + 1, traits.join(", "));
                }
                None => println!("#{} (no valid combination)", index + 1),
            }
        }
        Ok(())
    }
}
