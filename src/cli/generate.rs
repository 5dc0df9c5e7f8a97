//! Generate command: run a batch session and archive the metadata.

use crate::cli::common::{load_config, load_project, project_scope, CliError, CliResult};
use crate::models::SessionStatus;
use crate::services::{
    export_batch, Archiver, BatchStatus, CombinationGenerator, ExportOptions, FileSessionStore,
    GenerationInput, GenerationOptions, ProjectService, SessionManager, SessionRequest,
    ZipArchiver,
};
use clap::Args;
use std::path::PathBuf;

/// Generate a collection and write its metadata into a zip archive
#[derive(Debug, Clone, Args)]
pub struct GenerateArgs {
    /// Path to project JSON file
    #[arg(short, long, value_name = "FILE")]
    pub project: PathBuf,

    /// Total number of combinations to generate
    #[arg(short = 'n', long)]
    pub count: usize,

    /// Combinations per batch (defaults to the configured batch size)
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Collection name used in metadata
    #[arg(long, value_name = "NAME", default_value = "Collection")]
    pub collection: String,

    /// Output image edge length in pixels
    #[arg(long, value_name = "PX", default_value_t = 1024)]
    pub image_size: u32,

    /// Ignore matching/exclusion rules and manual mappings
    #[arg(long)]
    pub no_rules: bool,

    /// RNG seed for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output zip file
    #[arg(short, long, value_name = "FILE")]
    pub out: PathBuf,

    /// Write usage stats and generated hashes back to the project file
    #[arg(long)]
    pub save: bool,

    /// Continue an interrupted session instead of starting a new one,
    /// appending to the existing output archive
    #[arg(long)]
    pub resume: bool,

    /// Session store directory (defaults to the configured directory)
    #[arg(long, value_name = "DIR")]
    pub store_dir: Option<PathBuf>,
}

impl GenerateArgs {
    /// Execute the generate command
    pub fn execute(&self) -> CliResult<()> {
        if self.count == 0 {
            return Err(CliError::validation("Count must be greater than 0"));
        }

        let config = load_config()?;
        let mut project = load_project(&self.project)?;
        let batch_size = self.batch_size.unwrap_or(config.session.default_batch_size);
        if batch_size == 0 {
            return Err(CliError::validation("Batch size must be greater than 0"));
        }

        let store_dir = match &self.store_dir {
            Some(dir) => dir.clone(),
            None => config
                .session
                .store_dir()
                .map_err(|e| CliError::io(format!("Failed to resolve session directory: {e:#}")))?,
        };
        let mut manager = SessionManager::scoped(
            FileSessionStore::new(store_dir, config.session.ttl()),
            project_scope(&self.project)?,
        );
        manager.restore();
        manager.merge_history(&project.generated_combinations);

        let resumable = manager
            .session()
            .is_some_and(|session| !session.is_finished());
        if self.resume && !resumable {
            return Err(CliError::validation("No interrupted session to resume"));
        }
        if !self.resume {
            let request = SessionRequest {
                total_count: self.count,
                batch_size,
                collection_name: self.collection.clone(),
                image_size: self.image_size,
                use_rules: !self.no_rules,
            };
            manager
                .start(&project.catalog, &request)
                .map_err(|e| CliError::validation(format!("{e:#}")))?;
        }

        let mut usage = project.trait_usage_stats.clone();
        let mut generator =
            CombinationGenerator::new(GenerationOptions::from_config(&config.generation), self.seed);
        let archiver = if self.resume {
            ZipArchiver::append(&self.out)
        } else {
            ZipArchiver::create(&self.out)
        };
        let mut archiver = archiver.map_err(|e| CliError::io(format!("{e:#}")))?;
        let cancel = manager.cancel_token();

        let mut exported = 0;
        let mut shortfall = false;
        {
            let input = GenerationInput::from_project(&project);
            loop {
                let Some(session) = manager.session() else {
                    break;
                };
                let status = session.status;
                if session.is_finished() || (shortfall && status != SessionStatus::Ready) {
                    break;
                }

                match status {
                    SessionStatus::Paused => {
                        manager
                            .resume()
                            .map_err(|e| CliError::validation(format!("{e:#}")))?;
                    }
                    SessionStatus::Generating | SessionStatus::Completed => {
                        let result = manager
                            .generate_next_batch(&mut generator, &input, &mut usage, |progress| {
                                tracing::debug!(
                                    "{}/{} combinations ({} attempts)",
                                    progress.produced,
                                    progress.requested,
                                    progress.attempts
                                );
                            })
                            .map_err(|e| CliError::validation(format!("{e:#}")))?;
                        if result.status == BatchStatus::Cancelled {
                            break;
                        }
                        shortfall |= result.status == BatchStatus::Partial;
                    }
                    SessionStatus::Ready => {
                        let options = ExportOptions {
                            collection_name: session.collection_name.clone(),
                            image_size: session.image_size,
                            offset: session.current_batch_offset(),
                        };
                        let combinations = manager
                            .begin_download()
                            .map_err(|e| CliError::validation(format!("{e:#}")))?;
                        match export_batch(
                            &project.catalog,
                            &combinations,
                            &options,
                            None,
                            &mut archiver,
                            &cancel,
                        ) {
                            Ok(report) => {
                                exported += report.exported.len();
                                manager
                                    .finish_download(!report.cancelled)
                                    .map_err(|e| CliError::validation(format!("{e:#}")))?;
                            }
                            Err(e) => {
                                // Leave the batch ready so --resume can retry it.
                                if let Err(retry) = manager.finish_download(false) {
                                    tracing::warn!("Failed to reset batch for retry: {:#}", retry);
                                }
                                return Err(CliError::io(format!("{e:#}")));
                            }
                        }
                    }
                    SessionStatus::Downloading => {
                        return Err(CliError::validation(
                            "Session is stuck in an unfinished export",
                        ));
                    }
                }
            }
        }

        archiver
            .finish()
            .map_err(|e| CliError::io(format!("{e:#}")))?;

        let (produced, requested, finished) = manager.session().map_or((0, self.count, false), |s| {
            (s.generated_hashes.len(), s.total_count, s.is_finished())
        });
        if self.save {
            if let Some(session) = manager.session() {
                project
                    .generated_combinations
                    .extend(session.generated_hashes.iter().cloned());
            }
            project.trait_usage_stats = usage;
            ProjectService::save(&project, &self.project)
                .map_err(|e| CliError::io(format!("{e:#}")))?;
        }

        println!(
            "Exported {} combinations to {}",
            exported,
            archiver.path().display()
        );

        if shortfall || !finished {
            return Err(CliError::shortfall(format!(
                "Only {produced} of {requested} combinations could be generated"
            )));
        }
        Ok(())
    }
}
