//! Session management CLI commands.

use crate::cli::common::{load_config, project_scope, CliError, CliResult};
use crate::constants::APP_BINARY_NAME;
use crate::services::{FileSessionStore, SessionManager};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Inspect or drop persisted session state
#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Project JSON file whose session state is addressed
    #[arg(short, long, value_name = "FILE")]
    project: PathBuf,

    /// Session store directory (defaults to the configured directory)
    #[arg(long, value_name = "DIR", global = true)]
    store_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: SessionCommand,
}

#[derive(Subcommand, Debug)]
enum SessionCommand {
    /// Display the saved session
    Show(SessionShowArgs),
    /// Drop the saved session (the hash history is kept)
    Cancel,
    /// Forget every generated hash
    ClearHistory,
}

/// Display the saved session
#[derive(Args, Debug)]
pub struct SessionShowArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize, Debug)]
struct SessionOutput {
    id: String,
    status: String,
    collection_name: String,
    total_count: usize,
    batch_size: usize,
    current_batch: usize,
    total_batches: usize,
    completed_batches: usize,
    generated: usize,
    history: usize,
}

impl SessionArgs {
    /// Execute session subcommand
    pub fn execute(&self) -> CliResult<()> {
        let mut manager = self.manager()?;
        match &self.command {
            SessionCommand::Show(args) => args.execute(&mut manager, &self.project),
            SessionCommand::Cancel => {
                manager
                    .cancel()
                    .map_err(|e| CliError::io(format!("Failed to cancel session: {e:#}")))?;
                println!("Session cancelled.");
                Ok(())
            }
            SessionCommand::ClearHistory => {
                manager
                    .clear_history()
                    .map_err(|e| CliError::io(format!("Failed to clear history: {e:#}")))?;
                println!("Generated-combination history cleared.");
                Ok(())
            }
        }
    }

    fn manager(&self) -> CliResult<SessionManager<FileSessionStore>> {
        let config = load_config()?;
        let dir = match &self.store_dir {
            Some(dir) => dir.clone(),
            None => config
                .session
                .store_dir()
                .map_err(|e| CliError::io(format!("Failed to resolve session directory: {e:#}")))?,
        };
        Ok(SessionManager::scoped(
            FileSessionStore::new(dir, config.session.ttl()),
            project_scope(&self.project)?,
        ))
    }
}

impl SessionShowArgs {
    fn execute(
        &self,
        manager: &mut SessionManager<FileSessionStore>,
        project: &Path,
    ) -> CliResult<()> {
        let history = manager.load_history().len();
        let Some(session) = manager.restore() else {
            if self.json {
                println!("null");
            } else {
                println!("No saved session.");
                println!("History: {history} generated combinations");
            }
            return Ok(());
        };

        let output = SessionOutput {
            id: session.id.clone(),
            status: session.status.to_string(),
            collection_name: session.collection_name.clone(),
            total_count: session.total_count,
            batch_size: session.batch_size,
            current_batch: session.current_batch,
            total_batches: session.total_batches,
            completed_batches: session.completed_batches.len(),
            generated: session.generated_hashes.len(),
            history,
        };

        if self.json {
            let json = serde_json::to_string_pretty(&output)
                .map_err(|e| CliError::io(format!("Failed to serialize JSON: {e}")))?;
            println!("{json}");
        } else {
            println!("Session {}", output.id);
            println!("  Status:     {}", output.status);
            println!("  Collection: {}", output.collection_name);
            println!(
                "  Batches:    {}/{} exported (batch size {})",
                output.completed_batches, output.total_batches, output.batch_size
            );
            println!(
                "  Generated:  {}/{}",
                output.generated, output.total_count
            );
            println!("  History:    {} generated combinations", output.history);
            if output.completed_batches < output.total_batches {
                println!();
                println!(
                    "Continue with: {APP_BINARY_NAME} generate --resume --project {} --count {} --out <ZIP>",
                    project.display(),
                    output.total_count
                );
            }
        }
        Ok(())
    }
}
