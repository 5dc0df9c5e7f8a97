//! TraitForge - trait-combination generator for layered collections
//!
//! This application generates unique, rule-compliant trait combinations from
//! a project file and packages their metadata for export.

use clap::{Parser, Subcommand};
use traitforge::cli::{CliError, GenerateArgs, InspectArgs, PreviewArgs, SessionArgs};
use traitforge::constants::APP_NAME;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// TraitForge - trait-combination generator for layered collections
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print sample combinations of a project
    Preview(PreviewArgs),
    /// Display layers, rules, and capacity of a project
    Inspect(InspectArgs),
    /// Generate a collection and archive its metadata
    Generate(GenerateArgs),
    /// Inspect or drop persisted session state
    Session(SessionArgs),
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match &cli.command {
        Commands::Preview(args) => args.execute(),
        Commands::Inspect(args) => args.execute(),
        Commands::Generate(args) => args.execute(),
        Commands::Session(args) => args.execute(),
    };

    if let Err(CliError { kind, message }) = result {
        eprintln!("{APP_NAME}: {message}");
        std::process::exit(kind.code());
    }
}
