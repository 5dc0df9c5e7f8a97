//! CLI command handlers for TraitForge.
//!
//! This module provides headless, scriptable access to the generation engine
//! for automation, testing, and CI/CD integration.

pub mod common;
pub mod generate;
pub mod inspect;
pub mod preview;
pub mod session;

// Re-export types used by main.rs and tests
pub use common::{CliError, CliResult, ExitCode};
pub use generate::GenerateArgs;
pub use inspect::InspectArgs;
pub use preview::PreviewArgs;
pub use session::SessionArgs;
