//! Shared CLI error type and exit codes.

use std::fmt;
use std::path::Path;

use uuid::Uuid;

use crate::config::Config;
use crate::models::Project;
use crate::services::ProjectService;

/// Process exit codes of CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Command succeeded
    Success = 0,
    /// Invalid input (bad arguments, malformed project, unsatisfiable request)
    Validation = 1,
    /// File system or archive failure
    Io = 2,
    /// Fewer combinations were produced than requested
    Shortfall = 3,
}

impl ExitCode {
    /// Numeric process exit code.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// Error returned by CLI command handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliError {
    /// Exit code the process ends with
    pub kind: ExitCode,
    /// Message printed to stderr
    pub message: String,
}

impl CliError {
    /// Invalid input.
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: ExitCode::Validation,
            message: message.into(),
        }
    }

    /// File system failure.
    pub fn io(message: impl Into<String>) -> Self {
        Self {
            kind: ExitCode::Io,
            message: message.into(),
        }
    }

    /// Generation produced fewer combinations than requested.
    pub fn shortfall(message: impl Into<String>) -> Self {
        Self {
            kind: ExitCode::Shortfall,
            message: message.into(),
        }
    }

    /// Exit code of this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.kind.code()
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type of CLI command handlers.
pub type CliResult<T> = Result<T, CliError>;

/// Loads a project file; a missing file is an I/O error, a bad document a
/// validation error.
pub fn load_project(path: &Path) -> CliResult<Project> {
    if !path.exists() {
        return Err(CliError::io(format!(
            "Project file not found: {}",
            path.display()
        )));
    }
    ProjectService::load(path).map_err(|e| CliError::validation(format!("{e:#}")))
}

/// Loads the configuration file.
pub fn load_config() -> CliResult<Config> {
    Config::load().map_err(|e| CliError::validation(format!("Failed to load configuration: {e:#}")))
}

/// Session store scope of a project file, stable for as long as the file
/// stays where it is.
pub fn project_scope(path: &Path) -> CliResult<String> {
    let canonical = path.canonicalize().map_err(|e| {
        CliError::io(format!("Failed to resolve project path {}: {e}", path.display()))
    })?;
    let id = Uuid::new_v5(&Uuid::NAMESPACE_URL, canonical.to_string_lossy().as_bytes());
    Ok(id.simple().to_string())
}
