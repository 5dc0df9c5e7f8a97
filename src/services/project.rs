//! Project file I/O service.
//!
//! This module centralizes loading and saving project documents so that every
//! caller gets the same error messages and atomic write behavior.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::models::Project;

/// Service for project file I/O operations.
pub struct ProjectService;

impl ProjectService {
    /// Loads a project from a JSON file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the project document
    ///
    /// # Returns
    ///
    /// * `Ok(Project)` - Parsed and validated project
    /// * `Err(...)` - File not found, malformed JSON, or inconsistent rules
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use traitforge::services::ProjectService;
    ///
    /// let project = ProjectService::load(Path::new("collection.json"))?;
    /// println!("{} layers", project.catalog.len());
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn load(path: &Path) -> Result<Project> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read project file: {}", path.display()))?;
        Project::from_json(&content)
            .with_context(|| format!("Failed to load project from {}", path.display()))
    }

    /// Saves a project to a JSON file.
    ///
    /// This performs an atomic write using a temp file + rename pattern so the
    /// file is never left half-written.
    pub fn save(project: &Project, path: &Path) -> Result<()> {
        let content = project
            .to_json()
            .context("Failed to serialize project")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content)
            .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;
        fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to save project to {}", path.display()))?;
        Ok(())
    }
}
