//! Application-wide constants.
//!
//! This module defines constants used throughout the application,
//! including the application name and persisted storage keys.

/// The display name of the application (human-readable, with proper capitalization).
pub const APP_NAME: &str = "TraitForge";

/// The binary name of the application (used in command examples, lowercase with hyphens).
pub const APP_BINARY_NAME: &str = "traitforge";

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "TRAITFORGE_CONFIG_DIR";

/// Session store key of the active batch session.
///
/// Project-scoped sessions use `<SESSION_KEY>-<scope>`.
pub const SESSION_KEY: &str = "traitforge-session";

/// Session store key of the generated-hash history.
///
/// Project-scoped histories use `<HISTORY_KEY>-<scope>`.
pub const HISTORY_KEY: &str = "traitforge-history";
