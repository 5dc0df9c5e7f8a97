//! TraitForge Library
//!
//! This library provides the core of the TraitForge collection generator:
//! trait catalogs and rules, the combination generation engine, resumable
//! batch sessions, and export packaging.

// Module declarations
pub mod cli;
pub mod config;
pub mod constants;
pub mod models;
pub mod services;
