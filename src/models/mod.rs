//! Data models for trait catalogs, rules, combinations, and sessions.
//!
//! This module contains the plain data structures shared by the generation
//! engine, the session manager, and the CLI. Models carry validation but no
//! generation logic.

pub mod combination;
pub mod layer;
pub mod project;
pub mod rules;
pub mod session;
pub mod usage;

// Re-export all model types
pub use combination::{create_combination_hash, Combination, HASH_DELIMITER};
pub use layer::{Item, ItemId, Layer, LayerId, TraitCatalog};
pub use project::{Project, RarityMode};
pub use rules::{
    ExclusionKind, ExclusionRule, ManualMapping, MatchProperty, MatchingRule, RuleId, RuleSet,
};
pub use session::{Session, SessionStatus};
pub use usage::{GeneratedHashes, PairKey, PairUsage, QuotaState, TraitUsageStats};
