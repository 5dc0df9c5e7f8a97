//! Service layer for business logic.
//!
//! This module contains the generation engine (property extraction, rule
//! store, selector, resolver, generator), the batch session manager, export
//! packaging, and project file I/O.

pub mod export;
pub mod generator;
pub mod project;
pub mod property;
pub mod quota;
pub mod resolver;
pub mod rules;
pub mod selector;
pub mod session;

// Re-export commonly used types and functions
pub use export::{
    export_batch, trait_metadata, Archiver, ExportOptions, ExportReport, NftMetadata, Renderer,
    TraitAttribute, ZipArchiver,
};
pub use generator::{
    BatchProgress, BatchRequest, BatchResult, BatchStatus, CancelToken, CombinationGenerator,
    CombinationSolver, GenerationContext, GenerationInput, GenerationOptions, RetrySolver,
    SchedulePolicy,
};
pub use project::ProjectService;
pub use quota::initialize_quotas;
pub use resolver::{Attempt, ConstraintResolver};
pub use rules::{EffectiveRule, RuleOrigin, RuleStore};
pub use selector::Selector;
pub use session::{
    FileSessionStore, MemorySessionStore, SessionManager, SessionRequest, SessionStore,
};
