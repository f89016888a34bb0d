//! Coursecat - Versioned course catalogs with multi-step approval.
//!
//! Open a [`CatalogService`] over a directory, or in memory for tests, and
//! drive catalogs through draft, review and promotion.

pub mod database;
pub mod error;
pub mod service;

pub use database::Database;
pub use error::Error;
pub use service::CatalogService;

/// Re-export the engine crate.
pub use coursecat_core as core;

pub use coursecat_core::{
    ActorId, ApprovalStage, ApprovalStatus, CatalogId, CatalogRecord, ChangeSet, ComparisonType,
    ContentValue, DraftOutcome, EngineConfig, ErrorKind, NewCatalog, NewVersion, Priority,
    StepDecision, SubmitRequest, Submission, VersionComparison, VersionId, VersionRecord,
    WorkflowId,
};
