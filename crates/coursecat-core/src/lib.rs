//! Coursecat Core - Catalog versioning, change tracking, and approval workflows.
//!
//! This crate provides the engine behind Coursecat: immutable catalog
//! versions with a single current pointer, field-level change tracking,
//! version comparison, and multi-step approval before promotion.

pub mod catalog;
pub mod changes;
pub mod collab;
pub mod compare;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod snapshot;
pub mod store;
pub mod workflow;

pub use catalog::{
    ActorId, ApprovalStatus, CatalogId, CatalogRecord, CatalogStatus, CatalogVersionManager,
    NewCatalog, NewVersion, VersionId, VersionRecord, WorkflowId,
};
pub use changes::{ChangeSet, ChangeSummary, ChangeTracker, VersionChange};
pub use collab::{
    Identity, MemoryNotifier, NoopNotifier, NotificationEvent, Notifier, StaticIdentity,
    TracingNotifier,
};
pub use compare::{ComparisonDetail, ComparisonType, Significance, VersionComparator, VersionComparison};
pub use config::EngineConfig;
pub use engine::{CatalogEngine, DraftOutcome};
pub use error::{Error, ErrorKind};
pub use snapshot::{ChangeType, ContentValue, DiffPolicy, FieldClass, ImpactLevel, ListMatching};
pub use store::{MemoryStore, RecordStore, SledStore, StoreError};
pub use workflow::{
    ApprovalOutcome, ApprovalStage, ApprovalStep, ApprovalWorkflow, ApprovalWorkflowEngine,
    CatalogApproval, Priority, StepDecision, StepStatus, StepTemplate, SubmitRequest, Submission,
    WorkflowStatus, WorkflowTemplate,
};

// Metrics exports
pub use metrics::{new_shared_metrics, EngineMetrics, MetricsSnapshot, SharedMetrics};
