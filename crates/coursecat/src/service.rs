//! Catalog administration service.

use std::path::Path;
use std::sync::Arc;

use coursecat_core::{
    ApprovalWorkflow, CatalogApproval, CatalogEngine, CatalogId, CatalogRecord, ChangeSet,
    ComparisonType, DraftOutcome, EngineConfig, Identity, MetricsSnapshot, NewCatalog,
    NewVersion, Notifier, RecordStore, StepDecision, SubmitRequest, Submission,
    VersionComparison, VersionId, VersionRecord, WorkflowId,
};
use tracing::{debug, warn};

use crate::database::Database;
use crate::error::Error;

/// Administrative entry point over a [`CatalogEngine`].
///
/// Operations that lose an optimistic-concurrency race are re-run from a
/// fresh read, up to the configured number of retries.
pub struct CatalogService {
    engine: CatalogEngine,
    database: Option<Database>,
    max_retries: u32,
}

impl CatalogService {
    /// Open a service over a database directory.
    pub fn open(
        data_path: &Path,
        config: EngineConfig,
        identity: Arc<dyn Identity>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, Error> {
        let database = Database::open(data_path)?;
        let mut service = Self::with_store(database.store(), config, identity, notifier)?;
        service.database = Some(database);
        Ok(service)
    }

    /// Create a service over any record store.
    pub fn with_store(
        store: Arc<dyn RecordStore>,
        config: EngineConfig,
        identity: Arc<dyn Identity>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, Error> {
        let max_retries = config.max_retries;
        let engine = CatalogEngine::new(store, config, identity, notifier)?;
        Ok(Self {
            engine,
            database: None,
            max_retries,
        })
    }

    /// Create a service over an in-memory store.
    pub fn in_memory(
        config: EngineConfig,
        identity: Arc<dyn Identity>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, Error> {
        Self::with_store(
            Arc::new(coursecat_core::MemoryStore::new()),
            config,
            identity,
            notifier,
        )
    }

    /// The engine.
    pub fn engine(&self) -> &CatalogEngine {
        &self.engine
    }

    /// The database, if the service was opened from a directory.
    pub fn database(&self) -> Option<&Database> {
        self.database.as_ref()
    }

    /// Point-in-time engine counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.engine.metrics_snapshot()
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        Ok(self.engine.flush()?)
    }

    fn with_retry<T>(
        &self,
        operation: &str,
        mut f: impl FnMut(&CatalogEngine) -> Result<T, coursecat_core::Error>,
    ) -> Result<T, Error> {
        let mut attempt = 0;
        loop {
            match f(&self.engine) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(operation, attempt, error = %e, "retrying after conflict");
                }
                Err(e) => {
                    debug!(operation, kind = %e.kind(), error = %e, "operation failed");
                    return Err(e.into());
                }
            }
        }
    }

    // Administrative operations

    /// Create a draft version of a catalog.
    pub fn create_draft_version(
        &self,
        catalog_id: CatalogId,
        new: NewVersion,
    ) -> Result<DraftOutcome, Error> {
        self.with_retry("create_draft_version", |engine| {
            engine.create_draft_version(catalog_id, new.clone())
        })
    }

    /// Submit a draft for approval.
    pub fn submit_for_approval(
        &self,
        version_id: VersionId,
        request: SubmitRequest,
    ) -> Result<Submission, Error> {
        self.with_retry("submit_for_approval", |engine| {
            engine.submit_for_approval(version_id, request.clone())
        })
    }

    /// Decide the active step of a workflow.
    pub fn advance_approval_step(
        &self,
        workflow_id: WorkflowId,
        step_order: u32,
        decision: StepDecision,
        comments: Option<String>,
    ) -> Result<ApprovalWorkflow, Error> {
        self.with_retry("advance_approval_step", |engine| {
            engine.advance_approval_step(workflow_id, step_order, decision, comments.clone())
        })
    }

    /// Fully compare two versions.
    pub fn compare_versions(
        &self,
        source: VersionId,
        target: VersionId,
    ) -> Result<VersionComparison, Error> {
        Ok(self.engine.compare_versions(source, target)?)
    }

    /// Compare two versions with an explicit type.
    pub fn compare(
        &self,
        source: VersionId,
        target: VersionId,
        comparison_type: ComparisonType,
        force_recompute: bool,
    ) -> Result<VersionComparison, Error> {
        Ok(self
            .engine
            .compare(source, target, comparison_type, force_recompute)?)
    }

    /// Get a catalog's current version.
    pub fn get_current_version(
        &self,
        catalog_id: CatalogId,
    ) -> Result<Option<VersionRecord>, Error> {
        Ok(self.engine.get_current_version(catalog_id)?)
    }

    /// Cancel an open workflow.
    pub fn cancel_workflow(
        &self,
        workflow_id: WorkflowId,
        authorized: bool,
        reason: Option<String>,
    ) -> Result<ApprovalWorkflow, Error> {
        self.with_retry("cancel_workflow", |engine| {
            engine.cancel_workflow(workflow_id, authorized, reason.clone())
        })
    }

    // Catalog management

    /// Create a catalog.
    pub fn create_catalog(&self, new: NewCatalog) -> Result<CatalogRecord, Error> {
        Ok(self.engine.create_catalog(new)?)
    }

    /// Clone a catalog with its current content.
    pub fn clone_catalog(&self, source: CatalogId, name: &str) -> Result<CatalogRecord, Error> {
        Ok(self.engine.clone_catalog(source, name)?)
    }

    /// Activate a catalog.
    pub fn activate_catalog(&self, catalog_id: CatalogId) -> Result<CatalogRecord, Error> {
        self.with_retry("activate_catalog", |engine| {
            engine.activate_catalog(catalog_id)
        })
    }

    /// Re-point a catalog's `based_on` reference.
    pub fn rebase_catalog(
        &self,
        catalog_id: CatalogId,
        based_on: Option<CatalogId>,
    ) -> Result<CatalogRecord, Error> {
        self.with_retry("rebase_catalog", |engine| {
            engine.rebase_catalog(catalog_id, based_on)
        })
    }

    /// Archive a catalog.
    pub fn archive_catalog(&self, catalog_id: CatalogId) -> Result<CatalogRecord, Error> {
        self.with_retry("archive_catalog", |engine| engine.archive_catalog(catalog_id))
    }

    /// Approve and promote a version without a workflow.
    pub fn promote_version(&self, version_id: VersionId) -> Result<VersionRecord, Error> {
        self.with_retry("promote_version", |engine| engine.promote_version(version_id))
    }

    /// Publish an approved version.
    pub fn publish_version(&self, version_id: VersionId) -> Result<VersionRecord, Error> {
        self.with_retry("publish_version", |engine| engine.publish_version(version_id))
    }

    // Queries

    /// Get a catalog.
    pub fn get_catalog(&self, catalog_id: CatalogId) -> Result<CatalogRecord, Error> {
        Ok(self.engine.get_catalog(catalog_id)?)
    }

    /// List catalogs.
    pub fn list_catalogs(&self) -> Result<Vec<CatalogRecord>, Error> {
        Ok(self.engine.list_catalogs()?)
    }

    /// Get a version.
    pub fn get_version(&self, version_id: VersionId) -> Result<VersionRecord, Error> {
        Ok(self.engine.get_version(version_id)?)
    }

    /// List a catalog's versions.
    pub fn list_versions(&self, catalog_id: CatalogId) -> Result<Vec<VersionRecord>, Error> {
        Ok(self.engine.list_versions(catalog_id)?)
    }

    /// Walk a version's predecessors.
    pub fn version_history(&self, version_id: VersionId) -> Result<Vec<VersionRecord>, Error> {
        Ok(self.engine.version_history(version_id)?)
    }

    /// Get a version's changes.
    pub fn get_changes(&self, version_id: VersionId) -> Result<ChangeSet, Error> {
        self.with_retry("get_changes", |engine| engine.get_changes(version_id))
    }

    /// Get a workflow.
    pub fn get_workflow(&self, workflow_id: WorkflowId) -> Result<ApprovalWorkflow, Error> {
        Ok(self.engine.get_workflow(workflow_id)?)
    }

    /// The most recent workflow of a version.
    pub fn workflow_for_version(
        &self,
        version_id: VersionId,
    ) -> Result<Option<ApprovalWorkflow>, Error> {
        Ok(self.engine.workflow_for_version(version_id)?)
    }

    /// Workflows of a catalog.
    pub fn list_workflows(&self, catalog_id: CatalogId) -> Result<Vec<ApprovalWorkflow>, Error> {
        Ok(self.engine.list_workflows(catalog_id)?)
    }

    /// Audit records of a catalog.
    pub fn approval_history(&self, catalog_id: CatalogId) -> Result<Vec<CatalogApproval>, Error> {
        Ok(self.engine.approval_history(catalog_id)?)
    }
}
