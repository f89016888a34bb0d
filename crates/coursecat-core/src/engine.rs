//! Catalog engine.
//!
//! Wires the version manager, change tracker, comparator and workflow engine
//! over one record store, and exposes the administrative operations.

use crate::catalog::{
    CatalogId, CatalogRecord, CatalogVersionManager, NewCatalog, NewVersion, VersionId,
    VersionRecord, WorkflowId,
};
use crate::changes::{ChangeSet, ChangeSummary, ChangeTracker};
use crate::collab::{Identity, Notifier};
use crate::compare::{ComparisonType, VersionComparator, VersionComparison};
use crate::config::EngineConfig;
use crate::error::Error;
use crate::metrics::{new_shared_metrics, MetricsSnapshot, SharedMetrics};
use crate::store::{RecordKind, RecordStore};
use crate::workflow::{
    ApprovalWorkflow, ApprovalWorkflowEngine, CatalogApproval, StepDecision, SubmitRequest,
    Submission,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of creating a draft version.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftOutcome {
    /// The version as stored after creation, and promotion if it happened.
    pub version: VersionRecord,
    /// Changes against the previous current version.
    pub changes: ChangeSet,
    /// Counts over `changes`.
    pub summary: ChangeSummary,
    /// Whether the version was approved and promoted on creation.
    pub promoted: bool,
}

/// The catalog versioning and approval engine.
pub struct CatalogEngine {
    store: Arc<dyn RecordStore>,
    config: EngineConfig,
    manager: Arc<CatalogVersionManager>,
    tracker: Arc<ChangeTracker>,
    comparator: VersionComparator,
    workflows: ApprovalWorkflowEngine,
    metrics: SharedMetrics,
}

impl CatalogEngine {
    /// Create an engine over `store`.
    pub fn new(
        store: Arc<dyn RecordStore>,
        config: EngineConfig,
        identity: Arc<dyn Identity>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, Error> {
        config.validate()?;

        let metrics = new_shared_metrics();
        let policy = Arc::new(config.diff_policy.clone());
        let manager = Arc::new(CatalogVersionManager::new(
            store.clone(),
            identity.clone(),
            metrics.clone(),
            config.max_lineage_depth,
        ));
        let tracker = Arc::new(ChangeTracker::new(store.clone(), policy.clone()));
        let comparator = VersionComparator::new(
            store.clone(),
            policy,
            identity.clone(),
            metrics.clone(),
            config.comparison_cache_capacity,
        );
        let workflows = ApprovalWorkflowEngine::new(
            store.clone(),
            manager.clone(),
            tracker.clone(),
            config.workflow_template.clone(),
            identity,
            notifier,
            metrics.clone(),
        )?;

        debug!(
            auto_promote = config.auto_promote_low_impact,
            cache_capacity = config.comparison_cache_capacity,
            "catalog engine ready"
        );

        Ok(Self {
            store,
            config,
            manager,
            tracker,
            comparator,
            workflows,
            metrics,
        })
    }

    // Administrative operations

    /// Create a Draft version and record its changes in one commit.
    ///
    /// When auto-promotion is on and no change needs review, the version is
    /// approved and promoted right away.
    pub fn create_draft_version(
        &self,
        catalog_id: CatalogId,
        new: NewVersion,
    ) -> Result<DraftOutcome, Error> {
        let (version, mut batch) = self.manager.prepare_version(catalog_id, new)?;
        let previous = version
            .previous_version
            .map(|id| self.manager.get_version(id))
            .transpose()?;
        let changes = self.tracker.compute(previous.as_ref(), &version)?;
        ChangeTracker::stage(&mut batch, &changes)?;
        self.manager.commit(batch)?;
        self.manager.version_created(&version);

        let summary = changes.summary();
        let (version, promoted) =
            if self.config.auto_promote_low_impact && !summary.requires_approval() {
                match self.promote_draft(version.id)? {
                    Some(promoted) => (promoted, true),
                    None => (self.manager.get_version(version.id)?, false),
                }
            } else {
                (version, false)
            };

        Ok(DraftOutcome {
            version,
            changes,
            summary,
            promoted,
        })
    }

    /// Approve and promote a just-created draft.
    ///
    /// The draft is already committed, so conflicts are retried here rather
    /// than by the caller. Returns `None` if every attempt conflicted or
    /// another version was promoted first; the draft stays in Draft.
    fn promote_draft(&self, version_id: VersionId) -> Result<Option<VersionRecord>, Error> {
        for attempt in 0..=self.config.max_retries {
            match self.manager.approve_and_promote(version_id) {
                Ok(version) => return Ok(Some(version)),
                Err(e) if e.is_retryable() => {
                    warn!(version_id = %version_id, attempt, "promotion conflicted, retrying");
                }
                Err(Error::InvalidLineage { reason }) => {
                    warn!(version_id = %version_id, %reason, "draft overtaken, left in draft");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Submit a Draft version for approval.
    pub fn submit_for_approval(
        &self,
        version_id: VersionId,
        request: SubmitRequest,
    ) -> Result<Submission, Error> {
        self.workflows.submit(version_id, request)
    }

    /// Decide the active step of a workflow.
    pub fn advance_approval_step(
        &self,
        workflow_id: WorkflowId,
        step_order: u32,
        decision: StepDecision,
        comments: Option<String>,
    ) -> Result<ApprovalWorkflow, Error> {
        self.workflows
            .advance_step(workflow_id, step_order, decision, comments)
    }

    /// Fully compare two versions.
    pub fn compare_versions(
        &self,
        source: VersionId,
        target: VersionId,
    ) -> Result<VersionComparison, Error> {
        self.comparator
            .compare(source, target, ComparisonType::Full, false)
    }

    /// Compare two versions with an explicit type, optionally bypassing the
    /// cache.
    pub fn compare(
        &self,
        source: VersionId,
        target: VersionId,
        comparison_type: ComparisonType,
        force_recompute: bool,
    ) -> Result<VersionComparison, Error> {
        self.comparator
            .compare(source, target, comparison_type, force_recompute)
    }

    /// Get a catalog's current version.
    pub fn get_current_version(
        &self,
        catalog_id: CatalogId,
    ) -> Result<Option<VersionRecord>, Error> {
        self.manager.current_version(catalog_id)
    }

    /// Cancel an open workflow.
    pub fn cancel_workflow(
        &self,
        workflow_id: WorkflowId,
        authorized: bool,
        reason: Option<String>,
    ) -> Result<ApprovalWorkflow, Error> {
        self.workflows.cancel(workflow_id, authorized, reason)
    }

    // Catalogs

    /// Create a catalog.
    pub fn create_catalog(&self, new: NewCatalog) -> Result<CatalogRecord, Error> {
        self.manager.create_catalog(new)
    }

    /// Create a catalog based on `source` and seed its first version from
    /// the source's current content.
    ///
    /// The seed is a bootstrap version and is promoted immediately. A source
    /// without a current version yields an empty clone. If the seed cannot be
    /// promoted the clone is kept with its seed in Draft and
    /// `ConcurrentModification` names the new catalog.
    pub fn clone_catalog(
        &self,
        source: CatalogId,
        name: impl Into<String>,
    ) -> Result<CatalogRecord, Error> {
        let original = self.manager.get_catalog(source)?;
        let current = self.manager.current_version(source)?;

        let catalog = self.manager.create_catalog(
            NewCatalog::new(name, original.catalog_type.clone())
                .with_window(original.effective_at, original.expires_at)
                .with_based_on(source),
        )?;

        let Some(current) = current else {
            return Ok(catalog);
        };

        let seed = NewVersion::new(
            format!("cloned from {} v{}", original.name, current.number),
            current.content()?,
        );
        let (version, mut batch) = self.manager.prepare_version(catalog.id, seed)?;
        let changes = self.tracker.compute(None, &version)?;
        ChangeTracker::stage(&mut batch, &changes)?;
        self.manager.commit(batch)?;
        self.manager.version_created(&version);
        if self.promote_draft(version.id)?.is_none() {
            warn!(catalog_id = %catalog.id, version_id = %version.id, "clone seed not promoted");
            return Err(Error::ConcurrentModification {
                kind: RecordKind::Catalog,
                id: catalog.id.get(),
            });
        }

        info!(source = %source, catalog_id = %catalog.id, "catalog cloned");
        self.manager.get_catalog(catalog.id)
    }

    /// Get a catalog.
    pub fn get_catalog(&self, catalog_id: CatalogId) -> Result<CatalogRecord, Error> {
        self.manager.get_catalog(catalog_id)
    }

    /// List catalogs.
    pub fn list_catalogs(&self) -> Result<Vec<CatalogRecord>, Error> {
        self.manager.list_catalogs()
    }

    /// Activate a Draft catalog.
    pub fn activate_catalog(&self, catalog_id: CatalogId) -> Result<CatalogRecord, Error> {
        self.manager.activate(catalog_id)
    }

    /// Re-point a catalog's `based_on` reference.
    pub fn rebase_catalog(
        &self,
        catalog_id: CatalogId,
        based_on: Option<CatalogId>,
    ) -> Result<CatalogRecord, Error> {
        self.manager.rebase(catalog_id, based_on)
    }

    /// Archive a catalog.
    pub fn archive_catalog(&self, catalog_id: CatalogId) -> Result<CatalogRecord, Error> {
        self.manager.archive(catalog_id)
    }

    // Versions

    /// Get a version.
    pub fn get_version(&self, version_id: VersionId) -> Result<VersionRecord, Error> {
        self.manager.get_version(version_id)
    }

    /// List a catalog's versions.
    pub fn list_versions(&self, catalog_id: CatalogId) -> Result<Vec<VersionRecord>, Error> {
        self.manager.list_versions(catalog_id)
    }

    /// Walk a version's predecessors.
    pub fn version_history(&self, version_id: VersionId) -> Result<Vec<VersionRecord>, Error> {
        self.manager.version_history(version_id)
    }

    /// Promote an Approved version.
    pub fn promote_version(&self, version_id: VersionId) -> Result<VersionRecord, Error> {
        self.manager.promote(version_id)
    }

    /// Publish an Approved version.
    pub fn publish_version(&self, version_id: VersionId) -> Result<VersionRecord, Error> {
        self.manager.publish(version_id)
    }

    /// Get a version's recorded changes.
    pub fn get_changes(&self, version_id: VersionId) -> Result<ChangeSet, Error> {
        self.tracker.changes_for(version_id)
    }

    // Workflows

    /// Get a workflow.
    pub fn get_workflow(&self, workflow_id: WorkflowId) -> Result<ApprovalWorkflow, Error> {
        self.workflows.get_workflow(workflow_id)
    }

    /// The most recent workflow of a version.
    pub fn workflow_for_version(
        &self,
        version_id: VersionId,
    ) -> Result<Option<ApprovalWorkflow>, Error> {
        self.workflows.workflow_for_version(version_id)
    }

    /// Workflows of a catalog.
    pub fn list_workflows(&self, catalog_id: CatalogId) -> Result<Vec<ApprovalWorkflow>, Error> {
        self.workflows.list_workflows(catalog_id)
    }

    /// Audit records of a catalog.
    pub fn approval_history(&self, catalog_id: CatalogId) -> Result<Vec<CatalogApproval>, Error> {
        self.workflows.approval_history(catalog_id)
    }

    // Accessors

    /// The configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The record store.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// The version manager.
    pub fn manager(&self) -> &CatalogVersionManager {
        &self.manager
    }

    /// The comparator.
    pub fn comparator(&self) -> &VersionComparator {
        &self.comparator
    }

    /// Shared counters.
    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Point-in-time copy of the counters.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Flush the store to durable storage.
    pub fn flush(&self) -> Result<(), Error> {
        Ok(self.store.flush()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{NoopNotifier, StaticIdentity};
    use crate::snapshot::{ContentValue, ImpactLevel};
    use crate::store::{MemoryStore, StoreError, StoredRecord, WriteBatch};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn engine(config: EngineConfig) -> CatalogEngine {
        CatalogEngine::new(
            Arc::new(MemoryStore::new()),
            config,
            Arc::new(StaticIdentity::new("editor")),
            Arc::new(NoopNotifier),
        )
        .unwrap()
    }

    fn content(json: serde_json::Value) -> NewVersion {
        NewVersion::new("draft", ContentValue::from(json))
    }

    #[test]
    fn test_first_draft_promotes() {
        let engine = engine(EngineConfig::default());
        let catalog = engine.create_catalog(NewCatalog::new("2025 Fall", "ug")).unwrap();

        let outcome = engine
            .create_draft_version(catalog.id, content(json!({"title": "Fall"})))
            .unwrap();

        assert!(outcome.promoted);
        assert!(outcome.version.is_current);
        assert_eq!(outcome.summary.added, 1);
        assert_eq!(outcome.changes.max_impact(), Some(ImpactLevel::Low));
        assert_eq!(
            engine.get_current_version(catalog.id).unwrap().map(|v| v.id),
            Some(outcome.version.id)
        );
    }

    #[test]
    fn test_auto_promote_disabled() {
        let engine = engine(EngineConfig::default().with_auto_promote(false));
        let catalog = engine.create_catalog(NewCatalog::new("2025 Fall", "ug")).unwrap();

        let outcome = engine
            .create_draft_version(catalog.id, content(json!({"title": "Fall"})))
            .unwrap();

        assert!(!outcome.promoted);
        assert!(engine.get_current_version(catalog.id).unwrap().is_none());
        assert!(matches!(
            engine
                .submit_for_approval(outcome.version.id, SubmitRequest::new())
                .unwrap(),
            Submission::Promoted(_)
        ));
    }

    #[test]
    fn test_changes_stored_with_draft() {
        let engine = engine(EngineConfig::default());
        let catalog = engine.create_catalog(NewCatalog::new("2025 Fall", "ug")).unwrap();
        engine
            .create_draft_version(catalog.id, content(json!({"courses": [{"code": "CS101", "credits": 3}]})))
            .unwrap();
        let draft = engine
            .create_draft_version(catalog.id, content(json!({"courses": [{"code": "CS101", "credits": 4}]})))
            .unwrap();

        assert!(!draft.promoted);
        assert!(draft.summary.requires_approval());
        assert_eq!(engine.get_changes(draft.version.id).unwrap(), draft.changes);
    }

    #[test]
    fn test_clone_catalog_seeds_current_content() {
        let engine = engine(EngineConfig::default());
        let source = engine.create_catalog(NewCatalog::new("2025 Fall", "ug")).unwrap();
        let seeded = engine
            .create_draft_version(source.id, content(json!({"title": "Fall", "courses": []})))
            .unwrap();

        let clone = engine.clone_catalog(source.id, "2026 Fall").unwrap();

        assert_eq!(clone.based_on, Some(source.id));
        assert_eq!(clone.version_count, 1);
        let current = engine.get_current_version(clone.id).unwrap().unwrap();
        assert_eq!(current.content().unwrap(), seeded.version.content().unwrap());
        assert!(current.previous_version.is_none());
    }

    #[test]
    fn test_clone_without_current_version() {
        let engine = engine(EngineConfig::default());
        let source = engine.create_catalog(NewCatalog::new("Empty", "ug")).unwrap();
        let clone = engine.clone_catalog(source.id, "Copy").unwrap();
        assert_eq!(clone.version_count, 0);
        assert!(clone.current_version.is_none());
    }

    /// Store whose commits conflict once `allowed` of them have succeeded.
    struct ConflictAfter {
        inner: MemoryStore,
        allowed: AtomicU32,
    }

    impl RecordStore for ConflictAfter {
        fn load(&self, kind: RecordKind, id: u64) -> Result<Option<StoredRecord>, StoreError> {
            self.inner.load(kind, id)
        }

        fn list(&self, kind: RecordKind) -> Result<Vec<StoredRecord>, StoreError> {
            self.inner.list(kind)
        }

        fn allocate_id(&self, kind: RecordKind) -> Result<u64, StoreError> {
            self.inner.allocate_id(kind)
        }

        fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
            let allowed = self.allowed.load(Ordering::SeqCst);
            if allowed == 0 {
                let first = &batch.writes()[0];
                return Err(StoreError::Conflict {
                    kind: first.kind,
                    id: first.id,
                });
            }
            self.allowed.store(allowed - 1, Ordering::SeqCst);
            self.inner.commit(batch)
        }
    }

    #[test]
    fn test_clone_reports_unpromoted_seed() {
        let store = Arc::new(ConflictAfter {
            inner: MemoryStore::new(),
            allowed: AtomicU32::new(u32::MAX),
        });
        let engine = CatalogEngine::new(
            store.clone(),
            EngineConfig::default(),
            Arc::new(StaticIdentity::new("editor")),
            Arc::new(NoopNotifier),
        )
        .unwrap();
        let source = engine.create_catalog(NewCatalog::new("2025 Fall", "ug")).unwrap();
        engine
            .create_draft_version(source.id, content(json!({"title": "Fall"})))
            .unwrap();

        // Catalog creation and the seed draft land, every promotion conflicts
        store.allowed.store(2, Ordering::SeqCst);
        let err = engine.clone_catalog(source.id, "2026 Fall").unwrap_err();

        let Error::ConcurrentModification { kind, id } = err else {
            panic!("expected a conflict, got {err}");
        };
        assert_eq!(kind, RecordKind::Catalog);
        let clone = engine.get_catalog(CatalogId(id)).unwrap();
        assert_eq!(clone.based_on, Some(source.id));
        assert!(clone.current_version.is_none());
        let seed = &engine.list_versions(clone.id).unwrap()[0];
        assert_eq!(seed.approval_status, crate::catalog::ApprovalStatus::Draft);
        assert!(!seed.is_current);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = CatalogEngine::new(
            Arc::new(MemoryStore::new()),
            EngineConfig::default().with_max_lineage_depth(0),
            Arc::new(StaticIdentity::new("editor")),
            Arc::new(NoopNotifier),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
