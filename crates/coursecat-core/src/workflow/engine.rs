//! Approval workflow engine.

use super::approval::CatalogApproval;
use super::state::{ApprovalWorkflow, Priority, StepDecision, StepTransition};
use super::template::WorkflowTemplate;
use crate::catalog::{
    ensure_follows_current, ApprovalStatus, CatalogId, CatalogVersionManager, VersionId,
    VersionRecord, WorkflowId,
};
use crate::changes::ChangeTracker;
use crate::collab::{Identity, NotificationEvent, Notifier};
use crate::error::Error;
use crate::metrics::{SharedMetrics, WorkflowOutcome};
use crate::snapshot::ImpactLevel;
use crate::store::{
    list_records, load_record, stage_record, Expect, RecordKind, RecordStore, Tracked, WriteBatch,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parameters for submitting a version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitRequest {
    /// Workflow display name. Defaults to the version label.
    pub name: Option<String>,
    /// Review priority. Defaults from the highest change impact.
    pub priority: Option<Priority>,
}

impl SubmitRequest {
    /// Create a request with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the workflow name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Result of submitting a version.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// No change needed review; the version is now current.
    Promoted(VersionRecord),
    /// A workflow was opened.
    InReview(ApprovalWorkflow),
}

impl Submission {
    /// The opened workflow, if any.
    pub fn workflow(&self) -> Option<&ApprovalWorkflow> {
        match self {
            Submission::InReview(workflow) => Some(workflow),
            Submission::Promoted(_) => None,
        }
    }
}

/// Opens, advances and cancels approval workflows.
///
/// Each call commits the workflow together with the version and catalog
/// writes it implies, so a decision and its promotion land atomically.
/// Notifications go out only after a successful commit.
pub struct ApprovalWorkflowEngine {
    store: Arc<dyn RecordStore>,
    manager: Arc<CatalogVersionManager>,
    tracker: Arc<ChangeTracker>,
    template: WorkflowTemplate,
    identity: Arc<dyn Identity>,
    notifier: Arc<dyn Notifier>,
    metrics: SharedMetrics,
}

impl ApprovalWorkflowEngine {
    /// Create an engine.
    pub fn new(
        store: Arc<dyn RecordStore>,
        manager: Arc<CatalogVersionManager>,
        tracker: Arc<ChangeTracker>,
        template: WorkflowTemplate,
        identity: Arc<dyn Identity>,
        notifier: Arc<dyn Notifier>,
        metrics: SharedMetrics,
    ) -> Result<Self, Error> {
        template.validate()?;
        Ok(Self {
            store,
            manager,
            tracker,
            template,
            identity,
            notifier,
            metrics,
        })
    }

    /// The workflow template.
    pub fn template(&self) -> &WorkflowTemplate {
        &self.template
    }

    /// Submit a Draft version.
    ///
    /// Promotes it directly when none of its changes need review, otherwise
    /// opens a workflow and moves the version to PendingApproval.
    pub fn submit(&self, version_id: VersionId, request: SubmitRequest) -> Result<Submission, Error> {
        let version = self.manager.load_version(version_id)?;
        if version.approval_status != ApprovalStatus::Draft {
            return Err(Error::InvalidVersionState {
                version_id,
                status: version.approval_status,
            });
        }
        let catalog = self.manager.load_catalog(version.catalog_id)?;
        if catalog.is_archived() {
            return Err(Error::InvalidCatalogState {
                catalog_id: catalog.id,
                reason: "catalog is archived".into(),
            });
        }
        if let Err(e) = ensure_follows_current(&catalog, &version) {
            warn!(version_id = %version_id, error = %e, "stale draft not submitted");
            return Err(e);
        }

        let changes = self.tracker.changes_for(version_id)?;
        if !changes.requires_approval() {
            debug!(version_id = %version_id, "no change needs review");
            let promoted = self.manager.approve_and_promote(version_id)?;
            return Ok(Submission::Promoted(promoted));
        }

        let priority = request.priority.unwrap_or(match changes.max_impact() {
            Some(ImpactLevel::High) => Priority::High,
            _ => Priority::Normal,
        });
        let name = request.name.unwrap_or_else(|| version.label.clone());

        let id = WorkflowId(self.store.allocate_id(RecordKind::Workflow)?);
        let mut workflow = ApprovalWorkflow::new(
            id,
            version.catalog_id,
            Some(version_id),
            name,
            self.identity.current_actor(),
            priority,
            self.template.instantiate(),
        );
        workflow.start()?;

        let mut batch = WriteBatch::new();
        stage_record(&mut batch, &workflow, Expect::Absent)?;

        let version_revision = version.revision;
        let mut version = version.into_inner();
        version.approval_status = ApprovalStatus::PendingApproval;
        stage_record(&mut batch, &version, Expect::Revision(version_revision))?;

        // Serializes against a concurrent archive of the catalog
        let catalog_revision = catalog.revision;
        let mut catalog = catalog.into_inner();
        catalog.touch();
        stage_record(&mut batch, &catalog, Expect::Revision(catalog_revision))?;

        self.manager.commit(batch)?;
        self.metrics.record_workflow_opened();
        info!(
            workflow_id = %id,
            catalog_id = %workflow.catalog_id,
            version_id = %version_id,
            priority = %priority,
            "workflow opened"
        );

        if let Some(step) = workflow.active_step() {
            self.notifier.notify(
                &step.assignee,
                &NotificationEvent::ReviewRequested {
                    workflow_id: id,
                    catalog_id: workflow.catalog_id,
                    version_id: workflow.version_id,
                    stage: step.stage,
                    step_order: step.step_order,
                },
            );
        }
        Ok(Submission::InReview(workflow))
    }

    /// Decide the active step of a workflow.
    pub fn advance_step(
        &self,
        workflow_id: WorkflowId,
        step_order: u32,
        decision: StepDecision,
        comments: Option<String>,
    ) -> Result<ApprovalWorkflow, Error> {
        let tracked = self.load_workflow(workflow_id)?;
        let revision = tracked.revision;
        let mut workflow = tracked.into_inner();

        let actor = self.identity.current_actor();
        let transition = match workflow.decide(step_order, decision, actor.clone(), comments) {
            Ok(transition) => transition,
            Err(e) => {
                warn!(workflow_id = %workflow_id, step_order, error = %e, "decision refused");
                return Err(e);
            }
        };

        let mut batch = WriteBatch::new();
        stage_record(&mut batch, &workflow, Expect::Revision(revision))?;

        match transition {
            StepTransition::Advanced {
                stage,
                step_order: next_order,
                assignee,
            } => {
                self.manager.commit(batch)?;
                self.metrics.record_step_decision();
                debug!(workflow_id = %workflow_id, stage = %stage, "workflow advanced");

                self.notifier.notify(
                    &assignee,
                    &NotificationEvent::ReviewRequested {
                        workflow_id,
                        catalog_id: workflow.catalog_id,
                        version_id: workflow.version_id,
                        stage,
                        step_order: next_order,
                    },
                );
            }
            StepTransition::Approved => {
                let promoted = match workflow.version_id {
                    Some(version_id) => {
                        let mut version = self.manager.load_version(version_id)?;
                        version.record.approval_status = ApprovalStatus::Approved;
                        let catalog = self.manager.load_catalog(workflow.catalog_id)?;
                        Some(self.manager.stage_promotion(&mut batch, catalog, version)?)
                    }
                    None => None,
                };
                self.stage_audit(&mut batch, &workflow)?;
                self.manager.commit(batch)?;

                self.metrics.record_step_decision();
                self.metrics.record_workflow_closed(WorkflowOutcome::Approved);
                if let Some(version) = &promoted {
                    self.manager.promoted(version);
                }
                info!(workflow_id = %workflow_id, "workflow approved");

                self.notifier.notify(
                    &workflow.initiator,
                    &NotificationEvent::WorkflowApproved {
                        workflow_id,
                        catalog_id: workflow.catalog_id,
                        version_id: workflow.version_id,
                    },
                );
            }
            StepTransition::Rejected { stage } => {
                if let Some(version_id) = workflow.version_id {
                    self.stage_version_status(&mut batch, version_id, ApprovalStatus::Rejected)?;
                }
                self.stage_audit(&mut batch, &workflow)?;
                self.manager.commit(batch)?;

                self.metrics.record_step_decision();
                self.metrics.record_workflow_closed(WorkflowOutcome::Rejected);
                info!(workflow_id = %workflow_id, stage = %stage, "workflow rejected");

                self.notifier.notify(
                    &workflow.initiator,
                    &NotificationEvent::WorkflowRejected {
                        workflow_id,
                        catalog_id: workflow.catalog_id,
                        version_id: workflow.version_id,
                        stage,
                        rejected_by: actor,
                    },
                );
            }
        }

        Ok(workflow)
    }

    /// Cancel an open workflow.
    ///
    /// `authorized` is the caller's verdict on whether the current actor may
    /// cancel. The version goes back to Draft.
    pub fn cancel(
        &self,
        workflow_id: WorkflowId,
        authorized: bool,
        reason: Option<String>,
    ) -> Result<ApprovalWorkflow, Error> {
        let actor = self.identity.current_actor();
        if !authorized {
            warn!(workflow_id = %workflow_id, actor = %actor, "cancel refused");
            return Err(Error::Unauthorized {
                operation: format!("cancel workflow {workflow_id}"),
            });
        }

        let tracked = self.load_workflow(workflow_id)?;
        let revision = tracked.revision;
        let mut workflow = tracked.into_inner();
        let stage = workflow
            .current_stage
            .or_else(|| workflow.steps.first().map(|s| s.stage));
        workflow.cancel()?;

        let mut batch = WriteBatch::new();
        stage_record(&mut batch, &workflow, Expect::Revision(revision))?;
        if let Some(version_id) = workflow.version_id {
            self.stage_version_status(&mut batch, version_id, ApprovalStatus::Draft)?;
        }
        if let Some(stage) = stage {
            let id = self.store.allocate_id(RecordKind::Approval)?;
            let record =
                CatalogApproval::cancellation(id, &workflow, stage, actor.clone(), reason.clone());
            stage_record(&mut batch, &record, Expect::Absent)?;
        }
        self.manager.commit(batch)?;

        self.metrics.record_workflow_closed(WorkflowOutcome::Cancelled);
        info!(workflow_id = %workflow_id, cancelled_by = %actor, "workflow cancelled");

        self.notifier.notify(
            &workflow.initiator,
            &NotificationEvent::WorkflowCancelled {
                workflow_id,
                catalog_id: workflow.catalog_id,
                version_id: workflow.version_id,
                cancelled_by: actor,
                reason: reason.unwrap_or_default(),
            },
        );
        Ok(workflow)
    }

    /// Get a workflow.
    pub fn get_workflow(&self, workflow_id: WorkflowId) -> Result<ApprovalWorkflow, Error> {
        Ok(self.load_workflow(workflow_id)?.into_inner())
    }

    /// The most recent workflow opened for a version.
    pub fn workflow_for_version(
        &self,
        version_id: VersionId,
    ) -> Result<Option<ApprovalWorkflow>, Error> {
        Ok(list_records::<ApprovalWorkflow>(self.store.as_ref())?
            .into_iter()
            .map(Tracked::into_inner)
            .filter(|w| w.version_id == Some(version_id))
            .max_by_key(|w| w.id))
    }

    /// Workflows of a catalog, oldest first.
    pub fn list_workflows(&self, catalog_id: CatalogId) -> Result<Vec<ApprovalWorkflow>, Error> {
        Ok(list_records::<ApprovalWorkflow>(self.store.as_ref())?
            .into_iter()
            .map(Tracked::into_inner)
            .filter(|w| w.catalog_id == catalog_id)
            .collect())
    }

    /// Audit records of a catalog, oldest first.
    pub fn approval_history(&self, catalog_id: CatalogId) -> Result<Vec<CatalogApproval>, Error> {
        Ok(list_records::<CatalogApproval>(self.store.as_ref())?
            .into_iter()
            .map(Tracked::into_inner)
            .filter(|a| a.catalog_id == catalog_id)
            .collect())
    }

    fn load_workflow(&self, workflow_id: WorkflowId) -> Result<Tracked<ApprovalWorkflow>, Error> {
        load_record(self.store.as_ref(), workflow_id.0)?
            .ok_or(Error::WorkflowNotFound(workflow_id))
    }

    fn stage_version_status(
        &self,
        batch: &mut WriteBatch,
        version_id: VersionId,
        status: ApprovalStatus,
    ) -> Result<(), Error> {
        let tracked = self.manager.load_version(version_id)?;
        let revision = tracked.revision;
        let mut version = tracked.into_inner();
        version.approval_status = status;
        stage_record(batch, &version, Expect::Revision(revision))
    }

    fn stage_audit(&self, batch: &mut WriteBatch, workflow: &ApprovalWorkflow) -> Result<(), Error> {
        let records = CatalogApproval::for_decided_steps(workflow, || {
            Ok(self.store.allocate_id(RecordKind::Approval)?)
        })?;
        for record in &records {
            stage_record(batch, record, Expect::Absent)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ActorId, NewCatalog, NewVersion};
    use crate::collab::{MemoryNotifier, StaticIdentity};
    use crate::metrics::new_shared_metrics;
    use crate::snapshot::{ContentValue, DiffPolicy};
    use crate::store::MemoryStore;
    use crate::workflow::{ApprovalOutcome, ApprovalStage, StepStatus, WorkflowStatus};
    use serde_json::json;

    struct Fixture {
        manager: Arc<CatalogVersionManager>,
        engine: ApprovalWorkflowEngine,
        notifier: MemoryNotifier,
        catalog_id: CatalogId,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let identity: Arc<dyn Identity> = Arc::new(StaticIdentity::new("editor"));
        let metrics = new_shared_metrics();
        let manager = Arc::new(CatalogVersionManager::new(
            store.clone(),
            identity.clone(),
            metrics.clone(),
            8,
        ));
        let tracker = Arc::new(ChangeTracker::new(
            store.clone(),
            Arc::new(DiffPolicy::course_catalog()),
        ));
        let notifier = MemoryNotifier::new();
        let engine = ApprovalWorkflowEngine::new(
            store,
            manager.clone(),
            tracker,
            WorkflowTemplate::default(),
            identity,
            Arc::new(notifier.clone()),
            metrics,
        )
        .unwrap();

        let catalog = manager
            .create_catalog(NewCatalog::new("2025 Fall", "undergraduate"))
            .unwrap();
        Fixture {
            manager,
            engine,
            notifier,
            catalog_id: catalog.id,
        }
    }

    fn content(credits: i64, description: &str) -> ContentValue {
        ContentValue::from(json!({
            "title": "2025 Fall",
            "courses": [{"code": "CS101", "credits": credits, "description": description}]
        }))
    }

    fn draft(f: &Fixture, credits: i64, description: &str) -> VersionId {
        f.manager
            .create_version(f.catalog_id, NewVersion::new("draft", content(credits, description)))
            .unwrap()
            .id
    }

    fn in_review(f: &Fixture) -> (VersionId, ApprovalWorkflow) {
        let v1 = draft(f, 3, "Intro");
        f.engine.submit(v1, SubmitRequest::new()).unwrap();
        let v2 = draft(f, 4, "Intro");
        match f.engine.submit(v2, SubmitRequest::new()).unwrap() {
            Submission::InReview(workflow) => (v2, workflow),
            Submission::Promoted(_) => panic!("credit change should need review"),
        }
    }

    #[test]
    fn test_low_impact_submission_promotes() {
        let f = fixture();
        let v1 = draft(&f, 3, "Intro");
        assert!(matches!(
            f.engine.submit(v1, SubmitRequest::new()).unwrap(),
            Submission::Promoted(_)
        ));

        let v2 = draft(&f, 3, "Introduction");
        let submission = f.engine.submit(v2, SubmitRequest::new()).unwrap();
        assert!(submission.workflow().is_none());
        assert_eq!(f.manager.current_version(f.catalog_id).unwrap().unwrap().id, v2);
        assert!(f.notifier.is_empty());
    }

    #[test]
    fn test_high_impact_submission_opens_workflow() {
        let f = fixture();
        let (v2, workflow) = in_review(&f);

        assert_eq!(workflow.status, WorkflowStatus::InProgress);
        assert_eq!(workflow.current_stage, Some(ApprovalStage::DepartmentReview));
        assert_eq!(workflow.steps.len(), 3);
        assert_eq!(workflow.priority, Priority::High);
        assert_eq!(
            f.manager.get_version(v2).unwrap().approval_status,
            ApprovalStatus::PendingApproval
        );

        let events = f.notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, ActorId::from("department-chair"));
        assert_eq!(events[0].1.kind(), "review_requested");
    }

    #[test]
    fn test_resubmitting_pending_version_fails() {
        let f = fixture();
        let (v2, _) = in_review(&f);
        let err = f.engine.submit(v2, SubmitRequest::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidVersionState { .. }));
    }

    #[test]
    fn test_out_of_order_decision() {
        let f = fixture();
        let (_, workflow) = in_review(&f);

        let err = f
            .engine
            .advance_step(workflow.id, 2, StepDecision::Reject, None)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::StepNotActive {
                step_order: 2,
                active: Some(1),
                ..
            }
        ));
    }

    #[test]
    fn test_full_approval_promotes() {
        let f = fixture();
        let (v2, workflow) = in_review(&f);

        for order in 1..=3 {
            f.engine
                .advance_step(workflow.id, order, StepDecision::Approve, None)
                .unwrap();
        }

        let workflow = f.engine.get_workflow(workflow.id).unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Approved);
        let current = f.manager.current_version(f.catalog_id).unwrap().unwrap();
        assert_eq!(current.id, v2);
        assert_eq!(current.approval_status, ApprovalStatus::Approved);

        let history = f.engine.approval_history(f.catalog_id).unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|a| a.outcome == ApprovalOutcome::Approved));
        assert_eq!(f.notifier.kinds().last(), Some(&"workflow_approved"));
    }

    #[test]
    fn test_rejection_skips_remaining_steps() {
        let f = fixture();
        let (v2, workflow) = in_review(&f);
        let current_before = f.manager.current_version(f.catalog_id).unwrap().unwrap().id;

        f.engine
            .advance_step(workflow.id, 1, StepDecision::Approve, None)
            .unwrap();
        let workflow = f
            .engine
            .advance_step(workflow.id, 2, StepDecision::Reject, Some("credits".into()))
            .unwrap();

        assert_eq!(workflow.status, WorkflowStatus::Rejected);
        assert_eq!(workflow.steps[2].status, StepStatus::Skipped);
        assert_eq!(
            f.manager.get_version(v2).unwrap().approval_status,
            ApprovalStatus::Rejected
        );
        assert_eq!(
            f.manager.current_version(f.catalog_id).unwrap().unwrap().id,
            current_before
        );

        let err = f
            .engine
            .advance_step(workflow.id, 3, StepDecision::Approve, None)
            .unwrap_err();
        assert!(matches!(err, Error::WorkflowClosed { .. }));
    }

    #[test]
    fn test_cancel_requires_authorization() {
        let f = fixture();
        let (v2, workflow) = in_review(&f);

        let err = f.engine.cancel(workflow.id, false, None).unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }));

        let cancelled = f
            .engine
            .cancel(workflow.id, true, Some("withdrawn".into()))
            .unwrap();
        assert_eq!(cancelled.status, WorkflowStatus::Cancelled);
        assert!(cancelled
            .steps
            .iter()
            .all(|s| s.status == StepStatus::Skipped));
        assert_eq!(
            f.manager.get_version(v2).unwrap().approval_status,
            ApprovalStatus::Draft
        );

        let history = f.engine.approval_history(f.catalog_id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, ApprovalOutcome::Cancelled);
        assert_eq!(history[0].comments.as_deref(), Some("withdrawn"));
    }

    #[test]
    fn test_archive_refused_while_open() {
        let f = fixture();
        let (_, workflow) = in_review(&f);

        assert!(matches!(
            f.manager.archive(f.catalog_id).unwrap_err(),
            Error::InvalidCatalogState { .. }
        ));
        f.engine.cancel(workflow.id, true, None).unwrap();
        f.manager.archive(f.catalog_id).unwrap();
    }

    #[test]
    fn test_workflow_queries() {
        let f = fixture();
        let (v2, workflow) = in_review(&f);

        assert_eq!(
            f.engine.workflow_for_version(v2).unwrap().map(|w| w.id),
            Some(workflow.id)
        );
        assert_eq!(f.engine.list_workflows(f.catalog_id).unwrap().len(), 1);
        assert!(matches!(
            f.engine.get_workflow(WorkflowId(999)).unwrap_err(),
            Error::WorkflowNotFound(_)
        ));
    }
}
