//! End-to-end approval scenarios over a single catalog.

use coursecat_core::{
    ApprovalStage, ApprovalStatus, CatalogEngine, CatalogId, ContentValue, EngineConfig, Error,
    ImpactLevel, MemoryNotifier, MemoryStore, NewCatalog, NewVersion, StaticIdentity,
    StepDecision, StepStatus, SubmitRequest, Submission, VersionId, WorkflowStatus,
};
use serde_json::json;
use std::sync::Arc;

struct TestContext {
    engine: CatalogEngine,
    notifier: MemoryNotifier,
    catalog_id: CatalogId,
    versions: Vec<VersionId>,
}

fn fall_catalog(credits: i64, description: &str) -> ContentValue {
    ContentValue::from(json!({
        "title": "2025 Fall",
        "courses": [
            {
                "code": "CS101",
                "title": "Intro to Programming",
                "credits": credits,
                "description": description,
                "sections": [{"section_id": "001", "capacity": 30, "room": "B12"}]
            },
            {"code": "MA201", "title": "Linear Algebra", "credits": 4, "description": "Vectors"}
        ]
    }))
}

/// Catalog "2025 Fall" whose current version is its third.
fn setup() -> TestContext {
    let notifier = MemoryNotifier::new();
    let engine = CatalogEngine::new(
        Arc::new(MemoryStore::new()),
        EngineConfig::default(),
        Arc::new(StaticIdentity::new("editor")),
        Arc::new(notifier.clone()),
    )
    .unwrap();

    let catalog = engine
        .create_catalog(NewCatalog::new("2025 Fall", "undergraduate"))
        .unwrap();
    let mut versions = Vec::new();
    for description in ["Basics", "Programming basics", "Programming fundamentals"] {
        let outcome = engine
            .create_draft_version(
                catalog.id,
                NewVersion::new(description, fall_catalog(3, description)),
            )
            .unwrap();
        assert!(outcome.promoted);
        versions.push(outcome.version.id);
    }

    TestContext {
        engine,
        notifier,
        catalog_id: catalog.id,
        versions,
    }
}

/// Adds version 4 (description only) and version 5 (credit change, submitted).
fn setup_in_review() -> (TestContext, VersionId, VersionId, coursecat_core::WorkflowId) {
    let mut ctx = setup();
    let v4 = ctx
        .engine
        .create_draft_version(
            ctx.catalog_id,
            NewVersion::new("v4", fall_catalog(3, "Programming for everyone")),
        )
        .unwrap()
        .version
        .id;
    ctx.versions.push(v4);

    let v5 = ctx
        .engine
        .create_draft_version(
            ctx.catalog_id,
            NewVersion::new("v5", fall_catalog(4, "Programming for everyone")),
        )
        .unwrap()
        .version
        .id;
    ctx.versions.push(v5);

    let workflow = match ctx
        .engine
        .submit_for_approval(v5, SubmitRequest::new().with_name("CS101 credits"))
        .unwrap()
    {
        Submission::InReview(workflow) => workflow,
        Submission::Promoted(_) => panic!("credit change must be reviewed"),
    };
    (ctx, v4, v5, workflow.id)
}

#[test]
fn test_low_impact_change_promotes_without_workflow() {
    let ctx = setup();
    let v3 = ctx.versions[2];

    let outcome = ctx
        .engine
        .create_draft_version(
            ctx.catalog_id,
            NewVersion::new("v4", fall_catalog(3, "Programming for everyone")),
        )
        .unwrap();

    assert!(outcome.promoted);
    assert_eq!(outcome.version.number, 4);
    assert_eq!(outcome.summary.total, 1);
    assert_eq!(outcome.summary.low_impact, 1);

    let current = ctx.engine.get_current_version(ctx.catalog_id).unwrap().unwrap();
    assert_eq!(current.id, outcome.version.id);
    assert!(!ctx.engine.get_version(v3).unwrap().is_current);
    assert!(ctx.engine.list_workflows(ctx.catalog_id).unwrap().is_empty());
    assert!(ctx.notifier.is_empty());
}

#[test]
fn test_credit_change_opens_three_step_workflow() {
    let (ctx, _, v5, workflow_id) = setup_in_review();

    let changes = ctx.engine.get_changes(v5).unwrap();
    assert_eq!(changes.changes.len(), 1);
    let change = &changes.changes[0];
    assert_eq!(change.property.as_deref(), Some("credits"));
    assert_eq!(change.impact, ImpactLevel::High);
    assert!(change.requires_approval);

    let workflow = ctx.engine.get_workflow(workflow_id).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::InProgress);
    assert_eq!(workflow.current_stage, Some(ApprovalStage::DepartmentReview));
    let stages: Vec<_> = workflow.steps.iter().map(|s| s.stage).collect();
    assert_eq!(
        stages,
        vec![
            ApprovalStage::DepartmentReview,
            ApprovalStage::CommitteeReview,
            ApprovalStage::FinalApproval
        ]
    );
    assert_eq!(workflow.name, "CS101 credits");
    assert_eq!(
        ctx.engine.get_version(v5).unwrap().approval_status,
        ApprovalStatus::PendingApproval
    );
}

#[test]
fn test_deciding_later_step_first_fails() {
    let (ctx, _, _, workflow_id) = setup_in_review();

    let err = ctx
        .engine
        .advance_approval_step(workflow_id, 2, StepDecision::Reject, None)
        .unwrap_err();

    assert!(matches!(err, Error::StepNotActive { .. }));
    let workflow = ctx.engine.get_workflow(workflow_id).unwrap();
    assert!(workflow.steps.iter().all(|s| s.status == StepStatus::Pending));
}

#[test]
fn test_committee_rejection_keeps_current_version() {
    let (ctx, v4, v5, workflow_id) = setup_in_review();

    ctx.engine
        .advance_approval_step(workflow_id, 1, StepDecision::Approve, Some("ok".into()))
        .unwrap();
    let workflow = ctx
        .engine
        .advance_approval_step(workflow_id, 2, StepDecision::Reject, Some("too many".into()))
        .unwrap();

    assert_eq!(workflow.status, WorkflowStatus::Rejected);
    assert_eq!(workflow.steps[0].status, StepStatus::Approved);
    assert_eq!(workflow.steps[1].status, StepStatus::Rejected);
    assert_eq!(workflow.steps[2].status, StepStatus::Skipped);
    assert_eq!(
        ctx.engine.get_version(v5).unwrap().approval_status,
        ApprovalStatus::Rejected
    );
    assert_eq!(
        ctx.engine.get_current_version(ctx.catalog_id).unwrap().unwrap().id,
        v4
    );
    assert_eq!(
        ctx.notifier.kinds(),
        vec!["review_requested", "review_requested", "workflow_rejected"]
    );
}

#[test]
fn test_full_approval_promotes_and_audits() {
    let (ctx, v4, v5, workflow_id) = setup_in_review();

    for order in 1..=3 {
        ctx.engine
            .advance_approval_step(workflow_id, order, StepDecision::Approve, None)
            .unwrap();
    }

    let current = ctx.engine.get_current_version(ctx.catalog_id).unwrap().unwrap();
    assert_eq!(current.id, v5);
    assert!(current.is_published);
    assert!(!ctx.engine.get_version(v4).unwrap().is_current);
    assert_eq!(ctx.engine.approval_history(ctx.catalog_id).unwrap().len(), 3);
}

#[test]
fn test_overtaken_version_is_not_promoted() {
    let (ctx, v4, v5, workflow_id) = setup_in_review();

    let v6 = ctx
        .engine
        .create_draft_version(
            ctx.catalog_id,
            NewVersion::new("v6", fall_catalog(3, "Programming for all")),
        )
        .unwrap();
    assert!(v6.promoted);
    assert_eq!(v6.version.previous_version, Some(v4));

    for order in 1..=2 {
        ctx.engine
            .advance_approval_step(workflow_id, order, StepDecision::Approve, None)
            .unwrap();
    }
    let err = ctx
        .engine
        .advance_approval_step(workflow_id, 3, StepDecision::Approve, None)
        .unwrap_err();
    assert!(matches!(err, Error::InvalidLineage { .. }));

    let current = ctx.engine.get_current_version(ctx.catalog_id).unwrap().unwrap();
    assert_eq!(current.id, v6.version.id);
    assert_eq!(
        current.content().unwrap(),
        fall_catalog(3, "Programming for all")
    );
    assert_eq!(
        ctx.engine.get_version(v5).unwrap().approval_status,
        ApprovalStatus::PendingApproval
    );
    let workflow = ctx.engine.get_workflow(workflow_id).unwrap();
    assert_eq!(workflow.status, WorkflowStatus::InProgress);
    assert_eq!(workflow.steps[2].status, StepStatus::Pending);

    // Cancelling returns v5 to Draft, but it can only come back as a new version
    ctx.engine
        .cancel_workflow(workflow_id, true, Some("overtaken".into()))
        .unwrap();
    assert!(matches!(
        ctx.engine
            .submit_for_approval(v5, SubmitRequest::new())
            .unwrap_err(),
        Error::InvalidLineage { .. }
    ));

    let history = ctx.engine.version_history(v6.version.id).unwrap();
    let ids: Vec<_> = history.iter().map(|v| v.id).collect();
    assert_eq!(&ids[..2], &[v6.version.id, v4]);
}

#[test]
fn test_resubmission_after_rejection_needs_new_version() {
    let (ctx, _, v5, workflow_id) = setup_in_review();
    ctx.engine
        .advance_approval_step(workflow_id, 1, StepDecision::Reject, None)
        .unwrap();

    assert!(matches!(
        ctx.engine
            .submit_for_approval(v5, SubmitRequest::new())
            .unwrap_err(),
        Error::InvalidVersionState { .. }
    ));

    let v6 = ctx
        .engine
        .create_draft_version(
            ctx.catalog_id,
            NewVersion::new("v6", fall_catalog(4, "Programming for everyone")),
        )
        .unwrap();
    assert!(!v6.promoted);
    let second = ctx
        .engine
        .submit_for_approval(v6.version.id, SubmitRequest::new())
        .unwrap();
    let second = second.workflow().unwrap();
    assert_ne!(second.id, workflow_id);
    assert_eq!(
        ctx.engine.get_workflow(workflow_id).unwrap().status,
        WorkflowStatus::Rejected
    );
}

#[test]
fn test_comparing_version_with_itself_fails() {
    let ctx = setup();
    let v3 = ctx.versions[2];

    let err = ctx.engine.compare_versions(v3, v3).unwrap_err();
    assert!(matches!(err, Error::IdenticalVersions(id) if id == v3));
}
