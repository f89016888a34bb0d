//! Terminal approval audit records.

use super::state::{ApprovalStage, ApprovalWorkflow, StepStatus};
use crate::catalog::{ActorId, CatalogId, VersionId, WorkflowId};
use crate::store::{current_timestamp, impl_record, RecordKind};
use rkyv::{Archive, Deserialize, Serialize};

/// Outcome recorded for a stage.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOutcome {
    /// The stage approved.
    Approved,
    /// The stage rejected.
    Rejected,
    /// The workflow was cancelled at this stage.
    Cancelled,
}

impl std::fmt::Display for ApprovalOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalOutcome::Approved => write!(f, "approved"),
            ApprovalOutcome::Rejected => write!(f, "rejected"),
            ApprovalOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Who closed a stage of a finished workflow, and when.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, serde::Serialize)]
pub struct CatalogApproval {
    /// Record identifier.
    pub id: u64,
    /// Catalog reviewed.
    pub catalog_id: CatalogId,
    /// Version reviewed.
    pub version_id: Option<VersionId>,
    /// Workflow the decision belongs to.
    pub workflow_id: WorkflowId,
    /// Stage decided.
    pub stage: ApprovalStage,
    /// Outcome at that stage.
    pub outcome: ApprovalOutcome,
    /// Who decided.
    pub decided_by: ActorId,
    /// When (microseconds since epoch).
    pub decided_at: u64,
    /// Reviewer comments.
    pub comments: Option<String>,
}

impl_record!(CatalogApproval, RecordKind::Approval, |a| a.id);

impl CatalogApproval {
    /// Audit records for every decided step of a finished workflow.
    ///
    /// `allocate` supplies record identifiers.
    pub(crate) fn for_decided_steps(
        workflow: &ApprovalWorkflow,
        mut allocate: impl FnMut() -> Result<u64, crate::error::Error>,
    ) -> Result<Vec<Self>, crate::error::Error> {
        let mut records = Vec::new();
        for step in &workflow.steps {
            let outcome = match step.status {
                StepStatus::Approved => ApprovalOutcome::Approved,
                StepStatus::Rejected => ApprovalOutcome::Rejected,
                StepStatus::Pending | StepStatus::Skipped => continue,
            };
            let Some(decided_by) = step.decided_by.clone() else {
                continue;
            };
            records.push(Self {
                id: allocate()?,
                catalog_id: workflow.catalog_id,
                version_id: workflow.version_id,
                workflow_id: workflow.id,
                stage: step.stage,
                outcome,
                decided_by,
                decided_at: step.decided_at.unwrap_or_else(current_timestamp),
                comments: step.comments.clone(),
            });
        }
        Ok(records)
    }

    /// Audit record for a cancellation.
    pub(crate) fn cancellation(
        id: u64,
        workflow: &ApprovalWorkflow,
        stage: ApprovalStage,
        cancelled_by: ActorId,
        reason: Option<String>,
    ) -> Self {
        Self {
            id,
            catalog_id: workflow.catalog_id,
            version_id: workflow.version_id,
            workflow_id: workflow.id,
            stage,
            outcome: ApprovalOutcome::Cancelled,
            decided_by: cancelled_by,
            decided_at: current_timestamp(),
            comments: reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{ApprovalStep, Priority, StepDecision};

    #[test]
    fn test_records_for_rejected_workflow() {
        let mut wf = ApprovalWorkflow::new(
            WorkflowId(2),
            CatalogId(1),
            Some(VersionId(5)),
            "credits",
            ActorId::from("editor"),
            Priority::High,
            vec![
                ApprovalStep::new(1, ApprovalStage::DepartmentReview, ActorId::from("chair")),
                ApprovalStep::new(2, ApprovalStage::CommitteeReview, ActorId::from("cttee")),
                ApprovalStep::new(3, ApprovalStage::FinalApproval, ActorId::from("provost")),
            ],
        );
        wf.start().unwrap();
        wf.decide(1, StepDecision::Approve, ActorId::from("chair"), None)
            .unwrap();
        wf.decide(2, StepDecision::Reject, ActorId::from("cttee"), Some("no".into()))
            .unwrap();

        let mut next = 10;
        let records = CatalogApproval::for_decided_steps(&wf, || {
            next += 1;
            Ok(next)
        })
        .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].outcome, ApprovalOutcome::Approved);
        assert_eq!(records[0].stage, ApprovalStage::DepartmentReview);
        assert_eq!(records[1].outcome, ApprovalOutcome::Rejected);
        assert_eq!(records[1].decided_by, ActorId::from("cttee"));
        assert_eq!(records[1].comments.as_deref(), Some("no"));
        assert_eq!(records[1].id, 12);
    }
}
