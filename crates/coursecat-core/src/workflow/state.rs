//! Approval workflow state machine.
//!
//! ```text
//! Workflow: NotStarted -> InProgress -> { Approved | Rejected | Cancelled }
//! Step:     Pending -> { Approved | Rejected | Skipped }
//! ```
//!
//! Steps are decided strictly in order: only the lowest-order Pending step
//! may leave Pending.

use crate::catalog::{ActorId, CatalogId, VersionId, WorkflowId};
use crate::error::Error;
use crate::store::{current_timestamp, impl_record, RecordKind};
use rkyv::{Archive, Deserialize, Serialize};

/// Review stage. Ordered from first to last in a typical workflow.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStage {
    /// Department-level review.
    DepartmentReview,
    /// College-level review.
    CollegeReview,
    /// Curriculum committee review.
    CommitteeReview,
    /// Registrar review.
    RegistrarReview,
    /// Final sign-off.
    FinalApproval,
}

impl std::fmt::Display for ApprovalStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalStage::DepartmentReview => write!(f, "department_review"),
            ApprovalStage::CollegeReview => write!(f, "college_review"),
            ApprovalStage::CommitteeReview => write!(f, "committee_review"),
            ApprovalStage::RegistrarReview => write!(f, "registrar_review"),
            ApprovalStage::FinalApproval => write!(f, "final_approval"),
        }
    }
}

impl std::str::FromStr for ApprovalStage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "department_review" => Ok(ApprovalStage::DepartmentReview),
            "college_review" => Ok(ApprovalStage::CollegeReview),
            "committee_review" => Ok(ApprovalStage::CommitteeReview),
            "registrar_review" => Ok(ApprovalStage::RegistrarReview),
            "final_approval" => Ok(ApprovalStage::FinalApproval),
            other => Err(Error::InvalidInput(format!("unknown stage '{other}'"))),
        }
    }
}

/// Overall workflow status.
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
pub enum WorkflowStatus {
    /// Created without steps.
    NotStarted,
    /// Steps are being decided.
    InProgress,
    /// Every step approved.
    Approved,
    /// A step was rejected.
    Rejected,
    /// Cancelled before completion.
    Cancelled,
}

impl WorkflowStatus {
    /// Check if no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Approved | WorkflowStatus::Rejected | WorkflowStatus::Cancelled
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::NotStarted => write!(f, "not_started"),
            WorkflowStatus::InProgress => write!(f, "in_progress"),
            WorkflowStatus::Approved => write!(f, "approved"),
            WorkflowStatus::Rejected => write!(f, "rejected"),
            WorkflowStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Status of a single step.
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
pub enum StepStatus {
    /// Awaiting a decision.
    Pending,
    /// Approved by its reviewer.
    Approved,
    /// Rejected by its reviewer.
    Rejected,
    /// Closed without a decision.
    Skipped,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Approved => write!(f, "approved"),
            StepStatus::Rejected => write!(f, "rejected"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Review priority.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Urgent => write!(f, "urgent"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(Error::InvalidInput(format!("unknown priority '{other}'"))),
        }
    }
}

/// One ordered review step.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, serde::Serialize)]
pub struct ApprovalStep {
    /// Position in the workflow, starting at 1.
    pub step_order: u32,
    /// Review stage.
    pub stage: ApprovalStage,
    /// Reviewer responsible for the step.
    pub assignee: ActorId,
    /// Current status.
    pub status: StepStatus,
    /// Documents the reviewer expects.
    pub required_documents: Vec<String>,
    /// What the reviewer checks.
    pub review_criteria: Vec<String>,
    /// Reviewer comments.
    pub comments: Option<String>,
    /// Who decided the step.
    pub decided_by: Option<ActorId>,
    /// When the step was decided (microseconds since epoch).
    pub decided_at: Option<u64>,
}

impl ApprovalStep {
    /// Create a pending step.
    pub fn new(step_order: u32, stage: ApprovalStage, assignee: ActorId) -> Self {
        Self {
            step_order,
            stage,
            assignee,
            status: StepStatus::Pending,
            required_documents: Vec::new(),
            review_criteria: Vec::new(),
            comments: None,
            decided_by: None,
            decided_at: None,
        }
    }

    /// Check if the step awaits a decision.
    pub fn is_pending(&self) -> bool {
        self.status == StepStatus::Pending
    }

    fn decide(&mut self, status: StepStatus, actor: ActorId, comments: Option<String>) {
        self.status = status;
        self.decided_by = Some(actor);
        self.decided_at = Some(current_timestamp());
        self.comments = comments;
    }

    fn skip(&mut self) {
        self.status = StepStatus::Skipped;
        self.decided_at = Some(current_timestamp());
    }
}

/// A reviewer's decision on a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepDecision {
    /// Approve the step.
    Approve,
    /// Reject the step and with it the workflow.
    Reject,
}

impl std::str::FromStr for StepDecision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" | "approved" => Ok(StepDecision::Approve),
            "reject" | "rejected" => Ok(StepDecision::Reject),
            other => Err(Error::InvalidInput(format!("unknown decision '{other}'"))),
        }
    }
}

/// What a decision did to the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepTransition {
    /// The next step became active.
    Advanced {
        /// Stage of the newly active step.
        stage: ApprovalStage,
        /// Order of the newly active step.
        step_order: u32,
        /// Its reviewer.
        assignee: ActorId,
    },
    /// The last step was approved.
    Approved,
    /// The step was rejected.
    Rejected {
        /// Stage that rejected.
        stage: ApprovalStage,
    },
}

/// A multi-step review of one catalog version.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, serde::Serialize)]
pub struct ApprovalWorkflow {
    /// Workflow identifier.
    pub id: WorkflowId,
    /// Catalog under review.
    pub catalog_id: CatalogId,
    /// Version under review.
    pub version_id: Option<VersionId>,
    /// Display name.
    pub name: String,
    /// Who submitted the version.
    pub initiator: ActorId,
    /// Overall status.
    pub status: WorkflowStatus,
    /// Stage of the active step.
    pub current_stage: Option<ApprovalStage>,
    /// Review priority.
    pub priority: Priority,
    /// Steps in order.
    pub steps: Vec<ApprovalStep>,
    /// Creation time (microseconds since epoch).
    pub created_at: u64,
    /// When review started.
    pub started_at: Option<u64>,
    /// When the workflow reached a terminal status.
    pub completed_at: Option<u64>,
}

impl_record!(ApprovalWorkflow, RecordKind::Workflow, |w| w.id.0);

impl ApprovalWorkflow {
    /// Create a workflow that has not started.
    pub fn new(
        id: WorkflowId,
        catalog_id: CatalogId,
        version_id: Option<VersionId>,
        name: impl Into<String>,
        initiator: ActorId,
        priority: Priority,
        steps: Vec<ApprovalStep>,
    ) -> Self {
        Self {
            id,
            catalog_id,
            version_id,
            name: name.into(),
            initiator,
            status: WorkflowStatus::NotStarted,
            current_stage: None,
            priority,
            steps,
            created_at: current_timestamp(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Start review at the first step.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.status != WorkflowStatus::NotStarted {
            return Err(self.closed_or_invalid("workflow already started"));
        }
        let first = self
            .steps
            .first()
            .ok_or_else(|| Error::InvalidInput("workflow has no steps".into()))?;
        self.current_stage = Some(first.stage);
        self.status = WorkflowStatus::InProgress;
        self.started_at = Some(current_timestamp());
        Ok(())
    }

    /// Check if the workflow reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The lowest-order step still pending.
    pub fn active_step(&self) -> Option<&ApprovalStep> {
        if self.status != WorkflowStatus::InProgress {
            return None;
        }
        self.steps.iter().find(|s| s.is_pending())
    }

    /// Get a step by order.
    pub fn step(&self, step_order: u32) -> Option<&ApprovalStep> {
        self.steps.iter().find(|s| s.step_order == step_order)
    }

    /// Decide the step at `step_order`.
    ///
    /// Fails with [`Error::StepNotActive`] unless it is the active step.
    pub fn decide(
        &mut self,
        step_order: u32,
        decision: StepDecision,
        actor: ActorId,
        comments: Option<String>,
    ) -> Result<StepTransition, Error> {
        if self.is_terminal() {
            return Err(Error::WorkflowClosed {
                workflow_id: self.id,
                status: self.status,
            });
        }

        let active = self.active_step().map(|s| s.step_order);
        if active != Some(step_order) {
            return Err(Error::StepNotActive {
                workflow_id: self.id,
                step_order,
                active,
            });
        }

        let index = self
            .steps
            .iter()
            .position(|s| s.step_order == step_order)
            .ok_or(Error::StepNotActive {
                workflow_id: self.id,
                step_order,
                active,
            })?;
        let stage = self.steps[index].stage;

        match decision {
            StepDecision::Approve => {
                self.steps[index].decide(StepStatus::Approved, actor, comments);
                match self.steps.iter().find(|s| s.is_pending()) {
                    Some(next) => {
                        let transition = StepTransition::Advanced {
                            stage: next.stage,
                            step_order: next.step_order,
                            assignee: next.assignee.clone(),
                        };
                        self.current_stage = Some(next.stage);
                        Ok(transition)
                    }
                    None => {
                        self.finish(WorkflowStatus::Approved);
                        Ok(StepTransition::Approved)
                    }
                }
            }
            StepDecision::Reject => {
                self.steps[index].decide(StepStatus::Rejected, actor, comments);
                self.skip_pending();
                self.finish(WorkflowStatus::Rejected);
                Ok(StepTransition::Rejected { stage })
            }
        }
    }

    /// Cancel a workflow that has not reached a terminal status.
    pub fn cancel(&mut self) -> Result<(), Error> {
        if self.is_terminal() {
            return Err(Error::WorkflowClosed {
                workflow_id: self.id,
                status: self.status,
            });
        }
        self.skip_pending();
        self.finish(WorkflowStatus::Cancelled);
        Ok(())
    }

    fn skip_pending(&mut self) {
        for step in self.steps.iter_mut().filter(|s| s.is_pending()) {
            step.skip();
        }
    }

    fn finish(&mut self, status: WorkflowStatus) {
        self.status = status;
        self.completed_at = Some(current_timestamp());
    }

    fn closed_or_invalid(&self, reason: &str) -> Error {
        if self.is_terminal() {
            Error::WorkflowClosed {
                workflow_id: self.id,
                status: self.status,
            }
        } else {
            Error::InvalidInput(reason.to_string())
        }
    }
}
