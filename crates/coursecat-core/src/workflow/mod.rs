//! Multi-step approval of catalog versions.
//!
//! A version whose changes need review gets an [`ApprovalWorkflow`] built from
//! the configured [`WorkflowTemplate`]. Steps are decided in order; approving
//! the last one promotes the version, rejecting any one closes the workflow.

mod approval;
mod engine;
mod state;
mod template;

pub use approval::{ApprovalOutcome, CatalogApproval};
pub use engine::{ApprovalWorkflowEngine, SubmitRequest, Submission};
pub use state::{
    ApprovalStage, ApprovalStep, ApprovalWorkflow, Priority, StepDecision, StepStatus,
    StepTransition, WorkflowStatus,
};
pub use template::{StepTemplate, WorkflowTemplate};
