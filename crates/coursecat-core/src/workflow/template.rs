//! Workflow templates.

use super::state::{ApprovalStage, ApprovalStep};
use crate::catalog::ActorId;
use crate::error::Error;

/// Blueprint for one step.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StepTemplate {
    /// Review stage.
    pub stage: ApprovalStage,
    /// Reviewer for the step.
    pub assignee: String,
    /// Documents the reviewer expects.
    #[serde(default)]
    pub required_documents: Vec<String>,
    /// What the reviewer checks.
    #[serde(default)]
    pub review_criteria: Vec<String>,
}

impl StepTemplate {
    /// Create a step blueprint.
    pub fn new(stage: ApprovalStage, assignee: impl Into<String>) -> Self {
        Self {
            stage,
            assignee: assignee.into(),
            required_documents: Vec::new(),
            review_criteria: Vec::new(),
        }
    }

    /// Add a required document.
    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.required_documents.push(document.into());
        self
    }

    /// Add a review criterion.
    pub fn with_criterion(mut self, criterion: impl Into<String>) -> Self {
        self.review_criteria.push(criterion.into());
        self
    }
}

/// Ordered steps instantiated for every new workflow.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WorkflowTemplate {
    /// Steps in review order.
    pub steps: Vec<StepTemplate>,
}

impl Default for WorkflowTemplate {
    fn default() -> Self {
        Self::new(vec![
            StepTemplate::new(ApprovalStage::DepartmentReview, "department-chair")
                .with_document("change rationale")
                .with_criterion("consistent with department offerings"),
            StepTemplate::new(ApprovalStage::CommitteeReview, "curriculum-committee")
                .with_document("impact statement")
                .with_criterion("credit and capacity changes justified"),
            StepTemplate::new(ApprovalStage::FinalApproval, "registrar")
                .with_criterion("ready for publication"),
        ])
    }
}

impl WorkflowTemplate {
    /// Create a template from steps.
    pub fn new(steps: Vec<StepTemplate>) -> Self {
        Self { steps }
    }

    /// Check the template can produce a valid workflow.
    ///
    /// Needs at least one step, and stages may not go backwards.
    pub fn validate(&self) -> Result<(), Error> {
        if self.steps.is_empty() {
            return Err(Error::Config("workflow template has no steps".into()));
        }
        for pair in self.steps.windows(2) {
            if pair[1].stage < pair[0].stage {
                return Err(Error::Config(format!(
                    "stage {} comes after {}",
                    pair[1].stage, pair[0].stage
                )));
            }
        }
        if let Some(step) = self.steps.iter().find(|s| s.assignee.trim().is_empty()) {
            return Err(Error::Config(format!(
                "step at stage {} has no assignee",
                step.stage
            )));
        }
        Ok(())
    }

    /// Create pending steps numbered from 1.
    pub fn instantiate(&self) -> Vec<ApprovalStep> {
        self.steps
            .iter()
            .zip(1u32..)
            .map(|(template, order)| {
                let mut step =
                    ApprovalStep::new(order, template.stage, ActorId::new(&template.assignee));
                step.required_documents = template.required_documents.clone();
                step.review_criteria = template.review_criteria.clone();
                step
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::StepStatus;

    #[test]
    fn test_default_template() {
        let template = WorkflowTemplate::default();
        template.validate().unwrap();

        let steps = template.instantiate();
        let stages: Vec<ApprovalStage> = steps.iter().map(|s| s.stage).collect();
        assert_eq!(
            stages,
            vec![
                ApprovalStage::DepartmentReview,
                ApprovalStage::CommitteeReview,
                ApprovalStage::FinalApproval
            ]
        );
        assert_eq!(steps[0].step_order, 1);
        assert_eq!(steps[2].step_order, 3);
        assert!(steps.iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(steps[0].required_documents, vec!["change rationale"]);
    }

    #[test]
    fn test_validate() {
        assert!(WorkflowTemplate::new(Vec::new()).validate().is_err());

        let backwards = WorkflowTemplate::new(vec![
            StepTemplate::new(ApprovalStage::FinalApproval, "registrar"),
            StepTemplate::new(ApprovalStage::DepartmentReview, "chair"),
        ]);
        assert!(matches!(backwards.validate(), Err(Error::Config(_))));

        let repeated = WorkflowTemplate::new(vec![
            StepTemplate::new(ApprovalStage::CommitteeReview, "a"),
            StepTemplate::new(ApprovalStage::CommitteeReview, "b"),
        ]);
        assert!(repeated.validate().is_ok());

        let unassigned = WorkflowTemplate::new(vec![StepTemplate::new(
            ApprovalStage::DepartmentReview,
            " ",
        )]);
        assert!(unassigned.validate().is_err());
    }
}
