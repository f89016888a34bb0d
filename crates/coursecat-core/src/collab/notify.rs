//! Notification collaborator.

use crate::catalog::{ActorId, CatalogId, VersionId, WorkflowId};
use crate::workflow::ApprovalStage;
use parking_lot::Mutex;
use std::sync::Arc;

/// Something a person should hear about.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A step became active and awaits its assignee.
    ReviewRequested {
        /// The workflow.
        workflow_id: WorkflowId,
        /// Catalog under review.
        catalog_id: CatalogId,
        /// Version under review.
        version_id: Option<VersionId>,
        /// Stage of the active step.
        stage: ApprovalStage,
        /// Order of the active step.
        step_order: u32,
    },
    /// Every step approved; the version was promoted.
    WorkflowApproved {
        /// The workflow.
        workflow_id: WorkflowId,
        /// Catalog under review.
        catalog_id: CatalogId,
        /// Version under review.
        version_id: Option<VersionId>,
    },
    /// A step was rejected.
    WorkflowRejected {
        /// The workflow.
        workflow_id: WorkflowId,
        /// Catalog under review.
        catalog_id: CatalogId,
        /// Version under review.
        version_id: Option<VersionId>,
        /// Stage that rejected.
        stage: ApprovalStage,
        /// Reviewer who rejected.
        rejected_by: ActorId,
    },
    /// The workflow was cancelled.
    WorkflowCancelled {
        /// The workflow.
        workflow_id: WorkflowId,
        /// Catalog under review.
        catalog_id: CatalogId,
        /// Version under review.
        version_id: Option<VersionId>,
        /// Who cancelled.
        cancelled_by: ActorId,
        /// Stated reason.
        reason: String,
    },
}

impl NotificationEvent {
    /// Event kind name.
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationEvent::ReviewRequested { .. } => "review_requested",
            NotificationEvent::WorkflowApproved { .. } => "workflow_approved",
            NotificationEvent::WorkflowRejected { .. } => "workflow_rejected",
            NotificationEvent::WorkflowCancelled { .. } => "workflow_cancelled",
        }
    }

    /// The workflow the event concerns.
    pub fn workflow_id(&self) -> WorkflowId {
        match self {
            NotificationEvent::ReviewRequested { workflow_id, .. }
            | NotificationEvent::WorkflowApproved { workflow_id, .. }
            | NotificationEvent::WorkflowRejected { workflow_id, .. }
            | NotificationEvent::WorkflowCancelled { workflow_id, .. } => *workflow_id,
        }
    }

    /// JSON payload of the event.
    pub fn payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Delivers notifications. Delivery failures are the implementation's concern.
pub trait Notifier: Send + Sync {
    /// Notify `recipient` of `event`.
    fn notify(&self, recipient: &ActorId, event: &NotificationEvent);
}

/// Notifier that discards every event.
#[derive(Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _recipient: &ActorId, _event: &NotificationEvent) {
        // Discard
    }
}

/// Notifier that writes each event to the log.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, recipient: &ActorId, event: &NotificationEvent) {
        tracing::info!(
            recipient = %recipient,
            kind = event.kind(),
            workflow_id = %event.workflow_id(),
            payload = %event.payload(),
            "notification"
        );
    }
}

/// In-memory notifier for testing.
#[derive(Debug, Default, Clone)]
pub struct MemoryNotifier {
    events: Arc<Mutex<Vec<(ActorId, NotificationEvent)>>>,
}

impl MemoryNotifier {
    /// Create an empty notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all delivered events.
    pub fn events(&self) -> Vec<(ActorId, NotificationEvent)> {
        self.events.lock().clone()
    }

    /// Get delivered event kinds in order.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|(_, e)| e.kind()).collect()
    }

    /// Clear all events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Get event count.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, recipient: &ActorId, event: &NotificationEvent) {
        self.events.lock().push((recipient.clone(), event.clone()));
    }
}
