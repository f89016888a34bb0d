//! Core error types.

use crate::catalog::{ApprovalStatus, CatalogId, VersionId, WorkflowId};
use crate::store::{RecordKind, StoreError};
use crate::workflow::WorkflowStatus;
use thiserror::Error;

/// Engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The catalog is missing or in a state that forbids the operation.
    #[error("invalid state for catalog {catalog_id}: {reason}")]
    InvalidCatalogState {
        /// The catalog the operation targeted.
        catalog_id: CatalogId,
        /// Why the state is invalid.
        reason: String,
    },

    /// Catalog not found.
    #[error("catalog {0} not found")]
    CatalogNotFound(CatalogId),

    /// Version not found.
    #[error("version {0} not found")]
    VersionNotFound(VersionId),

    /// Workflow not found.
    #[error("workflow {0} not found")]
    WorkflowNotFound(WorkflowId),

    /// A version or catalog chain would be broken or cyclic.
    #[error("invalid lineage: {reason}")]
    InvalidLineage {
        /// What is wrong with the chain.
        reason: String,
    },

    /// Another writer changed the record first.
    #[error("concurrent modification of {kind} {id}")]
    ConcurrentModification {
        /// Kind of the contended record.
        kind: RecordKind,
        /// Identifier of the contended record.
        id: u64,
    },

    /// Promotion requires an approved version.
    #[error("version {version_id} is not approved (status: {status})")]
    NotApproved {
        /// The version to promote.
        version_id: VersionId,
        /// Its current approval status.
        status: ApprovalStatus,
    },

    /// A version cannot be compared with itself.
    #[error("cannot compare version {0} with itself")]
    IdenticalVersions(VersionId),

    /// A decision was made on a step that is not the active one.
    #[error("step {step_order} of workflow {workflow_id} is not active (active: {})",
        .active.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string()))]
    StepNotActive {
        /// The workflow.
        workflow_id: WorkflowId,
        /// The step a decision was attempted on.
        step_order: u32,
        /// The step that is currently active, if any.
        active: Option<u32>,
    },

    /// The caller is not allowed to perform the operation.
    #[error("unauthorized: {operation}")]
    Unauthorized {
        /// The operation that was refused.
        operation: String,
    },

    /// The version's approval status forbids the operation.
    #[error("version {version_id} is {status}")]
    InvalidVersionState {
        /// The version.
        version_id: VersionId,
        /// Its current approval status.
        status: ApprovalStatus,
    },

    /// The workflow already reached a terminal status.
    #[error("workflow {workflow_id} is closed ({status})")]
    WorkflowClosed {
        /// The workflow.
        workflow_id: WorkflowId,
        /// Its terminal status.
        status: WorkflowStatus,
    },

    /// A snapshot could not be parsed.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// Invalid input to an operation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Persistence failure.
    #[error("storage error: {0}")]
    Storage(#[source] StoreError),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { kind, id } => Error::ConcurrentModification { kind, id },
            other => Error::Storage(other),
        }
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        Error::Storage(StoreError::Sled(err))
    }
}

/// Transport-independent error discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidCatalogState,
    NotFound,
    InvalidLineage,
    ConcurrentModification,
    NotApproved,
    IdenticalVersions,
    StepNotActive,
    Unauthorized,
    InvalidState,
    InvalidInput,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidCatalogState => write!(f, "invalid_catalog_state"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::InvalidLineage => write!(f, "invalid_lineage"),
            ErrorKind::ConcurrentModification => write!(f, "concurrent_modification"),
            ErrorKind::NotApproved => write!(f, "not_approved"),
            ErrorKind::IdenticalVersions => write!(f, "identical_versions"),
            ErrorKind::StepNotActive => write!(f, "step_not_active"),
            ErrorKind::Unauthorized => write!(f, "unauthorized"),
            ErrorKind::InvalidState => write!(f, "invalid_state"),
            ErrorKind::InvalidInput => write!(f, "invalid_input"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

impl Error {
    /// Stable discriminant for the administrative layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidCatalogState { .. } => ErrorKind::InvalidCatalogState,
            Error::CatalogNotFound(_) | Error::VersionNotFound(_) | Error::WorkflowNotFound(_) => {
                ErrorKind::NotFound
            }
            Error::InvalidLineage { .. } => ErrorKind::InvalidLineage,
            Error::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            Error::NotApproved { .. } => ErrorKind::NotApproved,
            Error::IdenticalVersions(_) => ErrorKind::IdenticalVersions,
            Error::StepNotActive { .. } => ErrorKind::StepNotActive,
            Error::Unauthorized { .. } => ErrorKind::Unauthorized,
            Error::InvalidVersionState { .. } | Error::WorkflowClosed { .. } => {
                ErrorKind::InvalidState
            }
            Error::InvalidSnapshot(_) | Error::InvalidInput(_) | Error::Config(_) => {
                ErrorKind::InvalidInput
            }
            Error::Serialization(_) | Error::Deserialization(_) | Error::Storage(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ConcurrentModification { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_maps_to_concurrent_modification() {
        let err: Error = StoreError::Conflict {
            kind: RecordKind::Catalog,
            id: 3,
        }
        .into();

        assert!(matches!(
            err,
            Error::ConcurrentModification {
                kind: RecordKind::Catalog,
                id: 3
            }
        ));
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::ConcurrentModification);
    }

    #[test]
    fn test_corrupt_passes_through() {
        let err: Error = StoreError::Corrupt {
            kind: RecordKind::Version,
            id: 1,
            reason: "short".into(),
        }
        .into();

        assert!(matches!(err, Error::Storage(StoreError::Corrupt { .. })));
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_step_not_active_message() {
        let err = Error::StepNotActive {
            workflow_id: WorkflowId(4),
            step_order: 2,
            active: Some(1),
        };
        assert_eq!(
            err.to_string(),
            "step 2 of workflow 4 is not active (active: 1)"
        );
        assert_eq!(err.kind(), ErrorKind::StepNotActive);
    }
}
