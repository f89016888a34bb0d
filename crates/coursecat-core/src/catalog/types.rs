//! Identifiers and statuses shared across the engine.

use rkyv::{Archive, Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            Archive, Serialize, Deserialize,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Raw identifier value.
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// Catalog identifier.
    CatalogId
);
id_type!(
    /// Version identifier. Unique across catalogs.
    VersionId
);
id_type!(
    /// Approval workflow identifier.
    WorkflowId
);

/// Identifier of a person acting on the engine.
#[derive(
    Debug,
    Clone,
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
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    /// Create an actor identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Lifecycle status of a catalog.
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
pub enum CatalogStatus {
    /// Being prepared; no version promoted yet.
    Draft,
    /// In use.
    Active,
    /// Retired. No new versions may be created.
    Archived,
}

impl std::fmt::Display for CatalogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogStatus::Draft => write!(f, "draft"),
            CatalogStatus::Active => write!(f, "active"),
            CatalogStatus::Archived => write!(f, "archived"),
        }
    }
}

/// Approval status of a version.
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
pub enum ApprovalStatus {
    /// Created, not yet submitted.
    Draft,
    /// Under review by an open workflow.
    PendingApproval,
    /// Approved. May be promoted.
    Approved,
    /// Rejected. Never promoted.
    Rejected,
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalStatus::Draft => write!(f, "draft"),
            ApprovalStatus::PendingApproval => write!(f, "pending_approval"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Rejected => write!(f, "rejected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display() {
        assert_eq!(CatalogId(12).to_string(), "12");
        assert_eq!(VersionId::from(3).get(), 3);
        assert_eq!(ActorId::from("registrar").to_string(), "registrar");
    }

    #[test]
    fn test_status_serde_names() {
        let json = serde_json::to_string(&ApprovalStatus::PendingApproval).unwrap();
        assert_eq!(json, "\"pending_approval\"");
        let json = serde_json::to_string(&WorkflowId(9)).unwrap();
        assert_eq!(json, "9");
    }
}
