//! Catalog version records.

use super::{ActorId, ApprovalStatus, CatalogId, VersionId};
use crate::error::Error;
use crate::snapshot::ContentValue;
use crate::store::{impl_record, RecordKind};
use rkyv::{Archive, Deserialize, Serialize};

/// An immutable snapshot of a catalog's content.
///
/// Only `is_current`, `is_published` and `approval_status` change after
/// creation.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, serde::Serialize)]
pub struct VersionRecord {
    /// Version identifier.
    pub id: VersionId,
    /// Owning catalog.
    pub catalog_id: CatalogId,
    /// Sequence number within the catalog, starting at 1.
    pub number: u32,
    /// Free-text label or description.
    pub label: String,
    /// Serialized content tree (JSON).
    #[serde(skip)]
    pub snapshot: Vec<u8>,
    /// Whether this is the catalog's version in force.
    pub is_current: bool,
    /// Whether this version has been published.
    pub is_published: bool,
    /// Approval status.
    pub approval_status: ApprovalStatus,
    /// The catalog's current version when this one was created.
    pub previous_version: Option<VersionId>,
    /// Who created the version.
    pub author: ActorId,
    /// Creation time (microseconds since epoch).
    pub created_at: u64,
}

impl_record!(VersionRecord, RecordKind::Version, |v| v.id.0);

impl VersionRecord {
    /// Decode the content tree.
    pub fn content(&self) -> Result<ContentValue, Error> {
        ContentValue::from_bytes(&self.snapshot)
    }
}

/// Parameters for a new draft version.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVersion {
    /// Free-text label or description.
    pub label: String,
    /// Content snapshot.
    pub content: ContentValue,
}

impl NewVersion {
    /// Create draft parameters.
    pub fn new(label: impl Into<String>, content: ContentValue) -> Self {
        Self {
            label: label.into(),
            content,
        }
    }

    /// Create draft parameters from a JSON document.
    pub fn from_json(label: impl Into<String>, json: &serde_json::Value) -> Result<Self, Error> {
        Ok(Self::new(label, ContentValue::from_json(json)?))
    }
}
