//! Catalog header records.

use super::{ActorId, CatalogId, CatalogStatus, VersionId};
use crate::store::{current_timestamp, impl_record, RecordKind};
use rkyv::{Archive, Deserialize, Serialize};

/// A named, versionable catalog.
///
/// The header carries lifecycle state and the version pointer. Content lives
/// in its versions.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, serde::Serialize)]
pub struct CatalogRecord {
    /// Catalog identifier.
    pub id: CatalogId,
    /// Display name, e.g. "2025 Fall".
    pub name: String,
    /// Free-form type tag, e.g. "undergraduate".
    pub catalog_type: String,
    /// Lifecycle status.
    pub status: CatalogStatus,
    /// Start of the validity window (microseconds since epoch).
    pub effective_at: u64,
    /// End of the validity window, if bounded.
    pub expires_at: Option<u64>,
    /// Catalog this one was derived from.
    pub based_on: Option<CatalogId>,
    /// The version currently in force.
    pub current_version: Option<VersionId>,
    /// Number of versions created so far. The next version number is this plus one.
    pub version_count: u32,
    /// Who created the catalog.
    pub created_by: ActorId,
    /// Creation time (microseconds since epoch).
    pub created_at: u64,
    /// Last header change (microseconds since epoch).
    pub updated_at: u64,
}

impl_record!(CatalogRecord, RecordKind::Catalog, |c| c.id.0);

impl CatalogRecord {
    /// Check if the catalog is archived.
    pub fn is_archived(&self) -> bool {
        self.status == CatalogStatus::Archived
    }

    /// Check if the validity window covers a timestamp.
    pub fn is_effective_at(&self, at: u64) -> bool {
        at >= self.effective_at && self.expires_at.map_or(true, |end| at < end)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = current_timestamp();
    }
}

/// Parameters for creating a catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCatalog {
    /// Display name.
    pub name: String,
    /// Type tag.
    pub catalog_type: String,
    /// Start of the validity window (microseconds since epoch).
    pub effective_at: u64,
    /// End of the validity window.
    pub expires_at: Option<u64>,
    /// Catalog to derive from.
    pub based_on: Option<CatalogId>,
}

impl NewCatalog {
    /// Create parameters effective from now, with no expiry and no parent.
    pub fn new(name: impl Into<String>, catalog_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            catalog_type: catalog_type.into(),
            effective_at: current_timestamp(),
            expires_at: None,
            based_on: None,
        }
    }

    /// Set the validity window.
    pub fn with_window(mut self, effective_at: u64, expires_at: Option<u64>) -> Self {
        self.effective_at = effective_at;
        self.expires_at = expires_at;
        self
    }

    /// Derive from another catalog.
    pub fn with_based_on(mut self, based_on: CatalogId) -> Self {
        self.based_on = Some(based_on);
        self
    }

    pub(crate) fn into_record(self, id: CatalogId, created_by: ActorId) -> CatalogRecord {
        let now = current_timestamp();
        CatalogRecord {
            id,
            name: self.name,
            catalog_type: self.catalog_type,
            status: CatalogStatus::Draft,
            effective_at: self.effective_at,
            expires_at: self.expires_at,
            based_on: self.based_on,
            current_version: None,
            version_count: 0,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Record;

    #[test]
    fn test_catalog_record_roundtrip() {
        let record = NewCatalog::new("2025 Fall", "undergraduate")
            .with_window(100, Some(200))
            .into_record(CatalogId(1), ActorId::from("registrar"));

        let bytes = record.to_bytes().unwrap();
        let decoded = CatalogRecord::from_bytes(&bytes).unwrap();

        assert_eq!(decoded, record);
        assert_eq!(decoded.record_id(), 1);
        assert_eq!(decoded.status, CatalogStatus::Draft);
    }

    #[test]
    fn test_validity_window() {
        let record = NewCatalog::new("2025 Fall", "undergraduate")
            .with_window(100, Some(200))
            .into_record(CatalogId(1), ActorId::from("registrar"));

        assert!(!record.is_effective_at(99));
        assert!(record.is_effective_at(100));
        assert!(record.is_effective_at(199));
        assert!(!record.is_effective_at(200));
    }
}
