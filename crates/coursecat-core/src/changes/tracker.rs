//! Change tracker.

use super::change::{ChangeSet, VersionChange};
use crate::catalog::{VersionId, VersionRecord};
use crate::error::Error;
use crate::snapshot::{DiffPolicy, ImpactLevel, StructuralDiff};
use crate::store::{load_record, stage_record, Expect, RecordStore, WriteBatch};
use std::sync::Arc;
use tracing::debug;

/// Computes and records the field-level changes of a version against its
/// predecessor.
///
/// Change sets are immutable: a version's set is written once and later
/// calls return the stored one.
pub struct ChangeTracker {
    store: Arc<dyn RecordStore>,
    policy: Arc<DiffPolicy>,
}

impl ChangeTracker {
    /// Create a tracker classifying fields with `policy`.
    pub fn new(store: Arc<dyn RecordStore>, policy: Arc<DiffPolicy>) -> Self {
        Self { store, policy }
    }

    /// The classification policy.
    pub fn policy(&self) -> &DiffPolicy {
        &self.policy
    }

    /// Compute the change set of `new` against `previous` without storing it.
    ///
    /// `previous` must be the predecessor `new` was drafted against. With no
    /// previous version every leaf field is Added at Low impact and nothing
    /// requires approval.
    pub fn compute(
        &self,
        previous: Option<&VersionRecord>,
        new: &VersionRecord,
    ) -> Result<ChangeSet, Error> {
        let previous_id = previous.map(|p| p.id);
        if previous_id != new.previous_version {
            return Err(Error::InvalidLineage {
                reason: format!(
                    "version {} follows {:?}, not {:?}",
                    new.id, new.previous_version, previous_id
                ),
            });
        }
        let new_content = new.content()?;

        let deltas = match previous {
            Some(prev) => {
                if prev.id == new.id {
                    return Err(Error::InvalidLineage {
                        reason: format!("version {} cannot follow itself", new.id),
                    });
                }
                if prev.catalog_id != new.catalog_id {
                    return Err(Error::InvalidLineage {
                        reason: format!(
                            "version {} belongs to catalog {}, not {}",
                            prev.id, prev.catalog_id, new.catalog_id
                        ),
                    });
                }
                StructuralDiff::compute(&prev.content()?, &new_content, &self.policy).deltas
            }
            None => {
                let mut deltas = StructuralDiff::additions(&new_content, &self.policy).deltas;
                for delta in &mut deltas {
                    delta.impact = ImpactLevel::Low;
                }
                deltas
            }
        };

        let changes = deltas
            .into_iter()
            .zip(0u32..)
            .map(|(delta, sequence)| {
                VersionChange::from_delta(new.id, sequence, delta, new.author.clone(), new.created_at)
            })
            .collect();

        Ok(ChangeSet {
            version_id: new.id,
            previous_version: previous_id,
            changes,
        })
    }

    /// Record the changes of `new_version` against `previous_version`.
    ///
    /// Returns the stored set if one already exists.
    pub fn record_changes(
        &self,
        previous_version: Option<VersionId>,
        new_version: VersionId,
    ) -> Result<Vec<VersionChange>, Error> {
        if let Some(existing) = self.stored(new_version)? {
            return self.check_recorded(existing, previous_version);
        }

        let new = self.load_version(new_version)?;
        let previous = previous_version
            .map(|id| self.load_version(id))
            .transpose()?;
        let set = self.compute(previous.as_ref(), &new)?;

        let mut batch = WriteBatch::new();
        Self::stage(&mut batch, &set)?;
        match self.store.commit(batch).map_err(Error::from) {
            Ok(()) => {
                debug!(
                    version_id = %new_version,
                    changes = set.changes.len(),
                    "changes recorded"
                );
                Ok(set.changes)
            }
            // Lost a race with another recorder of the same version
            Err(Error::ConcurrentModification { .. }) => match self.stored(new_version)? {
                Some(existing) => self.check_recorded(existing, previous_version),
                None => Err(Error::ConcurrentModification {
                    kind: crate::store::RecordKind::ChangeSet,
                    id: new_version.0,
                }),
            },
            Err(e) => Err(e),
        }
    }

    /// Get the changes of a version, recording them first if needed.
    pub fn changes_for(&self, version_id: VersionId) -> Result<ChangeSet, Error> {
        if let Some(existing) = self.stored(version_id)? {
            return Ok(existing);
        }
        let version = self.load_version(version_id)?;
        let changes = self.record_changes(version.previous_version, version_id)?;
        Ok(ChangeSet {
            version_id,
            previous_version: version.previous_version,
            changes,
        })
    }

    /// Queue a change set for insertion.
    pub(crate) fn stage(batch: &mut WriteBatch, set: &ChangeSet) -> Result<(), Error> {
        stage_record(batch, set, Expect::Absent)
    }

    fn stored(&self, version_id: VersionId) -> Result<Option<ChangeSet>, Error> {
        Ok(load_record::<ChangeSet>(self.store.as_ref(), version_id.0)?.map(|t| t.into_inner()))
    }

    fn check_recorded(
        &self,
        existing: ChangeSet,
        previous_version: Option<VersionId>,
    ) -> Result<Vec<VersionChange>, Error> {
        if existing.previous_version != previous_version {
            return Err(Error::InvalidLineage {
                reason: format!(
                    "changes of version {} were recorded against {:?}, not {:?}",
                    existing.version_id, existing.previous_version, previous_version
                ),
            });
        }
        Ok(existing.changes)
    }

    fn load_version(&self, version_id: VersionId) -> Result<VersionRecord, Error> {
        load_record::<VersionRecord>(self.store.as_ref(), version_id.0)?
            .map(|t| t.into_inner())
            .ok_or(Error::VersionNotFound(version_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ActorId, ApprovalStatus, CatalogId};
    use crate::snapshot::{ChangeType, ContentValue};
    use crate::store::{MemoryStore, Record};
    use serde_json::json;

    fn version(id: u64, catalog: u64, previous: Option<u64>, json: serde_json::Value) -> VersionRecord {
        VersionRecord {
            id: VersionId(id),
            catalog_id: CatalogId(catalog),
            number: id as u32,
            label: format!("v{id}"),
            snapshot: ContentValue::from(json).to_bytes().unwrap(),
            is_current: false,
            is_published: false,
            approval_status: ApprovalStatus::Draft,
            previous_version: previous.map(VersionId),
            author: ActorId::from("editor"),
            created_at: 42,
        }
    }

    fn setup(versions: &[VersionRecord]) -> ChangeTracker {
        let store = Arc::new(MemoryStore::new());
        for v in versions {
            store
                .save(VersionRecord::KIND, v.record_id(), v.to_bytes().unwrap())
                .unwrap();
        }
        ChangeTracker::new(store, Arc::new(DiffPolicy::course_catalog()))
    }

    #[test]
    fn test_bootstrap_changes_are_low_impact() {
        let v1 = version(1, 1, None, json!({"title": "Fall", "courses": [{"code": "CS101", "credits": 3}]}));
        let tracker = setup(&[v1]);

        let changes = tracker.record_changes(None, VersionId(1)).unwrap();

        let paths: Vec<&str> = changes.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, ["title", "courses[CS101].code", "courses[CS101].credits"]);
        assert!(changes.iter().all(|c| c.change_type == ChangeType::Added));
        assert_eq!(changes[2].entity_id, "CS101");
        assert!(changes.iter().all(|c| c.impact == ImpactLevel::Low));
        assert!(changes.iter().all(|c| !c.requires_approval));
    }

    #[test]
    fn test_credit_change_requires_approval() {
        let v1 = version(1, 1, None, json!({"courses": [{"code": "CS101", "credits": 3}]}));
        let v2 = version(2, 1, Some(1), json!({"courses": [{"code": "CS101", "credits": 4}]}));
        let tracker = setup(&[v1, v2]);

        let changes = tracker.record_changes(Some(VersionId(1)), VersionId(2)).unwrap();

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].property.as_deref(), Some("credits"));
        assert_eq!(changes[0].impact, ImpactLevel::High);
        assert!(changes[0].requires_approval);
        assert_eq!(changes[0].recorded_by, ActorId::from("editor"));
    }

    #[test]
    fn test_record_changes_is_idempotent() {
        let v1 = version(1, 1, None, json!({"a": 1}));
        let v2 = version(2, 1, Some(1), json!({"a": 2}));
        let tracker = setup(&[v1, v2]);

        let first = tracker.record_changes(Some(VersionId(1)), VersionId(2)).unwrap();
        let second = tracker.record_changes(Some(VersionId(1)), VersionId(2)).unwrap();
        assert_eq!(first, second);

        let err = tracker.record_changes(None, VersionId(2)).unwrap_err();
        assert!(matches!(err, Error::InvalidLineage { .. }));
    }

    #[test]
    fn test_cross_catalog_lineage_rejected() {
        let v1 = version(1, 1, None, json!({"a": 1}));
        let v2 = version(2, 2, Some(1), json!({"a": 2}));
        let tracker = setup(&[v1, v2]);

        let err = tracker.record_changes(Some(VersionId(1)), VersionId(2)).unwrap_err();
        assert!(matches!(err, Error::InvalidLineage { .. }));
    }

    #[test]
    fn test_record_changes_rejects_wrong_predecessor() {
        let v1 = version(1, 1, None, json!({"a": 1}));
        let v2 = version(2, 1, Some(1), json!({"a": 2}));
        let v3 = version(3, 1, Some(2), json!({"a": 3}));
        let tracker = setup(&[v1, v2, v3]);

        let err = tracker.record_changes(Some(VersionId(1)), VersionId(3)).unwrap_err();
        assert!(matches!(err, Error::InvalidLineage { .. }));
        let err = tracker.record_changes(None, VersionId(3)).unwrap_err();
        assert!(matches!(err, Error::InvalidLineage { .. }));

        // Nothing was stored by the rejected calls
        let set = tracker.changes_for(VersionId(3)).unwrap();
        assert_eq!(set.previous_version, Some(VersionId(2)));
        assert_eq!(set.changes.len(), 1);
        assert_eq!(set.changes[0].old_value.as_deref(), Some("2"));
    }

    #[test]
    fn test_changes_for_records_lazily() {
        let v1 = version(1, 1, None, json!({"a": 1}));
        let v2 = version(2, 1, Some(1), json!({"a": 1, "b": 2}));
        let tracker = setup(&[v1, v2]);

        let set = tracker.changes_for(VersionId(2)).unwrap();
        assert_eq!(set.previous_version, Some(VersionId(1)));
        assert_eq!(set.changes.len(), 1);
        assert_eq!(set.changes[0].change_type, ChangeType::Added);

        assert!(matches!(
            tracker.changes_for(VersionId(9)).unwrap_err(),
            Error::VersionNotFound(_)
        ));
    }
}
