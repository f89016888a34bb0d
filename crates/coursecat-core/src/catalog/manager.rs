//! Catalog and version lifecycle.

use super::{
    ApprovalStatus, CatalogId, CatalogRecord, CatalogStatus, NewCatalog, NewVersion, VersionId,
    VersionRecord,
};
use crate::collab::Identity;
use crate::error::Error;
use crate::metrics::SharedMetrics;
use crate::store::{
    current_timestamp, list_records, load_record, stage_record, Expect, RecordKind, RecordStore,
    Tracked, WriteBatch,
};
use crate::workflow::ApprovalWorkflow;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owns catalogs, their version chains and the current-version pointer.
///
/// Writes that touch a catalog are checked against the revision it was read
/// at, so two writers racing on one catalog cannot both succeed.
pub struct CatalogVersionManager {
    store: Arc<dyn RecordStore>,
    identity: Arc<dyn Identity>,
    metrics: SharedMetrics,
    max_lineage_depth: usize,
}

impl CatalogVersionManager {
    /// Create a manager.
    pub fn new(
        store: Arc<dyn RecordStore>,
        identity: Arc<dyn Identity>,
        metrics: SharedMetrics,
        max_lineage_depth: usize,
    ) -> Self {
        Self {
            store,
            identity,
            metrics,
            max_lineage_depth,
        }
    }

    // Catalogs

    /// Create a catalog in Draft status.
    pub fn create_catalog(&self, new: NewCatalog) -> Result<CatalogRecord, Error> {
        if new.name.trim().is_empty() {
            return Err(Error::InvalidInput("catalog name must not be empty".into()));
        }
        if let Some(expires_at) = new.expires_at {
            if expires_at <= new.effective_at {
                return Err(Error::InvalidInput(
                    "expiration must be after the effective date".into(),
                ));
            }
        }
        if let Some(parent) = new.based_on {
            if load_record::<CatalogRecord>(self.store.as_ref(), parent.0)?.is_none() {
                return Err(Error::InvalidLineage {
                    reason: format!("based-on catalog {parent} does not exist"),
                });
            }
        }

        let id = CatalogId(self.store.allocate_id(RecordKind::Catalog)?);
        let record = new.into_record(id, self.identity.current_actor());

        let mut batch = WriteBatch::new();
        stage_record(&mut batch, &record, Expect::Absent)?;
        self.store.commit(batch)?;

        self.metrics.record_catalog_created();
        info!(catalog_id = %id, name = %record.name, "catalog created");
        Ok(record)
    }

    /// Get a catalog.
    pub fn get_catalog(&self, catalog_id: CatalogId) -> Result<CatalogRecord, Error> {
        Ok(self.load_catalog(catalog_id)?.into_inner())
    }

    /// List all catalogs ordered by identifier.
    pub fn list_catalogs(&self) -> Result<Vec<CatalogRecord>, Error> {
        Ok(list_records::<CatalogRecord>(self.store.as_ref())?
            .into_iter()
            .map(Tracked::into_inner)
            .collect())
    }

    /// Move a Draft catalog to Active. Active catalogs are left as they are.
    pub fn activate(&self, catalog_id: CatalogId) -> Result<CatalogRecord, Error> {
        let tracked = self.load_catalog(catalog_id)?;
        match tracked.status {
            CatalogStatus::Active => return Ok(tracked.into_inner()),
            CatalogStatus::Archived => {
                return Err(Error::InvalidCatalogState {
                    catalog_id,
                    reason: "catalog is archived".into(),
                })
            }
            CatalogStatus::Draft => {}
        }

        let revision = tracked.revision;
        let mut catalog = tracked.into_inner();
        catalog.status = CatalogStatus::Active;
        catalog.touch();
        self.save_catalog(&catalog, revision)?;

        info!(catalog_id = %catalog_id, "catalog activated");
        Ok(catalog)
    }

    /// Re-point a catalog's `based_on` reference.
    ///
    /// Walks the new parent's lineage and refuses if it leads back to this
    /// catalog or runs deeper than the configured limit.
    pub fn rebase(
        &self,
        catalog_id: CatalogId,
        based_on: Option<CatalogId>,
    ) -> Result<CatalogRecord, Error> {
        let tracked = self.load_catalog(catalog_id)?;
        if tracked.is_archived() {
            return Err(Error::InvalidCatalogState {
                catalog_id,
                reason: "catalog is archived".into(),
            });
        }
        if let Some(parent) = based_on {
            self.check_lineage(catalog_id, parent)?;
        }

        let revision = tracked.revision;
        let mut catalog = tracked.into_inner();
        catalog.based_on = based_on;
        catalog.touch();
        self.save_catalog(&catalog, revision)?;

        debug!(catalog_id = %catalog_id, based_on = ?based_on, "catalog rebased");
        Ok(catalog)
    }

    /// Archive a catalog.
    ///
    /// Refused while any workflow over the catalog is still open.
    pub fn archive(&self, catalog_id: CatalogId) -> Result<CatalogRecord, Error> {
        let tracked = self.load_catalog(catalog_id)?;
        if tracked.is_archived() {
            return Ok(tracked.into_inner());
        }

        let open = list_records::<ApprovalWorkflow>(self.store.as_ref())?
            .into_iter()
            .find(|w| w.catalog_id == catalog_id && !w.is_terminal());
        if let Some(workflow) = open {
            warn!(catalog_id = %catalog_id, workflow_id = %workflow.id, "archive refused");
            return Err(Error::InvalidCatalogState {
                catalog_id,
                reason: format!("workflow {} is still open", workflow.id),
            });
        }

        let revision = tracked.revision;
        let mut catalog = tracked.into_inner();
        catalog.status = CatalogStatus::Archived;
        catalog.touch();
        self.save_catalog(&catalog, revision)?;

        info!(catalog_id = %catalog_id, "catalog archived");
        Ok(catalog)
    }

    // Versions

    /// Create a Draft version holding `new.content`.
    pub fn create_version(
        &self,
        catalog_id: CatalogId,
        new: NewVersion,
    ) -> Result<VersionRecord, Error> {
        let (version, batch) = self.prepare_version(catalog_id, new)?;
        self.commit(batch)?;
        self.version_created(&version);
        Ok(version)
    }

    /// Build the writes for a new Draft version without committing them.
    ///
    /// The catalog write is conditioned on the revision read here, so of
    /// two concurrent preparations at most one commits.
    pub(crate) fn prepare_version(
        &self,
        catalog_id: CatalogId,
        new: NewVersion,
    ) -> Result<(VersionRecord, WriteBatch), Error> {
        let tracked = load_record::<CatalogRecord>(self.store.as_ref(), catalog_id.0)?
            .ok_or_else(|| Error::InvalidCatalogState {
                catalog_id,
                reason: "catalog does not exist".into(),
            })?;
        if tracked.is_archived() {
            return Err(Error::InvalidCatalogState {
                catalog_id,
                reason: "catalog is archived".into(),
            });
        }

        let previous_version = tracked.current_version;
        if let Some(previous) = previous_version {
            let prev = self.get_version(previous)?;
            if prev.catalog_id != catalog_id {
                return Err(Error::InvalidLineage {
                    reason: format!(
                        "previous version {previous} belongs to catalog {}, not {catalog_id}",
                        prev.catalog_id
                    ),
                });
            }
        }

        let id = VersionId(self.store.allocate_id(RecordKind::Version)?);
        let revision = tracked.revision;
        let mut catalog = tracked.into_inner();
        catalog.version_count += 1;
        catalog.touch();

        let version = VersionRecord {
            id,
            catalog_id,
            number: catalog.version_count,
            label: new.label,
            snapshot: new.content.to_bytes()?,
            is_current: false,
            is_published: false,
            approval_status: ApprovalStatus::Draft,
            previous_version,
            author: self.identity.current_actor(),
            created_at: current_timestamp(),
        };

        let mut batch = WriteBatch::new();
        stage_record(&mut batch, &catalog, Expect::Revision(revision))?;
        stage_record(&mut batch, &version, Expect::Absent)?;
        Ok((version, batch))
    }

    pub(crate) fn version_created(&self, version: &VersionRecord) {
        self.metrics.record_version_created();
        info!(
            catalog_id = %version.catalog_id,
            version_id = %version.id,
            version = version.number,
            "version created"
        );
    }

    /// Make an Approved version the catalog's current version.
    pub fn promote(&self, version_id: VersionId) -> Result<VersionRecord, Error> {
        let version = self.load_version(version_id)?;
        if version.approval_status != ApprovalStatus::Approved {
            return Err(Error::NotApproved {
                version_id,
                status: version.approval_status,
            });
        }
        if version.is_current {
            return Ok(version.into_inner());
        }

        let catalog = self.load_catalog(version.catalog_id)?;
        let mut batch = WriteBatch::new();
        let promoted = self.stage_promotion(&mut batch, catalog, version)?;
        self.commit(batch)?;
        self.promoted(&promoted);
        Ok(promoted)
    }

    /// Approve a Draft version and promote it in one commit.
    ///
    /// Used when a draft needs no review.
    pub fn approve_and_promote(&self, version_id: VersionId) -> Result<VersionRecord, Error> {
        let mut version = self.load_version(version_id)?;
        if version.approval_status != ApprovalStatus::Draft {
            return Err(Error::InvalidVersionState {
                version_id,
                status: version.approval_status,
            });
        }
        version.record.approval_status = ApprovalStatus::Approved;

        let catalog = self.load_catalog(version.catalog_id)?;
        let mut batch = WriteBatch::new();
        let promoted = self.stage_promotion(&mut batch, catalog, version)?;
        self.commit(batch)?;
        self.promoted(&promoted);
        Ok(promoted)
    }

    /// Stage the writes that make `version` current.
    ///
    /// `version` may already carry changes from the caller; it is written
    /// once, at the revision it was read at. Unflags the previous current
    /// version and activates a Draft catalog.
    pub(crate) fn stage_promotion(
        &self,
        batch: &mut WriteBatch,
        catalog: Tracked<CatalogRecord>,
        version: Tracked<VersionRecord>,
    ) -> Result<VersionRecord, Error> {
        let catalog_id = catalog.id;
        if catalog.is_archived() {
            return Err(Error::InvalidCatalogState {
                catalog_id,
                reason: "catalog is archived".into(),
            });
        }
        if version.catalog_id != catalog_id {
            return Err(Error::InvalidLineage {
                reason: format!(
                    "version {} belongs to catalog {}, not {catalog_id}",
                    version.id, version.catalog_id
                ),
            });
        }
        ensure_follows_current(&catalog, &version)?;

        if let Some(old_id) = catalog.current_version.filter(|old| *old != version.id) {
            let mut old = self.load_version(old_id)?;
            old.record.is_current = false;
            stage_record(batch, &old.record, Expect::Revision(old.revision))?;
        }

        let version_revision = version.revision;
        let mut version = version.into_inner();
        version.is_current = true;
        version.is_published = true;
        stage_record(batch, &version, Expect::Revision(version_revision))?;

        let catalog_revision = catalog.revision;
        let mut catalog = catalog.into_inner();
        catalog.current_version = Some(version.id);
        if catalog.status == CatalogStatus::Draft {
            catalog.status = CatalogStatus::Active;
        }
        catalog.touch();
        stage_record(batch, &catalog, Expect::Revision(catalog_revision))?;

        Ok(version)
    }

    pub(crate) fn promoted(&self, version: &VersionRecord) {
        self.metrics.record_promotion();
        info!(
            catalog_id = %version.catalog_id,
            version_id = %version.id,
            version = version.number,
            "version promoted"
        );
    }

    /// Mark an Approved version as published.
    pub fn publish(&self, version_id: VersionId) -> Result<VersionRecord, Error> {
        let tracked = self.load_version(version_id)?;
        if tracked.approval_status != ApprovalStatus::Approved {
            return Err(Error::NotApproved {
                version_id,
                status: tracked.approval_status,
            });
        }
        if tracked.is_published {
            return Ok(tracked.into_inner());
        }

        let revision = tracked.revision;
        let mut version = tracked.into_inner();
        version.is_published = true;
        let mut batch = WriteBatch::new();
        stage_record(&mut batch, &version, Expect::Revision(revision))?;
        self.commit(batch)?;

        info!(version_id = %version_id, "version published");
        Ok(version)
    }

    /// Get a version.
    pub fn get_version(&self, version_id: VersionId) -> Result<VersionRecord, Error> {
        Ok(self.load_version(version_id)?.into_inner())
    }

    /// Get a catalog's current version, if one has been promoted.
    pub fn current_version(&self, catalog_id: CatalogId) -> Result<Option<VersionRecord>, Error> {
        let catalog = self.get_catalog(catalog_id)?;
        catalog
            .current_version
            .map(|id| self.get_version(id))
            .transpose()
    }

    /// List a catalog's versions ordered by number.
    pub fn list_versions(&self, catalog_id: CatalogId) -> Result<Vec<VersionRecord>, Error> {
        self.get_catalog(catalog_id)?;
        let mut versions: Vec<VersionRecord> = list_records::<VersionRecord>(self.store.as_ref())?
            .into_iter()
            .map(Tracked::into_inner)
            .filter(|v| v.catalog_id == catalog_id)
            .collect();
        versions.sort_by_key(|v| v.number);
        Ok(versions)
    }

    /// Walk `previous_version` links from a version back to the first one.
    pub fn version_history(&self, version_id: VersionId) -> Result<Vec<VersionRecord>, Error> {
        let mut history = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(version_id);

        while let Some(id) = next {
            if !seen.insert(id) {
                return Err(Error::InvalidLineage {
                    reason: format!("version chain loops at {id}"),
                });
            }
            let version = self.get_version(id)?;
            if history
                .first()
                .is_some_and(|first: &VersionRecord| first.catalog_id != version.catalog_id)
            {
                return Err(Error::InvalidLineage {
                    reason: format!("version {id} belongs to another catalog"),
                });
            }
            next = version.previous_version;
            history.push(version);
        }
        Ok(history)
    }

    // Internals

    pub(crate) fn load_catalog(
        &self,
        catalog_id: CatalogId,
    ) -> Result<Tracked<CatalogRecord>, Error> {
        load_record(self.store.as_ref(), catalog_id.0)?.ok_or(Error::CatalogNotFound(catalog_id))
    }

    pub(crate) fn load_version(
        &self,
        version_id: VersionId,
    ) -> Result<Tracked<VersionRecord>, Error> {
        load_record(self.store.as_ref(), version_id.0)?.ok_or(Error::VersionNotFound(version_id))
    }

    fn save_catalog(&self, catalog: &CatalogRecord, revision: u64) -> Result<(), Error> {
        let mut batch = WriteBatch::new();
        stage_record(&mut batch, catalog, Expect::Revision(revision))?;
        self.commit(batch)
    }

    /// Commit a batch, counting conflicts.
    pub(crate) fn commit(&self, batch: WriteBatch) -> Result<(), Error> {
        self.store.commit(batch).map_err(|e| {
            let err = Error::from(e);
            if err.is_retryable() {
                self.metrics.record_conflict();
            }
            err
        })
    }

    fn check_lineage(&self, catalog_id: CatalogId, parent: CatalogId) -> Result<(), Error> {
        let mut visited = HashSet::new();
        let mut next = Some(parent);
        let mut depth = 0;

        while let Some(id) = next {
            if id == catalog_id {
                return Err(Error::InvalidLineage {
                    reason: format!("catalog {catalog_id} would be based on itself via {parent}"),
                });
            }
            if !visited.insert(id) {
                return Err(Error::InvalidLineage {
                    reason: format!("based-on chain loops at catalog {id}"),
                });
            }
            depth += 1;
            if depth > self.max_lineage_depth {
                return Err(Error::InvalidLineage {
                    reason: format!(
                        "based-on chain deeper than {} catalogs",
                        self.max_lineage_depth
                    ),
                });
            }

            let catalog = load_record::<CatalogRecord>(self.store.as_ref(), id.0)?
                .ok_or_else(|| Error::InvalidLineage {
                    reason: format!("based-on catalog {id} does not exist"),
                })?;
            next = catalog.based_on;
        }
        Ok(())
    }
}

/// Check that `version` was drafted against the catalog's current version.
///
/// A draft whose predecessor has since been superseded can never become
/// current; its content has to be resubmitted as a new version.
pub(crate) fn ensure_follows_current(
    catalog: &CatalogRecord,
    version: &VersionRecord,
) -> Result<(), Error> {
    if catalog.current_version == Some(version.id)
        || version.previous_version == catalog.current_version
    {
        return Ok(());
    }
    Err(Error::InvalidLineage {
        reason: format!(
            "version {} follows {} but the current version of catalog {} is {}",
            version.id,
            version
                .previous_version
                .map(|id| id.to_string())
                .unwrap_or_else(|| "nothing".into()),
            catalog.id,
            catalog
                .current_version
                .map(|id| id.to_string())
                .unwrap_or_else(|| "none".into()),
        ),
    })
}
