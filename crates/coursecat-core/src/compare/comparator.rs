//! Version comparator.

use super::cache::{ComparisonCache, ComparisonKey};
use super::comparison::{ComparisonType, VersionComparison};
use crate::catalog::{VersionId, VersionRecord};
use crate::collab::Identity;
use crate::error::Error;
use crate::metrics::SharedMetrics;
use crate::snapshot::{DiffPolicy, StructuralDiff};
use crate::store::{load_record, stage_record, Expect, RecordStore, WriteBatch};
use std::sync::Arc;
use tracing::debug;

/// Compares any two versions and caches the result.
///
/// Lookups go to the in-memory cache first, then to the persisted
/// comparison. A forced recompute overwrites both.
pub struct VersionComparator {
    store: Arc<dyn RecordStore>,
    policy: Arc<DiffPolicy>,
    identity: Arc<dyn Identity>,
    metrics: SharedMetrics,
    cache: ComparisonCache,
}

impl VersionComparator {
    /// Create a comparator with a cache of `cache_capacity` entries.
    pub fn new(
        store: Arc<dyn RecordStore>,
        policy: Arc<DiffPolicy>,
        identity: Arc<dyn Identity>,
        metrics: SharedMetrics,
        cache_capacity: usize,
    ) -> Self {
        Self {
            store,
            policy,
            identity,
            metrics,
            cache: ComparisonCache::new(cache_capacity),
        }
    }

    /// Compare `source` against `target`.
    ///
    /// Differences read from source to target: a field only in the target is
    /// Added.
    pub fn compare(
        &self,
        source: VersionId,
        target: VersionId,
        comparison_type: ComparisonType,
        force_recompute: bool,
    ) -> Result<VersionComparison, Error> {
        if source == target {
            return Err(Error::IdenticalVersions(source));
        }

        let key = ComparisonKey::new(source, target, comparison_type);
        if !force_recompute {
            if let Some(cached) = self.lookup(&key)? {
                self.metrics.record_comparison_hit();
                return Ok(cached);
            }
        }
        self.metrics.record_comparison_miss();

        let source_version = self.load_version(source)?;
        let target_version = self.load_version(target)?;
        let diff = StructuralDiff::compute(
            &source_version.content()?,
            &target_version.content()?,
            &self.policy,
        );

        let comparison = VersionComparison::from_diff(
            key.fingerprint(),
            (source, source_version.catalog_id),
            (target, target_version.catalog_id),
            comparison_type,
            diff,
            self.identity.current_actor(),
        );

        let mut batch = WriteBatch::new();
        stage_record(&mut batch, &comparison, Expect::Any)?;
        self.store.commit(batch)?;
        self.cache.insert(key, comparison.clone());
        self.metrics.record_comparison();

        debug!(
            source = %source,
            target = %target,
            comparison_type = %comparison_type,
            similarity = comparison.similarity,
            differences = comparison.difference_count(),
            "comparison computed"
        );
        Ok(comparison)
    }

    /// The in-memory cache.
    pub fn cache(&self) -> &ComparisonCache {
        &self.cache
    }

    fn lookup(&self, key: &ComparisonKey) -> Result<Option<VersionComparison>, Error> {
        if let Some(cached) = self.cache.get(key) {
            return Ok(Some(cached));
        }

        // Fingerprints may collide, so the stored triple must match too
        let stored = load_record::<VersionComparison>(self.store.as_ref(), key.fingerprint())?
            .map(|t| t.into_inner())
            .filter(|c| key.matches(c));
        if let Some(comparison) = &stored {
            self.cache.insert(*key, comparison.clone());
        }
        Ok(stored)
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
    use crate::collab::StaticIdentity;
    use crate::metrics::new_shared_metrics;
    use crate::snapshot::{ChangeType, ContentValue};
    use crate::store::{MemoryStore, Record};
    use serde_json::json;

    fn version(id: u64, catalog: u64, json: serde_json::Value) -> VersionRecord {
        VersionRecord {
            id: VersionId(id),
            catalog_id: CatalogId(catalog),
            number: 1,
            label: format!("v{id}"),
            snapshot: ContentValue::from(json).to_bytes().unwrap(),
            is_current: false,
            is_published: false,
            approval_status: ApprovalStatus::Draft,
            previous_version: None,
            author: ActorId::from("editor"),
            created_at: 0,
        }
    }

    fn setup() -> (Arc<MemoryStore>, VersionComparator) {
        let store = Arc::new(MemoryStore::new());
        let versions = [
            version(1, 1, json!({"title": "Fall", "courses": [{"code": "CS101", "credits": 3}]})),
            version(2, 1, json!({"title": "Fall", "courses": [{"code": "CS101", "credits": 4}, {"code": "CS102", "credits": 3}]})),
            version(3, 2, json!({"title": "Spring", "courses": []})),
        ];
        for v in &versions {
            store
                .save(VersionRecord::KIND, v.record_id(), v.to_bytes().unwrap())
                .unwrap();
        }
        let comparator = VersionComparator::new(
            store.clone(),
            Arc::new(DiffPolicy::course_catalog()),
            Arc::new(StaticIdentity::new("analyst")),
            new_shared_metrics(),
            16,
        );
        (store, comparator)
    }

    #[test]
    fn test_identical_versions_rejected() {
        let (_, comparator) = setup();
        let err = comparator
            .compare(VersionId(1), VersionId(1), ComparisonType::Full, false)
            .unwrap_err();
        assert!(matches!(err, Error::IdenticalVersions(VersionId(1))));
    }

    #[test]
    fn test_comparison_is_symmetric() {
        let (_, comparator) = setup();
        let ab = comparator
            .compare(VersionId(1), VersionId(2), ComparisonType::Full, false)
            .unwrap();
        let ba = comparator
            .compare(VersionId(2), VersionId(1), ComparisonType::Full, false)
            .unwrap();

        assert_eq!(ab.similarity, ba.similarity);
        assert_eq!(ab.details.len(), ba.details.len());
        assert_eq!(ab.added, ba.removed);
        for (forward, backward) in ab.details.iter().zip(&ba.details) {
            assert_eq!(forward.path, backward.path);
            assert_eq!(forward.change_type, backward.change_type.inverse());
            assert_eq!(forward.old_value, backward.new_value);
        }
        assert!(ab
            .details
            .iter()
            .any(|d| d.change_type == ChangeType::Added && d.entity_id == "CS102"));
    }

    #[test]
    fn test_repeat_returns_cached_result() {
        let (_, comparator) = setup();
        let first = comparator
            .compare(VersionId(1), VersionId(2), ComparisonType::Summary, false)
            .unwrap();
        let second = comparator
            .compare(VersionId(1), VersionId(2), ComparisonType::Summary, false)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(comparator.cache().stats().hits(), 1);
    }

    #[test]
    fn test_force_recompute_overwrites() {
        let (store, comparator) = setup();
        comparator
            .compare(VersionId(1), VersionId(2), ComparisonType::Full, false)
            .unwrap();
        comparator
            .compare(VersionId(1), VersionId(2), ComparisonType::Full, true)
            .unwrap();

        assert_eq!(store.list(VersionComparison::KIND).unwrap().len(), 1);
        assert_eq!(comparator.cache().len(), 1);
    }

    #[test]
    fn test_persisted_comparison_survives_cache_clear() {
        let (_, comparator) = setup();
        let first = comparator
            .compare(VersionId(1), VersionId(3), ComparisonType::Full, false)
            .unwrap();
        comparator.cache().clear();

        let second = comparator
            .compare(VersionId(1), VersionId(3), ComparisonType::Full, false)
            .unwrap();
        assert_eq!(first, second);
        assert!(second.is_cross_catalog);
    }

    #[test]
    fn test_missing_version() {
        let (_, comparator) = setup();
        let err = comparator
            .compare(VersionId(1), VersionId(99), ComparisonType::Full, false)
            .unwrap_err();
        assert!(matches!(err, Error::VersionNotFound(VersionId(99))));
    }
}
