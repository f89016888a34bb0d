//! Engine counters.
//!
//! Every component records into one shared [`EngineMetrics`]; embedders read
//! a point-in-time copy with [`EngineMetrics::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Terminal outcome of an approval workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// Every step approved.
    Approved,
    /// A step was rejected.
    Rejected,
    /// Cancelled before completion.
    Cancelled,
}

/// Atomic counters for engine activity.
pub struct EngineMetrics {
    started_at: Instant,

    // Catalog and version metrics
    catalogs_created: AtomicU64,
    versions_created: AtomicU64,
    promotions: AtomicU64,

    // Workflow metrics
    workflows_opened: AtomicU64,
    workflows_approved: AtomicU64,
    workflows_rejected: AtomicU64,
    workflows_cancelled: AtomicU64,
    step_decisions: AtomicU64,

    // Comparison metrics
    comparisons_computed: AtomicU64,
    comparison_cache_hits: AtomicU64,
    comparison_cache_misses: AtomicU64,

    conflicts: AtomicU64,
}

/// Point-in-time copy of [`EngineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub catalogs_created: u64,
    pub versions_created: u64,
    pub promotions: u64,
    pub workflows_opened: u64,
    pub workflows_approved: u64,
    pub workflows_rejected: u64,
    pub workflows_cancelled: u64,
    pub step_decisions: u64,
    pub comparisons_computed: u64,
    pub comparison_cache_hits: u64,
    pub comparison_cache_misses: u64,
    pub conflicts: u64,
}

impl MetricsSnapshot {
    /// Comparison cache hit rate in `[0, 1]`.
    pub fn comparison_hit_rate(&self) -> f64 {
        let total = self.comparison_cache_hits + self.comparison_cache_misses;
        if total == 0 {
            0.0
        } else {
            self.comparison_cache_hits as f64 / total as f64
        }
    }
}

impl EngineMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            catalogs_created: AtomicU64::new(0),
            versions_created: AtomicU64::new(0),
            promotions: AtomicU64::new(0),
            workflows_opened: AtomicU64::new(0),
            workflows_approved: AtomicU64::new(0),
            workflows_rejected: AtomicU64::new(0),
            workflows_cancelled: AtomicU64::new(0),
            step_decisions: AtomicU64::new(0),
            comparisons_computed: AtomicU64::new(0),
            comparison_cache_hits: AtomicU64::new(0),
            comparison_cache_misses: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
        }
    }

    /// Record a catalog creation.
    pub fn record_catalog_created(&self) {
        self.catalogs_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a version creation.
    pub fn record_version_created(&self) {
        self.versions_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a promotion to current.
    pub fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a workflow being opened.
    pub fn record_workflow_opened(&self) {
        self.workflows_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a step decision.
    pub fn record_step_decision(&self) {
        self.step_decisions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a workflow reaching a terminal status.
    pub fn record_workflow_closed(&self, outcome: WorkflowOutcome) {
        let counter = match outcome {
            WorkflowOutcome::Approved => &self.workflows_approved,
            WorkflowOutcome::Rejected => &self.workflows_rejected,
            WorkflowOutcome::Cancelled => &self.workflows_cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a freshly computed comparison.
    pub fn record_comparison(&self) {
        self.comparisons_computed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a comparison served from cache.
    pub fn record_comparison_hit(&self) {
        self.comparison_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a comparison cache miss.
    pub fn record_comparison_miss(&self) {
        self.comparison_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an optimistic write conflict.
    pub fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            catalogs_created: self.catalogs_created.load(Ordering::Relaxed),
            versions_created: self.versions_created.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            workflows_opened: self.workflows_opened.load(Ordering::Relaxed),
            workflows_approved: self.workflows_approved.load(Ordering::Relaxed),
            workflows_rejected: self.workflows_rejected.load(Ordering::Relaxed),
            workflows_cancelled: self.workflows_cancelled.load(Ordering::Relaxed),
            step_decisions: self.step_decisions.load(Ordering::Relaxed),
            comparisons_computed: self.comparisons_computed.load(Ordering::Relaxed),
            comparison_cache_hits: self.comparison_cache_hits.load(Ordering::Relaxed),
            comparison_cache_misses: self.comparison_cache_misses.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to engine metrics.
pub type SharedMetrics = Arc<EngineMetrics>;

/// Create a shared metrics instance.
pub fn new_shared_metrics() -> SharedMetrics {
    Arc::new(EngineMetrics::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = EngineMetrics::new();

        metrics.record_version_created();
        metrics.record_version_created();
        metrics.record_promotion();
        metrics.record_workflow_closed(WorkflowOutcome::Rejected);
        metrics.record_comparison_hit();
        metrics.record_comparison_miss();
        metrics.record_comparison_miss();
        metrics.record_comparison_miss();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.versions_created, 2);
        assert_eq!(snapshot.promotions, 1);
        assert_eq!(snapshot.workflows_rejected, 1);
        assert_eq!(snapshot.workflows_approved, 0);
        assert!((snapshot.comparison_hit_rate() - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_shared_metrics() {
        let metrics = new_shared_metrics();
        let clone = Arc::clone(&metrics);
        clone.record_conflict();
        assert_eq!(metrics.snapshot().conflicts, 1);
    }
}
