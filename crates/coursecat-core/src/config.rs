//! Engine configuration.

use crate::error::Error;
use crate::snapshot::DiffPolicy;
use crate::workflow::WorkflowTemplate;
use std::path::Path;

/// Default maximum depth of a `based_on` chain.
pub const DEFAULT_MAX_LINEAGE_DEPTH: usize = 64;

/// Default number of automatic retries after a concurrent modification.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default number of cached comparisons.
pub const DEFAULT_COMPARISON_CACHE_CAPACITY: usize = 1024;

/// Catalog engine configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum depth of a `based_on` chain.
    pub max_lineage_depth: usize,

    /// Automatic retries after a concurrent modification. Applied by the
    /// embedding service, not the engine.
    pub max_retries: u32,

    /// Approve and promote drafts with no reviewable change as soon as they
    /// are created.
    pub auto_promote_low_impact: bool,

    /// Steps of every new workflow.
    pub workflow_template: WorkflowTemplate,

    /// Field classification and list matching.
    pub diff_policy: DiffPolicy,

    /// Cached comparisons. Zero disables the cache.
    pub comparison_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_lineage_depth: DEFAULT_MAX_LINEAGE_DEPTH,
            max_retries: DEFAULT_MAX_RETRIES,
            auto_promote_low_impact: true,
            workflow_template: WorkflowTemplate::default(),
            diff_policy: DiffPolicy::default(),
            comparison_cache_capacity: DEFAULT_COMPARISON_CACHE_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Read a configuration from a JSON file. Missing fields take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the maximum lineage depth.
    pub fn with_max_lineage_depth(mut self, depth: usize) -> Self {
        self.max_lineage_depth = depth;
        self
    }

    /// Set the retry count.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Enable or disable auto-promotion of drafts.
    pub fn with_auto_promote(mut self, enabled: bool) -> Self {
        self.auto_promote_low_impact = enabled;
        self
    }

    /// Set the workflow template.
    pub fn with_workflow_template(mut self, template: WorkflowTemplate) -> Self {
        self.workflow_template = template;
        self
    }

    /// Set the classification policy.
    pub fn with_diff_policy(mut self, policy: DiffPolicy) -> Self {
        self.diff_policy = policy;
        self
    }

    /// Set the comparison cache capacity.
    pub fn with_comparison_cache_capacity(mut self, capacity: usize) -> Self {
        self.comparison_cache_capacity = capacity;
        self
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_lineage_depth == 0 {
            return Err(Error::Config("max_lineage_depth must be at least 1".into()));
        }
        self.workflow_template.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{ApprovalStage, StepTemplate};

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_lineage_depth, 64);
        assert_eq!(config.max_retries, 3);
        assert!(config.auto_promote_low_impact);
        assert_eq!(config.comparison_cache_capacity, 1024);
        config.validate().unwrap();
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::default()
            .with_max_retries(5)
            .with_auto_promote(false)
            .with_comparison_cache_capacity(0);
        assert_eq!(config.max_retries, 5);
        assert!(!config.auto_promote_low_impact);
        assert_eq!(config.comparison_cache_capacity, 0);
    }

    #[test]
    fn test_invalid_template_rejected() {
        let config = EngineConfig::default().with_workflow_template(WorkflowTemplate::new(vec![
            StepTemplate::new(ApprovalStage::FinalApproval, "registrar"),
            StepTemplate::new(ApprovalStage::DepartmentReview, "chair"),
        ]));
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = EngineConfig::default().with_max_lineage_depth(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"max_retries": 7, "auto_promote_low_impact": false}"#)
                .unwrap();
        assert_eq!(config.max_retries, 7);
        assert!(!config.auto_promote_low_impact);
        assert_eq!(config.workflow_template, WorkflowTemplate::default());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"comparison_cache_capacity": 8}"#).unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.comparison_cache_capacity, 8);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            EngineConfig::from_file(&path),
            Err(Error::Config(_))
        ));
    }
}
