//! Comparison results.

use crate::catalog::{ActorId, CatalogId, VersionId};
use crate::error::Error;
use crate::snapshot::{ChangeType, ContentValue, FieldDelta, ImpactLevel, StructuralDiff};
use crate::store::{current_timestamp, impl_record, RecordKind};
use rkyv::{Archive, Deserialize, Serialize};

/// How much detail a comparison keeps.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonType {
    /// Every difference.
    #[default]
    Full,
    /// Similarity and counts only.
    Summary,
    /// Critical differences only.
    CriticalOnly,
}

impl ComparisonType {
    /// Stable tag used in fingerprints.
    pub fn tag(self) -> u8 {
        match self {
            ComparisonType::Full => 0,
            ComparisonType::Summary => 1,
            ComparisonType::CriticalOnly => 2,
        }
    }
}

impl std::fmt::Display for ComparisonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComparisonType::Full => write!(f, "full"),
            ComparisonType::Summary => write!(f, "summary"),
            ComparisonType::CriticalOnly => write!(f, "critical_only"),
        }
    }
}

impl std::str::FromStr for ComparisonType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(ComparisonType::Full),
            "summary" => Ok(ComparisonType::Summary),
            "critical_only" | "critical" => Ok(ComparisonType::CriticalOnly),
            other => Err(Error::InvalidInput(format!(
                "unknown comparison type '{other}'"
            ))),
        }
    }
}

/// How much a difference matters to a reader.
#[derive(
    Debug,
    Clone,
    Copy,
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
#[serde(rename_all = "snake_case")]
pub enum Significance {
    Cosmetic,
    Notable,
    Critical,
}

impl From<ImpactLevel> for Significance {
    fn from(impact: ImpactLevel) -> Self {
        match impact {
            ImpactLevel::Low => Significance::Cosmetic,
            ImpactLevel::Medium => Significance::Notable,
            ImpactLevel::High => Significance::Critical,
        }
    }
}

impl std::fmt::Display for Significance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Significance::Cosmetic => write!(f, "cosmetic"),
            Significance::Notable => write!(f, "notable"),
            Significance::Critical => write!(f, "critical"),
        }
    }
}

/// One difference between the compared versions.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, serde::Serialize)]
pub struct ComparisonDetail {
    pub entity_type: String,
    pub entity_id: String,
    /// Field name, or `None` for whole-entity add/remove.
    pub property: Option<String>,
    pub path: String,
    pub change_type: ChangeType,
    /// Value in the source version, as JSON.
    pub old_value: Option<String>,
    /// Value in the target version, as JSON.
    pub new_value: Option<String>,
    pub impact: ImpactLevel,
    pub significance: Significance,
}

impl From<FieldDelta> for ComparisonDetail {
    fn from(delta: FieldDelta) -> Self {
        Self {
            entity_type: delta.entity_type,
            entity_id: delta.entity_id,
            property: delta.property,
            path: delta.path,
            change_type: delta.change_type,
            old_value: delta.old_value.as_ref().map(ContentValue::render),
            new_value: delta.new_value.as_ref().map(ContentValue::render),
            impact: delta.impact,
            significance: delta.impact.into(),
        }
    }
}

/// Difference between a source and a target version.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, serde::Serialize)]
pub struct VersionComparison {
    /// Record identifier, derived from (source, target, type).
    pub id: u64,
    pub source: VersionId,
    pub target: VersionId,
    pub source_catalog: CatalogId,
    pub target_catalog: CatalogId,
    pub comparison_type: ComparisonType,
    /// Equal fields over considered fields, as a percentage with two decimals.
    pub similarity: f64,
    pub fields_equal: u64,
    pub fields_total: u64,
    /// Whether the versions belong to different catalogs.
    pub is_cross_catalog: bool,
    /// Differences kept for this comparison type.
    pub details: Vec<ComparisonDetail>,
    pub added: u32,
    pub modified: u32,
    pub removed: u32,
    pub compared_by: ActorId,
    /// When computed (microseconds since epoch).
    pub computed_at: u64,
}

impl_record!(VersionComparison, RecordKind::Comparison, |c| c.id);

impl VersionComparison {
    /// Build a comparison from a diff of source against target.
    pub(crate) fn from_diff(
        id: u64,
        source: (VersionId, CatalogId),
        target: (VersionId, CatalogId),
        comparison_type: ComparisonType,
        diff: StructuralDiff,
        compared_by: ActorId,
    ) -> Self {
        let similarity = diff.similarity();
        let (mut added, mut modified, mut removed) = (0, 0, 0);
        for delta in &diff.deltas {
            match delta.change_type {
                ChangeType::Added => added += 1,
                ChangeType::Modified => modified += 1,
                ChangeType::Removed => removed += 1,
            }
        }

        let details: Vec<ComparisonDetail> = match comparison_type {
            ComparisonType::Full => diff.deltas.into_iter().map(Into::into).collect(),
            ComparisonType::Summary => Vec::new(),
            ComparisonType::CriticalOnly => diff
                .deltas
                .into_iter()
                .map(ComparisonDetail::from)
                .filter(|d| d.significance == Significance::Critical)
                .collect(),
        };

        Self {
            id,
            source: source.0,
            target: target.0,
            source_catalog: source.1,
            target_catalog: target.1,
            comparison_type,
            similarity,
            fields_equal: diff.fields_equal as u64,
            fields_total: diff.fields_total as u64,
            is_cross_catalog: source.1 != target.1,
            details,
            added,
            modified,
            removed,
            compared_by,
            computed_at: current_timestamp(),
        }
    }

    /// Total number of differences, whatever the comparison type kept.
    pub fn difference_count(&self) -> u32 {
        self.added + self.modified + self.removed
    }

    /// Check if the versions have equal content.
    pub fn is_identical_content(&self) -> bool {
        self.difference_count() == 0
    }
}
