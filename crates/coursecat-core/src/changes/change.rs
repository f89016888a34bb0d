//! Recorded version changes.

use crate::catalog::{ActorId, VersionId};
use crate::error::Error;
use crate::snapshot::{ChangeType, ContentValue, FieldDelta, ImpactLevel};
use crate::store::{impl_record, RecordKind};
use rkyv::{Archive, Deserialize, Serialize};

/// Whether a change of this type and impact needs review before promotion.
///
/// High impact always does. Medium impact does only for removals.
pub fn requires_approval(change_type: ChangeType, impact: ImpactLevel) -> bool {
    match impact {
        ImpactLevel::High => true,
        ImpactLevel::Medium => change_type == ChangeType::Removed,
        ImpactLevel::Low => false,
    }
}

/// One field-level change of a version relative to its predecessor.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, serde::Serialize)]
pub struct VersionChange {
    /// Version the change belongs to.
    pub version_id: VersionId,
    /// Position within the version's change set.
    pub sequence: u32,
    /// Type of the changed entity.
    pub entity_type: String,
    /// Identifier of the changed entity.
    pub entity_id: String,
    /// Field name, or `None` for whole-entity add/remove.
    pub property: Option<String>,
    /// Concrete location in the snapshot.
    pub path: String,
    /// Kind of change.
    pub change_type: ChangeType,
    /// Previous value as JSON.
    pub old_value: Option<String>,
    /// New value as JSON.
    pub new_value: Option<String>,
    /// Classified impact.
    pub impact: ImpactLevel,
    /// Whether the change needs review.
    pub requires_approval: bool,
    /// Who made the change.
    pub recorded_by: ActorId,
    /// When it was recorded (microseconds since epoch).
    pub recorded_at: u64,
}

impl VersionChange {
    pub(crate) fn from_delta(
        version_id: VersionId,
        sequence: u32,
        delta: FieldDelta,
        recorded_by: ActorId,
        recorded_at: u64,
    ) -> Self {
        Self {
            version_id,
            sequence,
            entity_type: delta.entity_type,
            entity_id: delta.entity_id,
            property: delta.property,
            path: delta.path,
            change_type: delta.change_type,
            old_value: delta.old_value.as_ref().map(ContentValue::render),
            new_value: delta.new_value.as_ref().map(ContentValue::render),
            impact: delta.impact,
            requires_approval: requires_approval(delta.change_type, delta.impact),
            recorded_by,
            recorded_at,
        }
    }

    /// Decode the previous value.
    pub fn old_content(&self) -> Result<Option<ContentValue>, Error> {
        decode(self.old_value.as_deref())
    }

    /// Decode the new value.
    pub fn new_content(&self) -> Result<Option<ContentValue>, Error> {
        decode(self.new_value.as_deref())
    }
}

fn decode(json: Option<&str>) -> Result<Option<ContentValue>, Error> {
    json.map(|s| ContentValue::from_bytes(s.as_bytes()))
        .transpose()
}

/// All changes recorded for one version.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, serde::Serialize)]
pub struct ChangeSet {
    /// Version the changes belong to.
    pub version_id: VersionId,
    /// Version they were computed against.
    pub previous_version: Option<VersionId>,
    /// Changes in walk order.
    pub changes: Vec<VersionChange>,
}

impl_record!(ChangeSet, RecordKind::ChangeSet, |c| c.version_id.0);

impl ChangeSet {
    /// Check if any change needs review.
    pub fn requires_approval(&self) -> bool {
        self.changes.iter().any(|c| c.requires_approval)
    }

    /// Highest impact among the changes.
    pub fn max_impact(&self) -> Option<ImpactLevel> {
        self.changes.iter().map(|c| c.impact).max()
    }

    /// Counts by type and impact.
    pub fn summary(&self) -> ChangeSummary {
        let mut summary = ChangeSummary::default();
        for change in &self.changes {
            summary.total += 1;
            match change.change_type {
                ChangeType::Added => summary.added += 1,
                ChangeType::Modified => summary.modified += 1,
                ChangeType::Removed => summary.removed += 1,
            }
            match change.impact {
                ImpactLevel::Low => summary.low_impact += 1,
                ImpactLevel::Medium => summary.medium_impact += 1,
                ImpactLevel::High => summary.high_impact += 1,
            }
            if change.requires_approval {
                summary.requiring_approval += 1;
            }
        }
        summary
    }
}

/// Counts over a change set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ChangeSummary {
    pub total: usize,
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    pub low_impact: usize,
    pub medium_impact: usize,
    pub high_impact: usize,
    pub requiring_approval: usize,
}

impl ChangeSummary {
    /// Check if any change needs review.
    pub fn requires_approval(&self) -> bool {
        self.requiring_approval > 0
    }
}
