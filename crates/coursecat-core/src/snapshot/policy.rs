//! Field classification and list matching rules.

use rkyv::{Archive, Deserialize, Serialize};
use std::collections::BTreeMap;

/// Impact of a change on students and scheduling.
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
pub enum ImpactLevel {
    /// Descriptive only.
    Low,
    /// Affects scheduling or enrollment limits.
    Medium,
    /// Affects identity, capacity or credit.
    High,
}

impl std::fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImpactLevel::Low => write!(f, "low"),
            ImpactLevel::Medium => write!(f, "medium"),
            ImpactLevel::High => write!(f, "high"),
        }
    }
}

/// What a field carries, which determines its impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldClass {
    /// Identifies an entity (codes, numbers).
    Identity,
    /// Capacity or credit bearing.
    Capacity,
    /// Meeting times and places.
    Scheduling,
    /// Enrollment and waitlist limits.
    EnrollmentLimit,
    /// Everything else.
    Descriptive,
}

impl FieldClass {
    /// Impact level of a change to a field of this class.
    pub fn impact(self) -> ImpactLevel {
        match self {
            FieldClass::Identity | FieldClass::Capacity => ImpactLevel::High,
            FieldClass::Scheduling | FieldClass::EnrollmentLimit => ImpactLevel::Medium,
            FieldClass::Descriptive => ImpactLevel::Low,
        }
    }
}

/// How elements of a list field are paired between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "match")]
pub enum ListMatching {
    /// Pair elements by index.
    Positional,
    /// Pair record elements by the value of a key field.
    Keyed {
        /// Field holding the element key.
        key: String,
    },
}

/// Classification and matching rules for structural diffs.
///
/// Paths are patterns: field names joined by `.`, with `[]` marking list
/// elements, e.g. `courses[].sections`. Path rules win over field-name rules.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DiffPolicy {
    /// List matching by list path pattern. Unlisted lists match positionally.
    pub lists: BTreeMap<String, ListMatching>,
    /// Field class by full path pattern.
    pub path_classes: BTreeMap<String, FieldClass>,
    /// Field class by bare field name.
    pub field_classes: BTreeMap<String, FieldClass>,
    /// Impact of adding or removing a whole entity.
    pub entity_impact: ImpactLevel,
    /// Class of fields matching no rule.
    pub default_class: FieldClass,
}

impl Default for DiffPolicy {
    fn default() -> Self {
        Self::course_catalog()
    }
}

impl DiffPolicy {
    /// Policy with no rules: positional lists, everything descriptive.
    pub fn empty() -> Self {
        Self {
            lists: BTreeMap::new(),
            path_classes: BTreeMap::new(),
            field_classes: BTreeMap::new(),
            entity_impact: ImpactLevel::High,
            default_class: FieldClass::Descriptive,
        }
    }

    /// Rules for a course catalog document.
    pub fn course_catalog() -> Self {
        let mut policy = Self::empty()
            .with_list("courses", ListMatching::Keyed { key: "code".into() })
            .with_list(
                "courses[].sections",
                ListMatching::Keyed {
                    key: "section_id".into(),
                },
            );

        let groups: [(FieldClass, &[&str]); 4] = [
            (
                FieldClass::Identity,
                &["id", "code", "course_code", "section_id", "catalog_number", "subject"],
            ),
            (
                FieldClass::Capacity,
                &[
                    "credits",
                    "credit_hours",
                    "min_credits",
                    "max_credits",
                    "capacity",
                    "max_capacity",
                    "seats",
                ],
            ),
            (
                FieldClass::Scheduling,
                &[
                    "schedule",
                    "meeting_days",
                    "days",
                    "start_time",
                    "end_time",
                    "room",
                    "term",
                    "session",
                    "start_date",
                    "end_date",
                ],
            ),
            (
                FieldClass::EnrollmentLimit,
                &[
                    "enrollment_limit",
                    "max_enrollment",
                    "min_enrollment",
                    "waitlist_limit",
                    "waitlist_capacity",
                ],
            ),
        ];

        for (class, fields) in groups {
            for field in fields {
                policy.field_classes.insert((*field).to_string(), class);
            }
        }
        policy
    }

    /// Set list matching for a list path pattern.
    pub fn with_list(mut self, pattern: impl Into<String>, matching: ListMatching) -> Self {
        self.lists.insert(pattern.into(), matching);
        self
    }

    /// Classify a bare field name.
    pub fn with_field(mut self, field: impl Into<String>, class: FieldClass) -> Self {
        self.field_classes.insert(field.into(), class);
        self
    }

    /// Classify a full path pattern.
    pub fn with_path(mut self, pattern: impl Into<String>, class: FieldClass) -> Self {
        self.path_classes.insert(pattern.into(), class);
        self
    }

    /// Set the impact of whole-entity add/remove.
    pub fn with_entity_impact(mut self, impact: ImpactLevel) -> Self {
        self.entity_impact = impact;
        self
    }

    /// List matching for a list path pattern.
    pub fn list_matching(&self, pattern: &str) -> &ListMatching {
        self.lists.get(pattern).unwrap_or(&ListMatching::Positional)
    }

    /// Impact of a change at `pattern`.
    ///
    /// `property` is `None` for whole-entity add/remove.
    pub fn classify(&self, pattern: &str, property: Option<&str>) -> ImpactLevel {
        let Some(property) = property else {
            return self.entity_impact;
        };

        if let Some(class) = self.path_classes.get(pattern) {
            return class.impact();
        }
        self.field_classes
            .get(property)
            .copied()
            .unwrap_or(self.default_class)
            .impact()
    }
}
