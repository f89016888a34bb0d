//! Structural diffing of content trees.
//!
//! Walks two snapshots in lockstep and produces one [`FieldDelta`] per
//! differing field, or per added/removed entity when list elements are
//! records. The same walk counts leaf fields for the similarity score:
//!
//! - an equal subtree counts its leaves as equal and considered;
//! - an added or removed subtree counts its leaves as considered;
//! - a changed scalar or shape counts the larger side as considered.

use super::policy::{DiffPolicy, ImpactLevel, ListMatching};
use super::value::ContentValue;
use std::collections::{BTreeMap, BTreeSet};

/// Entity type of fields directly on the snapshot root.
pub const ROOT_ENTITY: &str = "catalog";

/// Entity identifier of the snapshot root.
pub const ROOT_ID: &str = "root";

/// Kind of difference.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Present only in the newer snapshot.
    Added,
    /// Present in both with different values.
    Modified,
    /// Present only in the older snapshot.
    Removed,
}

impl ChangeType {
    /// The change type seen from the other direction.
    pub fn inverse(self) -> Self {
        match self {
            ChangeType::Added => ChangeType::Removed,
            ChangeType::Modified => ChangeType::Modified,
            ChangeType::Removed => ChangeType::Added,
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Added => write!(f, "added"),
            ChangeType::Modified => write!(f, "modified"),
            ChangeType::Removed => write!(f, "removed"),
        }
    }
}

/// One field-level difference.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDelta {
    /// Type of the entity owning the field.
    pub entity_type: String,
    /// Identifier of the entity owning the field.
    pub entity_id: String,
    /// Field name, or `None` when a whole entity was added or removed.
    pub property: Option<String>,
    /// Concrete location, e.g. `courses[CS101].credits`.
    pub path: String,
    /// Kind of difference.
    pub change_type: ChangeType,
    /// Value in the older snapshot.
    pub old_value: Option<ContentValue>,
    /// Value in the newer snapshot.
    pub new_value: Option<ContentValue>,
    /// Classified impact.
    pub impact: ImpactLevel,
}

impl FieldDelta {
    /// The same delta seen from the other direction.
    pub fn inverse(&self) -> Self {
        Self {
            change_type: self.change_type.inverse(),
            old_value: self.new_value.clone(),
            new_value: self.old_value.clone(),
            ..self.clone()
        }
    }

    /// Check if this delta adds or removes a whole entity.
    pub fn is_entity_change(&self) -> bool {
        self.property.is_none()
    }
}

/// Result of diffing two snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuralDiff {
    /// Differences in walk order.
    pub deltas: Vec<FieldDelta>,
    /// Leaf fields equal on both sides.
    pub fields_equal: usize,
    /// Leaf fields considered across both sides.
    pub fields_total: usize,
}

impl StructuralDiff {
    /// Diff `old` against `new`.
    pub fn compute(old: &ContentValue, new: &ContentValue, policy: &DiffPolicy) -> Self {
        let mut walker = Walker {
            policy,
            diff: StructuralDiff::default(),
        };
        walker.value(old, new, &Location::root());
        walker.diff
    }

    /// Every leaf field of `new` as an Added delta, as if diffed against
    /// nothing. List elements get the entity context a diff would give them.
    pub fn additions(new: &ContentValue, policy: &DiffPolicy) -> Self {
        let mut walker = Walker {
            policy,
            diff: StructuralDiff::default(),
        };
        if new != &ContentValue::empty_record() {
            walker.added(new, &Location::root());
        }
        walker.diff
    }

    /// Percentage of considered fields that are equal, rounded to two decimals.
    pub fn similarity(&self) -> f64 {
        if self.fields_total == 0 {
            return 100.0;
        }
        let ratio = self.fields_equal as f64 / self.fields_total as f64;
        (ratio * 10_000.0).round() / 100.0
    }

    /// Check if the snapshots are equal.
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    /// Highest impact among the deltas.
    pub fn max_impact(&self) -> Option<ImpactLevel> {
        self.deltas.iter().map(|d| d.impact).max()
    }
}

#[derive(Debug, Clone)]
struct Location {
    entity_type: String,
    entity_id: String,
    property: Option<String>,
    path: String,
    pattern: String,
}

impl Location {
    fn root() -> Self {
        Self {
            entity_type: ROOT_ENTITY.to_string(),
            entity_id: ROOT_ID.to_string(),
            property: None,
            path: String::new(),
            pattern: String::new(),
        }
    }

    fn field(&self, name: &str) -> Self {
        Self {
            entity_type: self.entity_type.clone(),
            entity_id: self.entity_id.clone(),
            property: Some(name.to_string()),
            path: join(&self.path, name),
            pattern: join(&self.pattern, name),
        }
    }

    fn element(&self, id: &str) -> Self {
        Self {
            entity_type: self.entity_type.clone(),
            entity_id: self.entity_id.clone(),
            property: self.property.clone(),
            path: format!("{}[{}]", self.path, id),
            pattern: format!("{}[]", self.pattern),
        }
    }

    fn as_entity(mut self, id: &str) -> Self {
        self.entity_type = self.property.clone().unwrap_or_else(|| "item".to_string());
        self.entity_id = id.to_string();
        self
    }
}

fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{base}.{name}")
    }
}

type Pair<'a> = (String, Option<&'a ContentValue>, Option<&'a ContentValue>);

struct Walker<'p> {
    policy: &'p DiffPolicy,
    diff: StructuralDiff,
}

impl Walker<'_> {
    fn value(&mut self, old: &ContentValue, new: &ContentValue, loc: &Location) {
        if old == new {
            let leaves = old.leaf_count();
            self.diff.fields_equal += leaves;
            self.diff.fields_total += leaves;
            return;
        }

        match (old, new) {
            (ContentValue::Record(a), ContentValue::Record(b)) => self.record(a, b, loc),
            (ContentValue::List(a), ContentValue::List(b)) => self.list(a, b, loc),
            _ => {
                self.diff.fields_total += old.leaf_count().max(new.leaf_count());
                self.push(
                    loc,
                    loc.property.as_deref(),
                    ChangeType::Modified,
                    Some(old),
                    Some(new),
                );
            }
        }
    }

    fn record(
        &mut self,
        old: &BTreeMap<String, ContentValue>,
        new: &BTreeMap<String, ContentValue>,
        loc: &Location,
    ) {
        let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
        for key in keys {
            let child = loc.field(key);
            match (old.get(key), new.get(key)) {
                (Some(o), Some(n)) => self.value(o, n, &child),
                (Some(o), None) => self.one_sided(o, &child, ChangeType::Removed, false),
                (None, Some(n)) => self.one_sided(n, &child, ChangeType::Added, false),
                (None, None) => {}
            }
        }
    }

    fn list(&mut self, old: &[ContentValue], new: &[ContentValue], loc: &Location) {
        let pairs = match self.policy.list_matching(&loc.pattern) {
            ListMatching::Keyed { key } => {
                keyed_pairs(old, new, key).unwrap_or_else(|| positional_pairs(old, new))
            }
            ListMatching::Positional => positional_pairs(old, new),
        };

        for (id, o, n) in pairs {
            let is_entity = o.is_some_and(ContentValue::is_record)
                || n.is_some_and(ContentValue::is_record);
            let child = loc.element(&id);
            let child = if is_entity { child.as_entity(&id) } else { child };

            match (o, n) {
                (Some(o), Some(n)) => self.value(o, n, &child),
                (Some(o), None) => self.one_sided(o, &child, ChangeType::Removed, is_entity),
                (None, Some(n)) => self.one_sided(n, &child, ChangeType::Added, is_entity),
                (None, None) => {}
            }
        }
    }

    fn added(&mut self, value: &ContentValue, loc: &Location) {
        match value {
            ContentValue::Record(fields) if !fields.is_empty() => {
                for (key, child) in fields {
                    self.added(child, &loc.field(key));
                }
            }
            ContentValue::List(items) if !items.is_empty() => {
                let pairs = match self.policy.list_matching(&loc.pattern) {
                    ListMatching::Keyed { key } => {
                        keyed_pairs(&[], items, key)
                            .unwrap_or_else(|| positional_pairs(&[], items))
                    }
                    ListMatching::Positional => positional_pairs(&[], items),
                };
                for (id, _, item) in pairs {
                    let Some(item) = item else { continue };
                    let child = loc.element(&id);
                    let child = if item.is_record() { child.as_entity(&id) } else { child };
                    self.added(item, &child);
                }
            }
            // Scalars and empty containers
            _ => {
                self.diff.fields_total += value.leaf_count().max(1);
                self.push(
                    loc,
                    loc.property.as_deref(),
                    ChangeType::Added,
                    None,
                    Some(value),
                );
            }
        }
    }

    fn one_sided(
        &mut self,
        value: &ContentValue,
        loc: &Location,
        change_type: ChangeType,
        whole_entity: bool,
    ) {
        self.diff.fields_total += value.leaf_count();
        let property = if whole_entity {
            None
        } else {
            loc.property.as_deref()
        };
        let (old, new) = match change_type {
            ChangeType::Removed => (Some(value), None),
            _ => (None, Some(value)),
        };
        self.push(loc, property, change_type, old, new);
    }

    fn push(
        &mut self,
        loc: &Location,
        property: Option<&str>,
        change_type: ChangeType,
        old: Option<&ContentValue>,
        new: Option<&ContentValue>,
    ) {
        let impact = self.policy.classify(&loc.pattern, property);
        self.diff.deltas.push(FieldDelta {
            entity_type: loc.entity_type.clone(),
            entity_id: loc.entity_id.clone(),
            property: property.map(str::to_string),
            path: loc.path.clone(),
            change_type,
            old_value: old.cloned(),
            new_value: new.cloned(),
            impact,
        });
    }
}

fn positional_pairs<'a>(old: &'a [ContentValue], new: &'a [ContentValue]) -> Vec<Pair<'a>> {
    (0..old.len().max(new.len()))
        .map(|i| (i.to_string(), old.get(i), new.get(i)))
        .collect()
}

/// Pair elements by key. `None` if any element lacks a usable key or a key repeats.
fn keyed_pairs<'a>(
    old: &'a [ContentValue],
    new: &'a [ContentValue],
    key: &str,
) -> Option<Vec<Pair<'a>>> {
    let mut slots: BTreeMap<String, (Option<&ContentValue>, Option<&ContentValue>)> =
        BTreeMap::new();

    for item in old {
        let k = item.get(key)?.key_string()?;
        let slot = slots.entry(k).or_default();
        if slot.0.is_some() {
            return None;
        }
        slot.0 = Some(item);
    }
    for item in new {
        let k = item.get(key)?.key_string()?;
        let slot = slots.entry(k).or_default();
        if slot.1.is_some() {
            return None;
        }
        slot.1 = Some(item);
    }

    Some(slots.into_iter().map(|(k, (o, n))| (k, o, n)).collect())
}
