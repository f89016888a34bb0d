//! Catalog content snapshots and structural diffing.
//!
//! A snapshot is a tree of records, lists and scalars. Change tracking and
//! version comparison both run the same walk in [`StructuralDiff`], driven
//! by a [`DiffPolicy`] that decides how list elements pair up and how much
//! each field matters.

mod diff;
mod policy;
mod value;

pub use diff::{ChangeType, FieldDelta, StructuralDiff, ROOT_ENTITY, ROOT_ID};
pub use policy::{DiffPolicy, FieldClass, ImpactLevel, ListMatching};
pub use value::ContentValue;
