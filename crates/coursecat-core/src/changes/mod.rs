//! Field-level change tracking between adjacent versions.

mod change;
mod tracker;

pub use change::{requires_approval, ChangeSet, ChangeSummary, VersionChange};
pub use tracker::ChangeTracker;
