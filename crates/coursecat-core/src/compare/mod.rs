//! Version comparison.
//!
//! Any two versions can be compared, adjacent or not, in the same catalog or
//! across catalogs. Results are cached in memory and persisted per ordered
//! (source, target, type) triple.

mod cache;
mod comparator;
mod comparison;

pub use cache::{CacheStats, ComparisonCache, ComparisonKey};
pub use comparator::VersionComparator;
pub use comparison::{ComparisonDetail, ComparisonType, Significance, VersionComparison};
