//! Catalogs and their version chains.
//!
//! A catalog owns a linear chain of immutable versions. At most one version
//! per catalog is current; [`CatalogVersionManager`] is the only writer of
//! that pointer.

mod catalog;
mod manager;
mod types;
mod version;

pub use catalog::{CatalogRecord, NewCatalog};
pub use manager::CatalogVersionManager;
pub(crate) use manager::ensure_follows_current;
pub use types::{ActorId, ApprovalStatus, CatalogId, CatalogStatus, VersionId, WorkflowId};
pub use version::{NewVersion, VersionRecord};
