//! Persistence contract for engine records.
//!
//! The engine never talks to a database directly. Every record it owns is
//! written through a [`RecordStore`], which offers load/list by identifier
//! and an atomic, precondition-checked batch commit. Optimistic concurrency
//! is expressed per write with [`Expect`]:
//!
//! | Expect | Meaning |
//! |--------|---------|
//! | `Any` | Unconditional save |
//! | `Absent` | Insert only; fails if the record exists |
//! | `Revision(r)` | Save-if-unchanged; fails unless the stored revision is `r` |
//!
//! A failed precondition aborts the whole batch with [`StoreError::Conflict`].

pub(crate) mod codec;
mod memory;
mod sled_store;

pub use codec::{Record, Tracked};
pub(crate) use codec::{impl_record, list_records, load_record, stage_record};
pub use memory::MemoryStore;
pub use sled_store::SledStore;

use thiserror::Error;

/// Revision token for a stored record. Starts at 1 and increments on every write.
pub type Revision = u64;

/// Kind of record held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordKind {
    /// Catalog headers.
    Catalog,
    /// Catalog versions.
    Version,
    /// Change sets recorded for a version.
    ChangeSet,
    /// Approval workflows.
    Workflow,
    /// Terminal approval records.
    Approval,
    /// Cached version comparisons.
    Comparison,
}

impl RecordKind {
    /// All record kinds.
    pub const ALL: [RecordKind; 6] = [
        RecordKind::Catalog,
        RecordKind::Version,
        RecordKind::ChangeSet,
        RecordKind::Workflow,
        RecordKind::Approval,
        RecordKind::Comparison,
    ];

    /// Single-byte tag used as a key prefix.
    pub fn tag(self) -> u8 {
        match self {
            RecordKind::Catalog => 1,
            RecordKind::Version => 2,
            RecordKind::ChangeSet => 3,
            RecordKind::Workflow => 4,
            RecordKind::Approval => 5,
            RecordKind::Comparison => 6,
        }
    }

    /// Resolve a key prefix tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            RecordKind::Catalog => "catalog",
            RecordKind::Version => "version",
            RecordKind::ChangeSet => "change_set",
            RecordKind::Workflow => "workflow",
            RecordKind::Approval => "approval",
            RecordKind::Comparison => "comparison",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A raw record as held by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    /// Record identifier (unique per kind).
    pub id: u64,
    /// Current revision token.
    pub revision: Revision,
    /// Serialized record body.
    pub payload: Vec<u8>,
}

/// Write precondition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// No precondition.
    Any,
    /// The record must not exist yet.
    Absent,
    /// The record must exist at exactly this revision.
    Revision(Revision),
}

impl Expect {
    /// Check the precondition against the currently stored revision.
    pub fn matches(self, current: Option<Revision>) -> bool {
        match (self, current) {
            (Expect::Any, _) => true,
            (Expect::Absent, None) => true,
            (Expect::Absent, Some(_)) => false,
            (Expect::Revision(expected), Some(actual)) => expected == actual,
            (Expect::Revision(_), None) => false,
        }
    }
}

/// A single write inside a batch.
#[derive(Debug, Clone)]
pub struct Write {
    /// Record kind.
    pub kind: RecordKind,
    /// Record identifier.
    pub id: u64,
    /// Precondition checked at commit time.
    pub expect: Expect,
    /// Serialized record body.
    pub payload: Vec<u8>,
}

/// An ordered set of writes committed atomically.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<Write>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a write.
    pub fn put(
        &mut self,
        kind: RecordKind,
        id: u64,
        expect: Expect,
        payload: Vec<u8>,
    ) -> &mut Self {
        self.writes.push(Write {
            kind,
            id,
            expect,
            payload,
        });
        self
    }

    /// Append all writes from another batch.
    pub fn extend(&mut self, other: WriteBatch) -> &mut Self {
        self.writes.extend(other.writes);
        self
    }

    /// Queued writes in commit order.
    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    /// Number of queued writes.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Errors raised by a record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying sled failure.
    #[error("storage error: {0}")]
    Sled(#[from] sled::Error),

    /// A write precondition did not hold.
    #[error("write conflict on {kind} {id}")]
    Conflict {
        /// Kind of the conflicting record.
        kind: RecordKind,
        /// Identifier of the conflicting record.
        id: u64,
    },

    /// A stored value could not be decoded.
    #[error("corrupt {kind} record {id}: {reason}")]
    Corrupt {
        /// Kind of the corrupt record.
        kind: RecordKind,
        /// Identifier of the corrupt record.
        id: u64,
        /// What was wrong with it.
        reason: String,
    },
}

/// Persistence collaborator used by every engine component.
///
/// Implementations must commit a [`WriteBatch`] atomically: either every
/// precondition holds and every write lands, or nothing changes.
pub trait RecordStore: Send + Sync {
    /// Load a record by kind and identifier.
    fn load(&self, kind: RecordKind, id: u64) -> Result<Option<StoredRecord>, StoreError>;

    /// List all records of a kind, ordered by identifier.
    fn list(&self, kind: RecordKind) -> Result<Vec<StoredRecord>, StoreError>;

    /// Allocate a fresh identifier. Identifiers are never reused.
    fn allocate_id(&self, kind: RecordKind) -> Result<u64, StoreError>;

    /// Commit a batch of writes atomically.
    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Flush pending writes to durable storage.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Unconditionally save a single record.
    fn save(&self, kind: RecordKind, id: u64, payload: Vec<u8>) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.put(kind, id, Expect::Any, payload);
        self.commit(batch)
    }

    /// Save a single record only if it is still at `expected`.
    fn save_if_unchanged(
        &self,
        kind: RecordKind,
        id: u64,
        expected: Revision,
        payload: Vec<u8>,
    ) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.put(kind, id, Expect::Revision(expected), payload);
        self.commit(batch)
    }
}

/// Get current timestamp in microseconds since Unix epoch.
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
