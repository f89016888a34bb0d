//! In-memory record store.

use super::{RecordKind, RecordStore, Revision, StoreError, StoredRecord, WriteBatch};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

/// Record store held entirely in memory.
///
/// Same commit semantics as [`super::SledStore`]; nothing survives a drop.
pub struct MemoryStore {
    records: Mutex<BTreeMap<(RecordKind, u64), (Revision, Vec<u8>)>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of records across all kinds.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Check if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryStore {
    fn load(&self, kind: RecordKind, id: u64) -> Result<Option<StoredRecord>, StoreError> {
        let records = self.records.lock();
        Ok(records.get(&(kind, id)).map(|(revision, payload)| StoredRecord {
            id,
            revision: *revision,
            payload: payload.clone(),
        }))
    }

    fn list(&self, kind: RecordKind) -> Result<Vec<StoredRecord>, StoreError> {
        let records = self.records.lock();
        Ok(records
            .range((kind, 0)..=(kind, u64::MAX))
            .map(|(&(_, id), (revision, payload))| StoredRecord {
                id,
                revision: *revision,
                payload: payload.clone(),
            })
            .collect())
    }

    fn allocate_id(&self, _kind: RecordKind) -> Result<u64, StoreError> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut records = self.records.lock();

        // Revisions as they would be after each staged write, so a batch
        // touching one record twice checks against its own earlier write.
        let mut staged: HashMap<(RecordKind, u64), Revision> = HashMap::new();

        for write in batch.writes() {
            let key = (write.kind, write.id);
            let current = staged
                .get(&key)
                .copied()
                .or_else(|| records.get(&key).map(|(revision, _)| *revision));

            if !write.expect.matches(current) {
                return Err(StoreError::Conflict {
                    kind: write.kind,
                    id: write.id,
                });
            }
            staged.insert(key, current.map_or(1, |revision| revision + 1));
        }

        for write in batch.writes() {
            let key = (write.kind, write.id);
            let next = records.get(&key).map_or(1, |(revision, _)| revision + 1);
            records.insert(key, (next, write.payload.clone()));
        }

        Ok(())
    }
}
