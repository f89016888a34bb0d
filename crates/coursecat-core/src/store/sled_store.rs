//! sled-backed record store.

use super::{RecordKind, RecordStore, Revision, StoreError, StoredRecord, WriteBatch};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;

/// Size of the revision prefix in front of every stored payload.
const REVISION_SIZE: usize = 8;

/// Key layout: `[kind tag (1 byte)][id (8 bytes, big-endian)]`.
const KEY_SIZE: usize = 9;

/// Record store persisting to a single sled tree.
///
/// Big-endian identifiers keep each kind's records in identifier order, so
/// a prefix scan lists them sorted.
pub struct SledStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledStore {
    /// Tree name for engine records.
    pub const TREE_NAME: &'static str = "coursecat:records";

    /// Open or create the store inside an existing sled database.
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        let tree = db.open_tree(Self::TREE_NAME)?;
        Ok(Self {
            db: db.clone(),
            tree,
        })
    }

    /// Open or create a sled database at `path` and the store inside it.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::open(&db)
    }

    /// Open a temporary store that is deleted on drop.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::open(&db)
    }

    /// Get the underlying sled database.
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    fn record_key(kind: RecordKind, id: u64) -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        key[0] = kind.tag();
        key[1..].copy_from_slice(&id.to_be_bytes());
        key
    }

    fn decode_id(key: &[u8]) -> Option<u64> {
        if key.len() != KEY_SIZE {
            return None;
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&key[1..]);
        Some(u64::from_be_bytes(buf))
    }

    fn encode_value(revision: Revision, payload: &[u8]) -> Vec<u8> {
        let mut value = Vec::with_capacity(REVISION_SIZE + payload.len());
        value.extend_from_slice(&revision.to_be_bytes());
        value.extend_from_slice(payload);
        value
    }

    fn decode_revision(kind: RecordKind, id: u64, value: &[u8]) -> Result<Revision, StoreError> {
        if value.len() < REVISION_SIZE {
            return Err(StoreError::Corrupt {
                kind,
                id,
                reason: format!("value too short ({} bytes)", value.len()),
            });
        }
        let mut buf = [0u8; REVISION_SIZE];
        buf.copy_from_slice(&value[..REVISION_SIZE]);
        Ok(u64::from_be_bytes(buf))
    }

    fn decode_value(kind: RecordKind, id: u64, value: &[u8]) -> Result<StoredRecord, StoreError> {
        let revision = Self::decode_revision(kind, id, value)?;
        Ok(StoredRecord {
            id,
            revision,
            payload: value[REVISION_SIZE..].to_vec(),
        })
    }
}

impl RecordStore for SledStore {
    fn load(&self, kind: RecordKind, id: u64) -> Result<Option<StoredRecord>, StoreError> {
        let key = Self::record_key(kind, id);
        match self.tree.get(key)? {
            Some(value) => Ok(Some(Self::decode_value(kind, id, &value)?)),
            None => Ok(None),
        }
    }

    fn list(&self, kind: RecordKind) -> Result<Vec<StoredRecord>, StoreError> {
        let mut records = Vec::new();
        for result in self.tree.scan_prefix([kind.tag()]) {
            let (key, value) = result?;
            if let Some(id) = Self::decode_id(&key) {
                records.push(Self::decode_value(kind, id, &value)?);
            }
        }
        Ok(records)
    }

    fn allocate_id(&self, _kind: RecordKind) -> Result<u64, StoreError> {
        // generate_id starts at zero; identifiers start at one.
        Ok(self.db.generate_id()? + 1)
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let result: Result<(), TransactionError<StoreError>> = self.tree.transaction(|tx| {
            for write in batch.writes() {
                let key = Self::record_key(write.kind, write.id);
                let current = match tx.get(key)? {
                    Some(value) => Some(
                        Self::decode_revision(write.kind, write.id, &value)
                            .map_err(ConflictableTransactionError::Abort)?,
                    ),
                    None => None,
                };

                if !write.expect.matches(current) {
                    return Err(ConflictableTransactionError::Abort(StoreError::Conflict {
                        kind: write.kind,
                        id: write.id,
                    }));
                }

                let next = current.map_or(1, |revision| revision + 1);
                tx.insert(key.to_vec(), Self::encode_value(next, &write.payload))?;
            }
            Ok(())
        });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(StoreError::Sled(e)),
        }
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.tree.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Expect;

    #[test]
    fn test_save_and_load() {
        let store = SledStore::temporary().unwrap();

        store.save(RecordKind::Catalog, 7, b"hello".to_vec()).unwrap();
        let loaded = store.load(RecordKind::Catalog, 7).unwrap().unwrap();

        assert_eq!(loaded.id, 7);
        assert_eq!(loaded.revision, 1);
        assert_eq!(loaded.payload, b"hello");

        // Same id under another kind is a different record
        assert!(store.load(RecordKind::Version, 7).unwrap().is_none());
    }

    #[test]
    fn test_revision_increments() {
        let store = SledStore::temporary().unwrap();

        store.save(RecordKind::Workflow, 1, b"a".to_vec()).unwrap();
        store
            .save_if_unchanged(RecordKind::Workflow, 1, 1, b"b".to_vec())
            .unwrap();

        let loaded = store.load(RecordKind::Workflow, 1).unwrap().unwrap();
        assert_eq!(loaded.revision, 2);
        assert_eq!(loaded.payload, b"b");
    }

    #[test]
    fn test_stale_revision_conflicts() {
        let store = SledStore::temporary().unwrap();

        store.save(RecordKind::Catalog, 1, b"a".to_vec()).unwrap();
        store.save(RecordKind::Catalog, 1, b"b".to_vec()).unwrap();

        let err = store
            .save_if_unchanged(RecordKind::Catalog, 1, 1, b"c".to_vec())
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                kind: RecordKind::Catalog,
                id: 1
            }
        ));
        assert_eq!(
            store.load(RecordKind::Catalog, 1).unwrap().unwrap().payload,
            b"b"
        );
    }

    #[test]
    fn test_failed_batch_is_atomic() {
        let store = SledStore::temporary().unwrap();
        store.save(RecordKind::Version, 2, b"existing".to_vec()).unwrap();

        let mut batch = WriteBatch::new();
        batch
            .put(RecordKind::Version, 1, Expect::Absent, b"new".to_vec())
            .put(RecordKind::Version, 2, Expect::Absent, b"dup".to_vec());

        assert!(store.commit(batch).is_err());
        assert!(store.load(RecordKind::Version, 1).unwrap().is_none());
    }

    #[test]
    fn test_list_is_ordered_per_kind() {
        let store = SledStore::temporary().unwrap();
        for id in [300u64, 2, 1000] {
            store.save(RecordKind::Version, id, vec![id as u8]).unwrap();
        }
        store.save(RecordKind::Catalog, 5, vec![0]).unwrap();

        let ids: Vec<u64> = store
            .list(RecordKind::Version)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![2, 300, 1000]);
    }

    #[test]
    fn test_allocate_id_is_unique() {
        let store = SledStore::temporary().unwrap();
        let a = store.allocate_id(RecordKind::Catalog).unwrap();
        let b = store.allocate_id(RecordKind::Version).unwrap();
        assert!(a >= 1);
        assert_ne!(a, b);
    }

    #[test]
    fn test_persistence() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = SledStore::open_path(dir.path()).unwrap();
            store.save(RecordKind::Approval, 9, b"kept".to_vec()).unwrap();
            store.flush().unwrap();
        }

        {
            let store = SledStore::open_path(dir.path()).unwrap();
            let loaded = store.load(RecordKind::Approval, 9).unwrap().unwrap();
            assert_eq!(loaded.payload, b"kept");
        }
    }
}
