//! On-disk database holding the record store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use coursecat_core::{RecordStore, SledStore};
use tracing::info;

use crate::error::Error;

/// Directory under the data path holding the sled database.
const RECORDS_DIR: &str = "records";

/// sled database wrapper providing the engine's record store.
pub struct Database {
    store: Arc<SledStore>,
    data_path: Option<PathBuf>,
}

impl Database {
    /// Open a database at the given path, creating it if needed.
    pub fn open(data_path: &Path) -> Result<Self, Error> {
        std::fs::create_dir_all(data_path).map_err(|e| {
            Error::Database(format!("failed to create data directory: {}", e))
        })?;

        let db = sled::open(data_path.join(RECORDS_DIR))
            .map_err(|e| Error::Database(format!("failed to open records db: {}", e)))?;
        let store = SledStore::open(&db)
            .map_err(|e| Error::Database(format!("failed to open record store: {}", e)))?;

        info!(data_path = %data_path.display(), "database opened");
        Ok(Self {
            store: Arc::new(store),
            data_path: Some(data_path.to_path_buf()),
        })
    }

    /// Open a temporary database that is removed on drop.
    pub fn temporary() -> Result<Self, Error> {
        let store = SledStore::temporary()
            .map_err(|e| Error::Database(format!("failed to open temporary store: {}", e)))?;
        Ok(Self {
            store: Arc::new(store),
            data_path: None,
        })
    }

    /// The record store, for handing to the engine.
    pub fn store(&self) -> Arc<dyn RecordStore> {
        self.store.clone()
    }

    /// The data directory, if on disk.
    pub fn data_path(&self) -> Option<&Path> {
        self.data_path.as_deref()
    }

    /// Bytes used on disk.
    pub fn size_on_disk(&self) -> Result<u64, Error> {
        self.store
            .db()
            .size_on_disk()
            .map_err(|e| Error::Database(format!("failed to read size: {}", e)))
    }

    /// Flush pending writes.
    pub fn flush(&self) -> Result<(), Error> {
        self.store
            .flush()
            .map_err(|e| Error::Database(format!("failed to flush: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data");

        let database = Database::open(&path).unwrap();

        assert!(path.join(RECORDS_DIR).exists());
        assert_eq!(database.data_path(), Some(path.as_path()));
        database.flush().unwrap();
    }

    #[test]
    fn test_temporary() {
        let database = Database::temporary().unwrap();
        assert!(database.data_path().is_none());
        assert!(database.store().list(coursecat_core::store::RecordKind::Catalog).unwrap().is_empty());
    }
}
