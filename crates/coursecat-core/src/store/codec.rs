//! Typed record encoding on top of the raw store.

use super::{Expect, RecordKind, RecordStore, Revision, WriteBatch};
use crate::error::Error;

/// A record type the engine persists through a [`RecordStore`].
pub trait Record: Sized {
    /// Kind this record is stored under.
    const KIND: RecordKind;

    /// Identifier this record is stored under.
    fn record_id(&self) -> u64;

    /// Serialize the record to bytes.
    fn to_bytes(&self) -> Result<Vec<u8>, Error>;

    /// Deserialize a record from bytes.
    fn from_bytes(bytes: &[u8]) -> Result<Self, Error>;
}

/// A record paired with the revision it was loaded at.
///
/// The revision is what optimistic writes are checked against.
#[derive(Debug, Clone, PartialEq)]
pub struct Tracked<T> {
    /// Revision the record was read at.
    pub revision: Revision,
    /// The decoded record.
    pub record: T,
}

impl<T> Tracked<T> {
    /// Discard the revision.
    pub fn into_inner(self) -> T {
        self.record
    }
}

impl<T> std::ops::Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.record
    }
}

/// Copy bytes into a buffer aligned for archived access.
///
/// Store payloads sit behind a revision prefix and carry no alignment guarantee.
pub(crate) fn aligned(bytes: &[u8]) -> rkyv::util::AlignedVec<16> {
    let mut buf = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
    buf.extend_from_slice(bytes);
    buf
}

/// Implement [`Record`] for an rkyv-archivable type.
macro_rules! impl_record {
    ($ty:ty, $kind:expr, |$rec:ident| $id:expr) => {
        impl $crate::store::Record for $ty {
            const KIND: $crate::store::RecordKind = $kind;

            fn record_id(&self) -> u64 {
                let $rec = self;
                $id
            }

            fn to_bytes(&self) -> Result<Vec<u8>, $crate::error::Error> {
                rkyv::to_bytes::<rkyv::rancor::Error>(self)
                    .map(|v| v.to_vec())
                    .map_err(|e| $crate::error::Error::Serialization(e.to_string()))
            }

            fn from_bytes(bytes: &[u8]) -> Result<Self, $crate::error::Error> {
                let buf = $crate::store::codec::aligned(bytes);
                rkyv::from_bytes::<Self, rkyv::rancor::Error>(&buf)
                    .map_err(|e| $crate::error::Error::Deserialization(e.to_string()))
            }
        }
    };
}

pub(crate) use impl_record;

/// Load and decode a record.
pub(crate) fn load_record<T: Record>(
    store: &dyn RecordStore,
    id: u64,
) -> Result<Option<Tracked<T>>, Error> {
    match store.load(T::KIND, id)? {
        Some(stored) => Ok(Some(Tracked {
            revision: stored.revision,
            record: T::from_bytes(&stored.payload)?,
        })),
        None => Ok(None),
    }
}

/// Load and decode every record of a kind.
pub(crate) fn list_records<T: Record>(store: &dyn RecordStore) -> Result<Vec<Tracked<T>>, Error> {
    store
        .list(T::KIND)?
        .into_iter()
        .map(|stored| {
            Ok(Tracked {
                revision: stored.revision,
                record: T::from_bytes(&stored.payload)?,
            })
        })
        .collect()
}

/// Encode a record and queue it on a batch.
pub(crate) fn stage_record<T: Record>(
    batch: &mut WriteBatch,
    record: &T,
    expect: Expect,
) -> Result<(), Error> {
    batch.put(T::KIND, record.record_id(), expect, record.to_bytes()?);
    Ok(())
}
