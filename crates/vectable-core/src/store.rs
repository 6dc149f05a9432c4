//! Record storage
//!
//! [`RecordStore`] is the seam between the search core and whatever persists
//! vectors. The core asks for very little: atomic single-record writes,
//! bulk reads by id, a full scan and a count. Every search reads the whole
//! collection through [`RecordStore::fetch_all`], so a collection must fit
//! in memory for the filtering stage. That is the scale limit of this design;
//! a real index would replace the scan behind this trait.
//!
//! [`MemoryStore`] is the in-process implementation.

use std::collections::BTreeMap;
use std::error::Error as StdError;

use parking_lot::RwLock;
use thiserror::Error;

use crate::quantize::{hamming_distance, BinaryCode};
use crate::record::{now_unix_ts, PreparedVector, RecordId, VectorRecord};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(RecordId),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Storage backend error: {0}")]
    Backend(#[source] Box<dyn StdError + Send + Sync>),
}

impl StoreError {
    pub fn backend(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        StoreError::Backend(err.into())
    }
}

/// Lazy sequence of records produced by a full scan
pub type RecordIter<'a> = Box<dyn Iterator<Item = Result<VectorRecord, StoreError>> + 'a>;

/// Persistence contract consumed by the search engine
///
/// Each write stores the raw vector and all of its derived fields as one
/// unit. Implementations must be safe to share between threads.
pub trait RecordStore: Send + Sync {
    /// Insert when `id` is `None`, otherwise replace the record with that id.
    ///
    /// Replacing an id that does not exist fails with [`StoreError::NotFound`].
    fn upsert(&self, vector: PreparedVector, id: Option<RecordId>) -> Result<RecordId, StoreError>;

    /// Insert all vectors in one transaction, returning ids in input order.
    fn insert_batch(&self, vectors: Vec<PreparedVector>) -> Result<Vec<RecordId>, StoreError>;

    /// Records for the given ids; order is unspecified and missing ids are skipped.
    fn fetch_by_ids(&self, ids: &[RecordId]) -> Result<Vec<VectorRecord>, StoreError>;

    /// Every record, in a stable order for an unchanged collection.
    fn fetch_all(&self) -> Result<RecordIter<'_>, StoreError>;

    /// Remove a record. Deleting a missing id is a no-op that returns `false`.
    fn delete(&self, id: RecordId) -> Result<bool, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;

    /// Optional Hamming index: the `limit` ids closest to `code`, ordered by
    /// distance then ascending id. `None` means the capability is absent and
    /// the caller scans in-process.
    fn nearest_by_code(
        &self,
        _code: &BinaryCode,
        _limit: usize,
    ) -> Result<Option<Vec<RecordId>>, StoreError> {
        Ok(None)
    }
}

#[derive(Default)]
struct MemoryInner {
    next_id: u64,
    records: BTreeMap<RecordId, VectorRecord>,
}

impl MemoryInner {
    fn allocate_id(&mut self) -> RecordId {
        self.next_id += 1;
        RecordId(self.next_id)
    }
}

/// In-process [`RecordStore`]
///
/// Ids start at 1 and are never reused. Full scans return records in
/// ascending id order.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn upsert(&self, vector: PreparedVector, id: Option<RecordId>) -> Result<RecordId, StoreError> {
        let mut inner = self.inner.write();
        let id = match id {
            Some(id) if !inner.records.contains_key(&id) => return Err(StoreError::NotFound(id)),
            Some(id) => id,
            None => inner.allocate_id(),
        };
        inner.records.insert(id, vector.into_record(id, now_unix_ts()));
        Ok(id)
    }

    fn insert_batch(&self, vectors: Vec<PreparedVector>) -> Result<Vec<RecordId>, StoreError> {
        let mut inner = self.inner.write();
        let created = now_unix_ts();
        let mut ids = Vec::with_capacity(vectors.len());
        for vector in vectors {
            let id = inner.allocate_id();
            inner.records.insert(id, vector.into_record(id, created));
            ids.push(id);
        }
        Ok(ids)
    }

    fn fetch_by_ids(&self, ids: &[RecordId]) -> Result<Vec<VectorRecord>, StoreError> {
        let inner = self.inner.read();
        Ok(ids
            .iter()
            .filter_map(|id| inner.records.get(id).cloned())
            .collect())
    }

    fn fetch_all(&self) -> Result<RecordIter<'_>, StoreError> {
        // Point-in-time snapshot; the lock is not held while the caller iterates.
        let snapshot: Vec<VectorRecord> = self.inner.read().records.values().cloned().collect();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }

    fn delete(&self, id: RecordId) -> Result<bool, StoreError> {
        Ok(self.inner.write().records.remove(&id).is_some())
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().records.len())
    }

    fn nearest_by_code(
        &self,
        code: &BinaryCode,
        limit: usize,
    ) -> Result<Option<Vec<RecordId>>, StoreError> {
        let inner = self.inner.read();
        let mut ranked: Vec<(u32, RecordId)> = inner
            .records
            .values()
            .map(|r| {
                let distance = hamming_distance(&r.binary_code, code).unwrap_or(u32::MAX);
                (distance, r.id)
            })
            .collect();
        ranked.sort_unstable();
        ranked.truncate(limit);
        Ok(Some(ranked.into_iter().map(|(_, id)| id).collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantize::quantize;
    use crate::simd::{normalize, DEFAULT_EPSILON};

    fn prepared(raw: &[f32]) -> PreparedVector {
        PreparedVector::from_raw(raw.to_vec(), DEFAULT_EPSILON)
    }

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let a = store.upsert(prepared(&[1.0, 0.0]), None).unwrap();
        let b = store.upsert(prepared(&[0.0, 1.0]), None).unwrap();
        assert_eq!(a, RecordId(1));
        assert_eq!(b, RecordId(2));
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_update_replaces_every_derived_field() {
        let store = MemoryStore::new();
        let id = store.upsert(prepared(&[1.0, 1.0]), None).unwrap();
        let same = store.upsert(prepared(&[-2.0, 0.0]), Some(id)).unwrap();
        assert_eq!(same, id);

        let record = store.fetch_by_ids(&[id]).unwrap().remove(0);
        assert_eq!(record.raw_vector, vec![-2.0, 0.0]);
        assert_eq!(record.normalized_vector, normalize(&[-2.0, 0.0], None, DEFAULT_EPSILON));
        assert_eq!(record.magnitude, 2.0);
        assert_eq!(record.binary_code, quantize(&record.normalized_vector));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_update_missing_id_is_not_found() {
        let store = MemoryStore::new();
        let err = store.upsert(prepared(&[1.0]), Some(RecordId(99))).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(RecordId(99))));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        let id = store.upsert(prepared(&[1.0, 2.0]), None).unwrap();
        assert!(store.delete(id).unwrap());
        assert!(!store.delete(id).unwrap());
        assert!(store.fetch_by_ids(&[id]).unwrap().is_empty());
    }

    #[test]
    fn test_ids_are_not_reused_after_delete() {
        let store = MemoryStore::new();
        let a = store.upsert(prepared(&[1.0]), None).unwrap();
        store.delete(a).unwrap();
        let b = store.upsert(prepared(&[1.0]), None).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_fetch_all_in_id_order() {
        let store = MemoryStore::new();
        let ids = store
            .insert_batch(vec![prepared(&[1.0]), prepared(&[2.0]), prepared(&[3.0])])
            .unwrap();
        let scanned: Vec<RecordId> = store.fetch_all().unwrap().map(|r| r.unwrap().id).collect();
        assert_eq!(scanned, ids);
    }

    #[test]
    fn test_nearest_by_code_orders_by_distance_then_id() {
        let store = MemoryStore::new();
        // codes: 1100 -> 0C, 1000 -> 08, 1100 -> 0C, 0011 -> 03
        store
            .insert_batch(vec![
                prepared(&[1.0, 1.0, -1.0, -1.0]),
                prepared(&[1.0, -1.0, -1.0, -1.0]),
                prepared(&[2.0, 2.0, -1.0, -1.0]),
                prepared(&[-1.0, -1.0, 1.0, 1.0]),
            ])
            .unwrap();

        let query = quantize(&[1.0, 1.0, -1.0, -1.0]);
        let ids = store.nearest_by_code(&query, 3).unwrap().unwrap();
        assert_eq!(ids, vec![RecordId(1), RecordId(3), RecordId(2)]);
    }
}
