//! Candidate ranking: exact cosine scan and Hamming prefilter + rerank
//!
//! Both strategies read the whole collection (the exact scan directly, the
//! Hamming path either through the store's code index or an in-process
//! scan), so a query costs `O(N·D)` in the worst case.

use std::cmp::Ordering;

use crate::quantize::{hamming_distance, BinaryCode};
use crate::record::{RecordId, SearchHit, VectorRecord};
use crate::simd::cosine_similarity;
use crate::store::{RecordStore, StoreError};

/// Stable descending sort by similarity
///
/// Equal scores keep their incoming order, so repeated queries over an
/// unchanged collection rank identically.
pub fn sort_by_similarity(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
}

/// Score every record against `query` and keep the best `n`
pub fn rank_exact<I>(query: &[f32], records: I, n: usize) -> Result<Vec<SearchHit>, StoreError>
where
    I: IntoIterator<Item = Result<VectorRecord, StoreError>>,
{
    let mut hits = Vec::new();
    for record in records {
        let record = record?;
        let similarity = cosine_similarity(query, &record.normalized_vector);
        hits.push(SearchHit::from_record(record, similarity));
    }
    sort_by_similarity(&mut hits);
    hits.truncate(n);
    Ok(hits)
}

/// In-process Hamming ranking: the `limit` ids nearest to `code`
///
/// Ordered by distance, then ascending id. Records whose code length differs
/// from the query's cannot be compared and rank after every comparable one.
pub fn rank_by_hamming<I>(
    code: &BinaryCode,
    records: I,
    limit: usize,
) -> Result<Vec<RecordId>, StoreError>
where
    I: IntoIterator<Item = Result<VectorRecord, StoreError>>,
{
    let mut ranked = Vec::new();
    for record in records {
        let record = record?;
        let distance = match hamming_distance(&record.binary_code, code) {
            Ok(d) => d,
            Err(err) => {
                tracing::warn!("record {} has an incomparable code: {}", record.id, err);
                u32::MAX
            }
        };
        ranked.push((distance, record.id));
    }
    ranked.sort_unstable();
    ranked.truncate(limit);
    Ok(ranked.into_iter().map(|(_, id)| id).collect())
}

/// Strategy runner bound to a store
pub struct CandidateFilter<'a, S: RecordStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: RecordStore + ?Sized> CandidateFilter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Exact cosine ranking over the full collection
    pub fn exact(&self, query_normalized: &[f32], n: usize) -> Result<Vec<SearchHit>, StoreError> {
        rank_exact(query_normalized, self.store.fetch_all()?, n)
    }

    /// The `n` ids with the smallest Hamming distance to `code`
    ///
    /// Uses the store's code index when it has one, otherwise scans.
    pub fn hamming_candidates(
        &self,
        code: &BinaryCode,
        n: usize,
    ) -> Result<Vec<RecordId>, StoreError> {
        match self.store.nearest_by_code(code, n)? {
            Some(ids) => Ok(ids),
            None => rank_by_hamming(code, self.store.fetch_all()?, n),
        }
    }

    /// Hamming prefilter followed by exact rerank of the survivors
    ///
    /// Trades recall for speed: a true neighbor whose sign pattern differs
    /// from the query's may never reach the rerank.
    pub fn hamming(
        &self,
        query_normalized: &[f32],
        code: &BinaryCode,
        n: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let candidates = self.hamming_candidates(code, n)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // Fetch order is unspecified; rerank in prefilter order so ties are stable.
        let mut fetched = self.store.fetch_by_ids(&candidates)?;
        fetched.sort_by_key(|r| {
            candidates
                .iter()
                .position(|id| *id == r.id)
                .unwrap_or(usize::MAX)
        });

        rank_exact(query_normalized, fetched.into_iter().map(Ok), n)
    }
}
