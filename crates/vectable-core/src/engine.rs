//! Search engine facade
//!
//! Validates input, prepares vectors (normalization, magnitude, binary code)
//! and delegates to the store and the ranking strategies. The engine keeps no
//! mutable state of its own, so one instance can serve concurrent callers as
//! long as the store is thread-safe.

use std::sync::Arc;

use crate::error::{Result, ValidationError};
use crate::filter::CandidateFilter;
use crate::quantize::{quantize, BinaryCode};
use crate::record::{PreparedVector, RecordId, SearchHit, VectorRecord};
use crate::simd::{normalize, DEFAULT_EPSILON};
use crate::staged::StagedSearch;
use crate::store::{RecordStore, StoreError};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Dimension of every vector in the collection
    pub dim: usize,
    /// Magnitude substituted for zero vectors
    pub epsilon: f32,
    /// Result size for `search`
    pub default_n: usize,
    /// Result size for `search_with_hamming`
    pub default_hamming_n: usize,
    /// Stage count for `staged_search`
    pub default_stages: usize,
    /// Result size for `staged_search`
    pub default_staged_n: usize,
    /// Score staged-search candidates on the rayon pool
    pub parallel_stages: bool,
}

impl EngineConfig {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            epsilon: DEFAULT_EPSILON,
            default_n: 10,
            default_hamming_n: 10,
            default_stages: 4,
            default_staged_n: 50,
            parallel_stages: true,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.dim == 0 {
            return Err(ValidationError::EmptyDimension);
        }
        if self.default_stages == 0 {
            return Err(ValidationError::InvalidStages(0));
        }
        Ok(())
    }
}

pub struct SearchEngine<S: RecordStore + ?Sized> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: RecordStore + ?Sized> SearchEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Insert a vector, or fully replace the vector stored under `id`
    pub fn upsert(&self, raw: Vec<f32>, id: Option<RecordId>) -> Result<RecordId> {
        let prepared = self.prepare(raw)?;
        let id = self.store.upsert(prepared, id)?;
        tracing::debug!(id = id.0, "upserted vector");
        Ok(id)
    }

    /// Insert many vectors in one transaction
    ///
    /// Every vector is validated before anything is written.
    pub fn upsert_batch(&self, raws: Vec<Vec<f32>>) -> Result<Vec<RecordId>> {
        let prepared = raws
            .into_iter()
            .map(|raw| self.prepare(raw))
            .collect::<Result<Vec<_>>>()?;
        let ids = self.store.insert_batch(prepared)?;
        tracing::info!("inserted {} vectors", ids.len());
        Ok(ids)
    }

    /// Remove a record; `false` when no record had that id
    pub fn delete(&self, id: RecordId) -> Result<bool> {
        let removed = self.store.delete(id)?;
        if !removed {
            tracing::debug!(id = id.0, "delete of missing id ignored");
        }
        Ok(removed)
    }

    pub fn fetch(&self, ids: &[RecordId]) -> Result<Vec<VectorRecord>> {
        Ok(self.store.fetch_by_ids(ids)?)
    }

    pub fn fetch_all(&self) -> Result<Vec<VectorRecord>> {
        let records = self
            .store
            .fetch_all()?
            .collect::<std::result::Result<Vec<_>, StoreError>>()?;
        Ok(records)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.store.count()?)
    }

    /// Quantized code of `raw` after normalization
    pub fn binary_code(&self, raw: &[f32]) -> Result<BinaryCode> {
        self.validate_vector(raw)?;
        Ok(quantize(&normalize(raw, None, self.config.epsilon)))
    }

    /// Exact cosine search over the full collection, `O(N·D)`
    pub fn search(&self, query: &[f32], n: Option<usize>) -> Result<Vec<SearchHit>> {
        self.validate_vector(query)?;
        let n = n.unwrap_or(self.config.default_n);
        if n == 0 {
            return Ok(Vec::new());
        }

        let normalized = normalize(query, None, self.config.epsilon);
        let hits = CandidateFilter::new(self.store.as_ref()).exact(&normalized, n)?;
        tracing::debug!("exact search returned {} hits", hits.len());
        Ok(hits)
    }

    /// Hamming-distance prefilter of `n` candidates, reranked by cosine
    pub fn search_with_hamming(&self, query: &[f32], n: Option<usize>) -> Result<Vec<SearchHit>> {
        self.validate_vector(query)?;
        let n = n.unwrap_or(self.config.default_hamming_n);
        if n == 0 {
            return Ok(Vec::new());
        }

        let normalized = normalize(query, None, self.config.epsilon);
        let code = quantize(&normalized);
        let hits = CandidateFilter::new(self.store.as_ref()).hamming(&normalized, &code, n)?;
        tracing::debug!(code = %code, "hamming search returned {} hits", hits.len());
        Ok(hits)
    }

    /// Staged multi-resolution search, see [`StagedSearch`]
    pub fn staged_search(
        &self,
        query: &[f32],
        stages: Option<usize>,
        n: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        self.validate_vector(query)?;
        let stages = stages.unwrap_or(self.config.default_stages);
        if stages == 0 {
            return Err(ValidationError::InvalidStages(stages).into());
        }
        let n = n.unwrap_or(self.config.default_staged_n);
        if n == 0 {
            return Ok(Vec::new());
        }

        let records = self.fetch_all()?;
        let mut staged = StagedSearch::new(stages, self.config.epsilon);
        if !self.config.parallel_stages {
            staged = staged.sequential();
        }

        let outcome = staged.run(query, records, n);
        tracing::info!(
            stages = outcome.stages.len(),
            "staged search returning {} candidates",
            outcome.hits.len()
        );
        Ok(outcome.hits)
    }

    fn prepare(&self, raw: Vec<f32>) -> Result<PreparedVector> {
        self.validate_vector(&raw)?;
        let prepared = PreparedVector::from_raw(raw, self.config.epsilon);
        // The stored magnitude is an f32
        if !prepared.magnitude().is_finite() {
            return Err(ValidationError::MagnitudeOverflow.into());
        }
        Ok(prepared)
    }

    fn validate_vector(&self, v: &[f32]) -> std::result::Result<(), ValidationError> {
        if v.len() != self.config.dim {
            return Err(ValidationError::DimensionMismatch {
                expected: self.config.dim,
                actual: v.len(),
            });
        }
        if let Some(index) = v.iter().position(|x| !x.is_finite()) {
            return Err(ValidationError::NonFinite { index });
        }
        Ok(())
    }
}
