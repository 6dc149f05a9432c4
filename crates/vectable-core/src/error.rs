//! Errors surfaced by the search engine

use thiserror::Error;

use crate::record::RecordId;
use crate::store::StoreError;

/// Rejected input, detected before any store access
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Non-finite component at index {index}")]
    NonFinite { index: usize },

    #[error("Vector magnitude exceeds f32 range")]
    MagnitudeOverflow,

    #[error("Invalid stage count: {0} (must be at least 1)")]
    InvalidStages(usize),

    #[error("Vector dimension must be at least 1")]
    EmptyDimension,
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store failure: {0}")]
    Storage(#[source] StoreError),

    #[error("Record not found: {0}")]
    NotFound(RecordId),
}

impl From<StoreError> for SearchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => SearchError::NotFound(id),
            other => SearchError::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SearchError>;
