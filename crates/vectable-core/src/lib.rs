//! Vectable Core – vector math, sign-bit quantization, and similarity search
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 SearchEngine (facade)                       │
//! │   upsert · delete · search · search_with_hamming · staged   │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │  CandidateFilter             │  StagedSearch                │
//! │  exact · Hamming + rerank    │  prefix refinement           │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │        simd (cosine, normalize) · quantize (codes)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │           RecordStore trait (MemoryStore, SQLite, …)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod engine;
pub mod error;
pub mod filter;
pub mod quantize;
pub mod record;
pub mod simd;
pub mod staged;
pub mod store;

pub use engine::{EngineConfig, SearchEngine};
pub use error::{SearchError, ValidationError};
pub use quantize::{hamming_distance, quantize, BinaryCode};
pub use record::{PreparedVector, RecordId, SearchHit, VectorRecord};
pub use simd::{cosine_similarity, dot_product, magnitude, normalize};
pub use store::{MemoryStore, RecordStore, StoreError};
