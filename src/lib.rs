//! Vectable: cosine similarity search over stored embeddings
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        CLI (clap)                           │
//! │     upsert · ingest · search · search-hamming · staged      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  SearchEngine (vectable-core)               │
//! │   exact scan · Hamming prefilter + rerank · staged search   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                SqliteRecordStore (sqlite3 shell)            │
//! │            <collection>_vectors, one row per vector         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod config;

pub use vectable_core::{engine, error, filter, quantize, record, simd, staged, store};

pub use catalog::SqliteRecordStore;
pub use config::AppConfig;
pub use vectable_core::{
    EngineConfig, MemoryStore, RecordId, RecordStore, SearchEngine, SearchError, SearchHit,
    VectorRecord,
};
