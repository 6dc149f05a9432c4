use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use vectable_core::engine::{EngineConfig, SearchEngine};
use vectable_core::simd::DEFAULT_EPSILON;

use crate::catalog::SqliteRecordStore;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub collection: String,
    pub dim: usize,
    pub epsilon: f32,
    pub parallel_stages: bool,
}

impl AppConfig {
    pub fn from_data_dir(data_dir: PathBuf, collection: String, dim: usize) -> Self {
        let epsilon = std::env::var("VECTABLE_EPSILON")
            .ok()
            .and_then(|v| v.parse::<f32>().ok())
            .filter(|e| *e > 0.0)
            .unwrap_or(DEFAULT_EPSILON);

        Self {
            data_dir,
            collection,
            dim,
            epsilon,
            parallel_stages: true,
        }
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join("vectable.sqlite3")
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::new(self.dim);
        config.epsilon = self.epsilon;
        config.parallel_stages = self.parallel_stages;
        config
    }

    /// Open the collection's store and wrap it in a search engine
    pub fn open_engine(&self) -> Result<SearchEngine<SqliteRecordStore>> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("creating data dir {:?}", self.data_dir))?;
        let store = SqliteRecordStore::open(&self.catalog_path(), &self.collection, self.dim)
            .with_context(|| format!("opening collection '{}'", self.collection))?;
        Ok(SearchEngine::new(Arc::new(store), self.engine_config())?)
    }
}
