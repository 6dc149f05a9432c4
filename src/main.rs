//! Vectable CLI
//!
//! Stores vectors in a SQLite-backed collection and searches them by cosine
//! similarity.
//!
//! # Usage
//!
//! ```bash
//! # Create the collection table
//! vectable --dim 4 init
//!
//! # Insert one vector, or a JSON array of vectors
//! vectable --dim 4 upsert --vector 0.1,0.2,0.3,0.4
//! vectable --dim 4 ingest --input vectors.json
//!
//! # Search
//! vectable --dim 4 search --query 0.1,0.2,0.3,0.4 -n 5
//! vectable --dim 4 search-hamming --query 0.1,0.2,0.3,0.4 -n 5
//! vectable --dim 4 staged --query 0.1,0.2,0.3,0.4 --stages 2 -n 50
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use vectable::config::AppConfig;
use vectable::RecordId;

#[derive(Parser)]
#[command(name = "vectable")]
#[command(about = "Cosine similarity search over stored embeddings")]
#[command(version)]
struct Cli {
    /// Directory holding the SQLite database
    #[arg(long, env = "VECTABLE_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Collection name; vectors live in <collection>_vectors
    #[arg(long, env = "VECTABLE_COLLECTION", default_value = "default")]
    collection: String,

    /// Vector dimension of the collection
    #[arg(long, env = "VECTABLE_DIM", default_value = "384")]
    dim: usize,

    /// Score staged-search candidates on the calling thread only
    #[arg(long)]
    sequential: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the collection table if it does not exist
    Init,

    /// Insert a vector, or replace the vector stored under --id
    Upsert {
        /// Vector (comma separated floats)
        #[arg(short, long, value_parser = parse_vector)]
        vector: ::std::vec::Vec<f32>,

        /// Existing record id to replace
        #[arg(long)]
        id: Option<u64>,
    },

    /// Insert a JSON list of vectors in one transaction
    ///
    /// Input format: JSON array of arrays [[0.1, ...], [0.2, ...]]
    Ingest {
        /// Input JSON file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Fetch records by id
    Get {
        /// Record ids
        #[arg(required = true)]
        ids: Vec<u64>,
    },

    /// Delete a record (deleting a missing id is not an error)
    Delete {
        #[arg(long)]
        id: u64,
    },

    /// Number of stored vectors
    Count,

    /// Exact cosine search
    Search {
        /// Query vector (comma separated floats)
        #[arg(short, long, value_parser = parse_vector)]
        query: ::std::vec::Vec<f32>,

        /// Number of results
        #[arg(short, long)]
        n: Option<usize>,
    },

    /// Hamming-distance prefilter, reranked by cosine similarity
    SearchHamming {
        /// Query vector (comma separated floats)
        #[arg(short, long, value_parser = parse_vector)]
        query: ::std::vec::Vec<f32>,

        /// Number of results
        #[arg(short, long)]
        n: Option<usize>,
    },

    /// Staged multi-resolution search
    Staged {
        /// Query vector (comma separated floats)
        #[arg(short, long, value_parser = parse_vector)]
        query: ::std::vec::Vec<f32>,

        /// Number of refinement stages
        #[arg(long)]
        stages: Option<usize>,

        /// Number of results
        #[arg(short, long)]
        n: Option<usize>,
    },

    /// Print the binary code of a vector as hex
    Quantize {
        #[arg(short, long, value_parser = parse_vector)]
        vector: ::std::vec::Vec<f32>,
    },
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout carries JSON results
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_data_dir(cli.data_dir, cli.collection, cli.dim);
    config.parallel_stages = !cli.sequential;
    let engine = config.open_engine()?;

    match cli.command {
        Commands::Init => {
            tracing::info!(
                "collection '{}' ready at {:?} ({} vectors)",
                config.collection,
                config.catalog_path(),
                engine.count()?
            );
        }
        Commands::Upsert { vector, id } => {
            let id = engine.upsert(vector, id.map(RecordId))?;
            print_json(&serde_json::json!({ "id": id }))?;
        }
        Commands::Ingest { input } => {
            tracing::info!("Reading vectors from {:?}", input);
            let file = std::fs::File::open(&input)
                .with_context(|| format!("opening {:?}", input))?;
            let vectors: Vec<Vec<f32>> = serde_json::from_reader(std::io::BufReader::new(file))
                .with_context(|| format!("parsing {:?}", input))?;
            tracing::info!("Found {} vectors", vectors.len());
            let ids = engine.upsert_batch(vectors)?;
            print_json(&serde_json::json!({ "ids": ids }))?;
        }
        Commands::Get { ids } => {
            let ids: Vec<RecordId> = ids.into_iter().map(RecordId).collect();
            print_json(&engine.fetch(&ids)?)?;
        }
        Commands::Delete { id } => {
            let removed = engine.delete(RecordId(id))?;
            print_json(&serde_json::json!({ "id": id, "removed": removed }))?;
        }
        Commands::Count => {
            print_json(&serde_json::json!({ "count": engine.count()? }))?;
        }
        Commands::Search { query, n } => {
            print_json(&engine.search(&query, n)?)?;
        }
        Commands::SearchHamming { query, n } => {
            print_json(&engine.search_with_hamming(&query, n)?)?;
        }
        Commands::Staged { query, stages, n } => {
            print_json(&engine.staged_search(&query, stages, n)?)?;
        }
        Commands::Quantize { vector } => {
            let code = engine.binary_code(&vector)?;
            print_json(&serde_json::json!({ "binary_code": code }))?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_vector(s: &str) -> Result<Vec<f32>, String> {
    s.split(',')
        .map(|x| {
            x.trim()
                .parse::<f32>()
                .map_err(|e| format!("invalid float '{}': {}", x, e))
        })
        .collect()
}
