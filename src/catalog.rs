//! SQLite-backed record store
//!
//! Talks to SQLite through the `sqlite3` shell: statements are piped on
//! stdin with `-bail`, and result rows come back as JSON (`-json`). Every
//! write runs inside `BEGIN IMMEDIATE … COMMIT`; if any statement fails the
//! shell exits before `COMMIT` and the transaction is rolled back, so a
//! record's raw vector, normalized vector, magnitude and binary code are
//! always written together.
//!
//! Each collection lives in its own `<collection>_vectors` table. The
//! `collections` table records the dimension a collection was created with.
//!
//! The store has no Hamming index, so Hamming-prefiltered searches fall back
//! to an in-process scan.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use vectable_core::quantize::BinaryCode;
use vectable_core::record::{now_unix_ts, PreparedVector, RecordId, VectorRecord};
use vectable_core::store::{RecordIter, RecordStore, StoreError};

/// Milliseconds a connection waits on a locked database before failing.
/// Set per `sqlite3` invocation, since every call opens a new connection.
const BUSY_TIMEOUT_MS: u32 = 5000;

pub struct SqliteRecordStore {
    path: PathBuf,
    collection: String,
    table: String,
    dim: usize,
}

impl SqliteRecordStore {
    /// Open (creating if needed) the database at `path` and provision the
    /// collection's table.
    pub fn open(path: &Path, collection: &str, dim: usize) -> Result<Self> {
        if collection.is_empty()
            || !collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            bail!("invalid collection name '{}': use [A-Za-z0-9_]", collection);
        }
        if dim == 0 {
            bail!("collection '{}' must have a non-zero dimension", collection);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self {
            path: path.to_path_buf(),
            collection: collection.to_string(),
            table: format!("{}_vectors", collection),
            dim,
        };

        store.exec("PRAGMA journal_mode=WAL;")?;
        store.initialize()?;
        Ok(store)
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn initialize(&self) -> Result<()> {
        self.exec(&format!(
            "BEGIN IMMEDIATE;
             CREATE TABLE IF NOT EXISTS collections (name TEXT PRIMARY KEY, dim INTEGER NOT NULL, created_at INTEGER NOT NULL);
             CREATE TABLE IF NOT EXISTS {t} (id INTEGER PRIMARY KEY AUTOINCREMENT, vector TEXT NOT NULL, normalized_vector TEXT NOT NULL, magnitude REAL NOT NULL, binary_code TEXT NOT NULL, created INTEGER NOT NULL);
             CREATE INDEX IF NOT EXISTS idx_{t}_binary_code ON {t}(binary_code);
             INSERT OR IGNORE INTO collections(name, dim, created_at) VALUES ('{name}', {dim}, {ts});
             COMMIT;",
            t = self.table,
            name = sql_quote(&self.collection),
            dim = self.dim,
            ts = now_unix_ts(),
        ))?;

        let rows = self.query_json(&format!(
            "SELECT dim FROM collections WHERE name='{}' LIMIT 1;",
            sql_quote(&self.collection)
        ))?;
        let recorded = rows
            .first()
            .and_then(|r| r["dim"].as_i64())
            .ok_or_else(|| anyhow!("collection '{}' is not registered", self.collection))?;
        if recorded as usize != self.dim {
            bail!(
                "collection '{}' exists with dim {}, expected {}",
                self.collection,
                recorded,
                self.dim
            );
        }
        Ok(())
    }

    fn run(&self, sql: &str, json: bool) -> Result<Vec<u8>> {
        let mut cmd = Command::new("sqlite3");
        cmd.arg("-bail")
            .arg("-cmd")
            .arg(format!(".timeout {}", BUSY_TIMEOUT_MS));
        if json {
            cmd.arg("-json");
        }
        let mut child = cmd
            .arg(&self.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawning sqlite3 against {:?}", self.path))?;

        // Statements go through stdin; a batch of vectors easily exceeds argv limits.
        // Written from another thread so a large result cannot stall on a full pipe.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("sqlite3 stdin unavailable"))?;
        let input = sql.to_owned();
        let writer = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child
            .wait_with_output()
            .with_context(|| format!("running sqlite3 against {:?}", self.path))?;
        if !output.status.success() {
            return Err(anyhow!(
                "sqlite failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        writer
            .join()
            .map_err(|_| anyhow!("sqlite3 stdin writer panicked"))?
            .context("writing sql to sqlite3")?;
        Ok(output.stdout)
    }

    fn exec(&self, sql: &str) -> Result<()> {
        self.run(sql, false).map(|_| ())
    }

    /// Rows of every result set produced by `sql`, concatenated in order
    fn query_json(&self, sql: &str) -> Result<Vec<Value>> {
        let stdout = self.run(sql, true)?;
        let mut rows = Vec::new();
        for set in serde_json::Deserializer::from_slice(&stdout).into_iter::<Vec<Value>>() {
            let set = set.with_context(|| {
                format!(
                    "parsing sqlite json output: {}",
                    String::from_utf8_lossy(&stdout)
                )
            })?;
            rows.extend(set);
        }
        Ok(rows)
    }

    fn insert_sql(&self, vector: &PreparedVector, created: i64) -> Result<String> {
        ensure_finite_magnitude(vector)?;
        Ok(format!(
            "INSERT INTO {}(vector, normalized_vector, magnitude, binary_code, created) VALUES ('{}', '{}', {}, '{}', {});",
            self.table,
            sql_quote(&serde_json::to_string(vector.raw())?),
            sql_quote(&serde_json::to_string(vector.normalized())?),
            vector.magnitude(),
            vector.binary_code().to_hex(),
            created
        ))
    }

    fn select_columns(&self) -> String {
        format!(
            "SELECT id, vector, normalized_vector, magnitude, binary_code, created FROM {}",
            self.table
        )
    }

    fn insert_one(&self, vector: &PreparedVector) -> Result<RecordId> {
        let rows = self.query_json(&format!(
            "BEGIN IMMEDIATE;
             {}
             SELECT last_insert_rowid() AS id;
             COMMIT;",
            self.insert_sql(vector, now_unix_ts())?
        ))?;
        first_u64(&rows, "id")
            .map(RecordId)
            .ok_or_else(|| anyhow!("sqlite did not report an inserted id"))
    }

    /// Rows holding `changes()` as `n`
    fn update_one(&self, vector: &PreparedVector, id: RecordId) -> Result<Vec<Value>> {
        ensure_finite_magnitude(vector)?;
        self.query_json(&format!(
            "BEGIN IMMEDIATE;
             UPDATE {} SET vector='{}', normalized_vector='{}', magnitude={}, binary_code='{}', created={} WHERE id={};
             SELECT changes() AS n;
             COMMIT;",
            self.table,
            sql_quote(&serde_json::to_string(vector.raw())?),
            sql_quote(&serde_json::to_string(vector.normalized())?),
            vector.magnitude(),
            vector.binary_code().to_hex(),
            now_unix_ts(),
            id.0
        ))
    }

    fn insert_many(&self, vectors: &[PreparedVector]) -> Result<Vec<RecordId>> {
        let created = now_unix_ts();
        let mut sql = String::from("BEGIN IMMEDIATE;\n");
        for vector in vectors {
            sql.push_str(&self.insert_sql(vector, created)?);
            sql.push_str("\nSELECT last_insert_rowid() AS id;\n");
        }
        sql.push_str("COMMIT;");

        let rows = self.query_json(&sql)?;
        if rows.len() != vectors.len() {
            bail!(
                "sqlite reported {} ids for {} inserted vectors",
                rows.len(),
                vectors.len()
            );
        }
        rows.iter()
            .map(|r| {
                r["id"]
                    .as_u64()
                    .map(RecordId)
                    .ok_or_else(|| anyhow!("missing inserted id in {}", r))
            })
            .collect()
    }
}

impl RecordStore for SqliteRecordStore {
    fn upsert(&self, vector: PreparedVector, id: Option<RecordId>) -> Result<RecordId, StoreError> {
        match id {
            None => self.insert_one(&vector).map_err(StoreError::backend),
            Some(id) => {
                let rows = self.update_one(&vector, id).map_err(StoreError::backend)?;
                if required_u64(&rows, "n")? > 0 {
                    Ok(id)
                } else {
                    Err(StoreError::NotFound(id))
                }
            }
        }
    }

    fn insert_batch(&self, vectors: Vec<PreparedVector>) -> Result<Vec<RecordId>, StoreError> {
        if vectors.is_empty() {
            return Ok(Vec::new());
        }
        self.insert_many(&vectors).map_err(StoreError::backend)
    }

    fn fetch_by_ids(&self, ids: &[RecordId]) -> Result<Vec<VectorRecord>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut unique_ids: Vec<u64> = ids.iter().map(|id| id.0).collect();
        unique_ids.sort_unstable();
        unique_ids.dedup();
        let in_clause = unique_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let rows = self
            .query_json(&format!(
                "{} WHERE id IN ({});",
                self.select_columns(),
                in_clause
            ))
            .map_err(StoreError::backend)?;
        rows.iter().map(record_from_row).collect()
    }

    fn fetch_all(&self) -> Result<RecordIter<'_>, StoreError> {
        let rows = self
            .query_json(&format!("{} ORDER BY id ASC;", self.select_columns()))
            .map_err(StoreError::backend)?;
        Ok(Box::new(rows.into_iter().map(|row| record_from_row(&row))))
    }

    fn delete(&self, id: RecordId) -> Result<bool, StoreError> {
        let rows = self
            .query_json(&format!(
                "DELETE FROM {} WHERE id={}; SELECT changes() AS n;",
                self.table, id.0
            ))
            .map_err(StoreError::backend)?;
        Ok(required_u64(&rows, "n")? > 0)
    }

    fn count(&self) -> Result<usize, StoreError> {
        let rows = self
            .query_json(&format!("SELECT COUNT(*) AS n FROM {};", self.table))
            .map_err(StoreError::backend)?;
        Ok(required_u64(&rows, "n")? as usize)
    }
}

fn record_from_row(row: &Value) -> Result<VectorRecord, StoreError> {
    let corrupt = |what: &str| StoreError::Corrupt(format!("{} in row {}", what, row));

    let id = row["id"].as_u64().ok_or_else(|| corrupt("missing id"))?;
    let raw_vector: Vec<f32> = serde_json::from_str(row["vector"].as_str().unwrap_or_default())
        .map_err(|_| corrupt("malformed vector"))?;
    let normalized_vector: Vec<f32> =
        serde_json::from_str(row["normalized_vector"].as_str().unwrap_or_default())
            .map_err(|_| corrupt("malformed normalized_vector"))?;
    let binary_code = BinaryCode::from_hex(row["binary_code"].as_str().unwrap_or_default())
        .map_err(|_| corrupt("malformed binary_code"))?;

    Ok(VectorRecord {
        id: RecordId(id),
        raw_vector,
        normalized_vector,
        magnitude: row["magnitude"].as_f64().unwrap_or_default() as f32,
        binary_code,
        created: row["created"].as_i64().unwrap_or_default(),
    })
}

fn first_u64(rows: &[Value], column: &str) -> Option<u64> {
    rows.first().and_then(|r| r[column].as_u64())
}

/// A bookkeeping value (`changes()`, `COUNT(*)`) sqlite must always report
fn required_u64(rows: &[Value], column: &str) -> Result<u64, StoreError> {
    first_u64(rows, column).ok_or_else(|| {
        StoreError::Corrupt(format!(
            "sqlite returned no integer `{}` in {}",
            column,
            Value::from(rows.to_vec())
        ))
    })
}

fn ensure_finite_magnitude(vector: &PreparedVector) -> Result<()> {
    if !vector.magnitude().is_finite() {
        bail!("vector magnitude {} cannot be stored", vector.magnitude());
    }
    Ok(())
}

fn sql_quote(value: &str) -> String {
    value.replace('\'', "''")
}
