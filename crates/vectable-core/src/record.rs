//! Stored vector records and ranked results

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::quantize::{quantize, BinaryCode};
use crate::simd::{magnitude, normalize};

/// Store-assigned record identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// A raw vector together with every field derived from it
///
/// This is the unit a [`RecordStore`](crate::store::RecordStore) writes
/// atomically. The derived fields are only ever produced by
/// [`PreparedVector::from_raw`].
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedVector {
    raw: Vec<f32>,
    normalized: Vec<f32>,
    magnitude: f32,
    binary_code: BinaryCode,
}

impl PreparedVector {
    pub fn from_raw(raw: Vec<f32>, epsilon: f32) -> Self {
        let mut mag = magnitude(&raw);
        if mag == 0.0 {
            mag = epsilon;
        }
        // Normalizes against the f64 norm, not the rounded `mag`
        let normalized = normalize(&raw, None, epsilon);
        let binary_code = quantize(&normalized);
        Self {
            raw,
            normalized,
            magnitude: mag,
            binary_code,
        }
    }

    pub fn raw(&self) -> &[f32] {
        &self.raw
    }

    pub fn normalized(&self) -> &[f32] {
        &self.normalized
    }

    pub fn magnitude(&self) -> f32 {
        self.magnitude
    }

    pub fn binary_code(&self) -> &BinaryCode {
        &self.binary_code
    }

    pub fn dim(&self) -> usize {
        self.raw.len()
    }

    /// Attach an identity and write time
    pub fn into_record(self, id: RecordId, created: i64) -> VectorRecord {
        VectorRecord {
            id,
            raw_vector: self.raw,
            normalized_vector: self.normalized,
            magnitude: self.magnitude,
            binary_code: self.binary_code,
            created,
        }
    }
}

/// The persisted unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: RecordId,
    pub raw_vector: Vec<f32>,
    pub normalized_vector: Vec<f32>,
    pub magnitude: f32,
    pub binary_code: BinaryCode,
    /// Unix seconds of the last write
    pub created: i64,
}

impl VectorRecord {
    pub fn dim(&self) -> usize {
        self.raw_vector.len()
    }
}

/// One entry of a ranked result list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: RecordId,
    pub raw_vector: Vec<f32>,
    pub normalized_vector: Vec<f32>,
    pub magnitude: f32,
    pub similarity: f32,
}

impl SearchHit {
    pub fn from_record(record: VectorRecord, similarity: f32) -> Self {
        Self {
            id: record.id,
            raw_vector: record.raw_vector,
            normalized_vector: record.normalized_vector,
            magnitude: record.magnitude,
            similarity,
        }
    }
}

pub fn now_unix_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
