//! Staged multi-resolution search
//!
//! Ranks the collection on a growing prefix of dimensions and halves the
//! working set after every stage:
//!
//! ```text
//! D = 8, stages = 4  ->  step = 2
//!
//! stage  dims  working  kept  eliminated
//!   1     2      100     50      50  -> bucket[0]
//!   2     4       50     25      25  -> bucket[1]
//!   3     6       25     12      13  -> bucket[2]
//!   4     8       12      6       6  -> bucket[3]
//!
//! result = survivors(6) ++ bucket[0] ++ bucket[1] ++ bucket[2] ++ bucket[3]
//! ```
//!
//! At each stage both the query prefix and every candidate's raw-vector
//! prefix are re-normalized before comparison, so a stage only sees the
//! dimensions it is considering.
//!
//! Eliminated candidates are kept, not dropped. Buckets are appended in the
//! order they were eliminated (earliest stage first), each in the order of
//! the stage that eliminated it. The head of the result (the survivors) is
//! ranked on the widest prefix; the tail is only approximately ranked. The
//! full collection is loaded once per query.

use rayon::prelude::*;

use crate::filter::sort_by_similarity;
use crate::record::{SearchHit, VectorRecord};
use crate::simd::{cosine_similarity, normalize_prefix};

/// Per-query staged search parameters
#[derive(Debug, Clone, Copy)]
pub struct StagedSearch {
    stages: usize,
    epsilon: f32,
    parallel: bool,
}

/// What happened during one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub dimension: usize,
    pub scored: usize,
    pub retained: usize,
}

/// Ranked output plus per-stage bookkeeping
#[derive(Debug, Clone)]
pub struct StagedOutcome {
    pub hits: Vec<SearchHit>,
    pub stages: Vec<StageReport>,
}

impl StagedSearch {
    /// `stages` must be at least 1; the engine validates this before calling.
    pub fn new(stages: usize, epsilon: f32) -> Self {
        Self {
            stages: stages.max(1),
            epsilon,
            parallel: true,
        }
    }

    /// Score candidates on the calling thread only
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// First prefix width, also the per-stage increment. Never zero.
    pub fn initial_dimension(&self, dim: usize) -> usize {
        (dim / self.stages).max(1)
    }

    /// Run the refinement over `records` and return the first `n` entries
    pub fn run(&self, query: &[f32], records: Vec<VectorRecord>, n: usize) -> StagedOutcome {
        let dim = query.len();
        let step = self.initial_dimension(dim);

        let mut working: Vec<SearchHit> = records
            .into_iter()
            .map(|r| SearchHit::from_record(r, 0.0))
            .collect();
        let mut eliminated: Vec<Vec<SearchHit>> = Vec::new();
        let mut reports = Vec::new();

        let mut current = step;
        while current <= dim && !working.is_empty() {
            let query_prefix = normalize_prefix(query, current, self.epsilon);
            self.score(&query_prefix, current, &mut working);
            sort_by_similarity(&mut working);

            let scored = working.len();
            let retain = (scored / 2).max(1);
            let bottom = working.split_off(retain.min(scored));

            tracing::debug!(
                dimension = current,
                scored,
                retained = working.len(),
                "staged search stage complete"
            );
            reports.push(StageReport {
                dimension: current,
                scored,
                retained: working.len(),
            });

            eliminated.push(bottom);
            current += step;
        }

        let mut hits = working;
        for bucket in eliminated {
            if hits.len() >= n {
                break;
            }
            hits.extend(bucket);
        }
        hits.truncate(n);

        StagedOutcome {
            hits,
            stages: reports,
        }
    }

    fn score(&self, query_prefix: &[f32], dimension: usize, working: &mut [SearchHit]) {
        let epsilon = self.epsilon;
        let score_one = |hit: &mut SearchHit| {
            let prefix = normalize_prefix(&hit.raw_vector, dimension, epsilon);
            hit.similarity = cosine_similarity(query_prefix, &prefix);
            hit.normalized_vector = prefix;
        };

        if self.parallel {
            working.par_iter_mut().for_each(score_one);
        } else {
            working.iter_mut().for_each(score_one);
        }
    }
}
