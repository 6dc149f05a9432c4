use std::collections::HashSet;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vectable::quantize::quantize;
use vectable::simd::{normalize, DEFAULT_EPSILON};
use vectable::{EngineConfig, MemoryStore, RecordId, SearchEngine, SearchError};

fn engine(dim: usize) -> SearchEngine<MemoryStore> {
    SearchEngine::new(Arc::new(MemoryStore::new()), EngineConfig::new(dim)).expect("engine")
}

fn random_vectors(count: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dim).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect())
        .collect()
}

#[test]
fn orthogonal_vectors_exact_search() {
    let engine = engine(4);
    let a = engine.upsert(vec![1.0, 0.0, 0.0, 0.0], None).unwrap();
    engine.upsert(vec![0.0, 1.0, 0.0, 0.0], None).unwrap();
    engine.upsert(vec![0.0, 0.0, 1.0, 0.0], None).unwrap();

    let top = engine.search(&[1.0, 0.0, 0.0, 0.0], Some(1)).unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].id, a);
    assert!((top[0].similarity - 1.0).abs() < 1e-6);

    let all = engine.search(&[1.0, 0.0, 0.0, 0.0], Some(10)).unwrap();
    assert_eq!(all.len(), 3);
    assert!(all[1..].iter().all(|h| h.similarity.abs() < 1e-6));
}

#[test]
fn upsert_then_fetch_round_trip() {
    let engine = engine(6);
    let raw = vec![0.3, -1.2, 0.0, 2.5, -0.1, 0.9];
    let id = engine.upsert(raw.clone(), None).unwrap();

    let records = engine.fetch(&[id]).unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.raw_vector, raw);
    assert_eq!(record.normalized_vector, normalize(&raw, None, DEFAULT_EPSILON));
    assert_eq!(record.binary_code, quantize(&record.normalized_vector));
    assert_eq!(record.binary_code.to_hex().len(), 2);
}

#[test]
fn update_keeps_identity() {
    let engine = engine(3);
    let id = engine.upsert(vec![1.0, 0.0, 0.0], None).unwrap();
    let same = engine.upsert(vec![0.0, 0.0, -4.0], Some(id)).unwrap();
    assert_eq!(id, same);
    assert_eq!(engine.count().unwrap(), 1);

    let hit = &engine.search(&[0.0, 0.0, -1.0], Some(1)).unwrap()[0];
    assert_eq!(hit.id, id);
    assert!((hit.magnitude - 4.0).abs() < 1e-6);
}

#[test]
fn delete_then_fetch_is_empty() {
    let engine = engine(2);
    let ids = engine
        .upsert_batch(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]])
        .unwrap();
    let before = engine.count().unwrap();

    assert!(engine.delete(ids[1]).unwrap());
    assert!(engine.fetch(&[ids[1]]).unwrap().is_empty());
    assert_eq!(engine.count().unwrap(), before - 1);

    // deleting again is a documented no-op
    assert!(!engine.delete(ids[1]).unwrap());
    assert_eq!(engine.count().unwrap(), before - 1);
}

#[test]
fn update_of_deleted_record_is_not_found() {
    let engine = engine(2);
    let id = engine.upsert(vec![1.0, 0.0], None).unwrap();
    engine.delete(id).unwrap();
    let err = engine.upsert(vec![0.0, 1.0], Some(id)).unwrap_err();
    assert!(matches!(err, SearchError::NotFound(missing) if missing == id));
}

#[test]
fn search_results_sorted_and_bounded() {
    let engine = engine(16);
    engine.upsert_batch(random_vectors(30, 16, 11)).unwrap();

    let query = random_vectors(1, 16, 12).remove(0);
    let hits = engine.search(&query, Some(10)).unwrap();
    assert_eq!(hits.len(), 10);
    assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));

    let hits = engine.search(&query, Some(100)).unwrap();
    assert_eq!(hits.len(), 30);
}

#[test]
fn search_is_reproducible() {
    let engine = engine(8);
    // duplicates force ties
    let mut vectors = random_vectors(10, 8, 21);
    vectors.extend(vectors.clone());
    engine.upsert_batch(vectors).unwrap();

    let query = random_vectors(1, 8, 22).remove(0);
    let first = engine.search(&query, Some(20)).unwrap();
    let second = engine.search(&query, Some(20)).unwrap();
    assert_eq!(first, second);

    for pair in first.chunks(2) {
        if pair.len() == 2 && pair[0].similarity == pair[1].similarity {
            assert!(pair[0].id < pair[1].id, "ties keep fetch order");
        }
    }
}

#[test]
fn hamming_search_finds_exact_match_and_reranks() {
    let engine = engine(64);
    let vectors = random_vectors(200, 64, 31);
    let ids = engine.upsert_batch(vectors.clone()).unwrap();

    let hits = engine.search_with_hamming(&vectors[17], Some(10)).unwrap();
    assert!(hits.len() <= 10);
    assert_eq!(hits[0].id, ids[17]);
    assert!((hits[0].similarity - 1.0).abs() < 1e-5);
    assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));
}

#[test]
fn hamming_candidates_come_from_smallest_distances() {
    let engine = engine(8);
    // codes relative to the query sign pattern ++++----
    engine
        .upsert_batch(vec![
            vec![1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0], // distance 0
            vec![-1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0], // distance 8
            vec![1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0, -1.0], // distance 1
            vec![1.0, 1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0],  // distance 1
        ])
        .unwrap();

    let hits = engine
        .search_with_hamming(&[1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0], Some(3))
        .unwrap();
    let ids: HashSet<u64> = hits.iter().map(|h| h.id.0).collect();
    assert_eq!(ids, HashSet::from([1, 3, 4]));
    assert_eq!(hits[0].id, RecordId(1));
}

#[test]
fn staged_search_returns_fifty_distinct_records() {
    let engine = engine(32);
    let ids = engine.upsert_batch(random_vectors(100, 32, 41)).unwrap();
    let corpus: HashSet<RecordId> = ids.into_iter().collect();

    let query = random_vectors(1, 32, 42).remove(0);
    let hits = engine.staged_search(&query, Some(4), Some(50)).unwrap();

    let distinct: HashSet<RecordId> = hits.iter().map(|h| h.id).collect();
    assert_eq!(hits.len(), 50);
    assert_eq!(distinct.len(), 50);
    assert!(distinct.is_subset(&corpus));
}

#[test]
fn staged_search_covers_whole_corpus_without_truncation() {
    let engine = engine(12);
    engine.upsert_batch(random_vectors(40, 12, 51)).unwrap();
    let query = random_vectors(1, 12, 52).remove(0);
    let hits = engine.staged_search(&query, Some(3), Some(1000)).unwrap();
    let distinct: HashSet<RecordId> = hits.iter().map(|h| h.id).collect();
    assert_eq!(hits.len(), 40);
    assert_eq!(distinct.len(), 40);
}

#[test]
fn staged_single_stage_equals_exact() {
    let engine = engine(20);
    engine.upsert_batch(random_vectors(60, 20, 61)).unwrap();
    let query = random_vectors(1, 20, 62).remove(0);

    let staged: Vec<RecordId> = engine
        .staged_search(&query, Some(1), Some(25))
        .unwrap()
        .iter()
        .map(|h| h.id)
        .collect();
    let exact: Vec<RecordId> = engine
        .search(&query, Some(25))
        .unwrap()
        .iter()
        .map(|h| h.id)
        .collect();
    assert_eq!(staged, exact);
}

#[test]
fn staged_search_with_more_stages_than_dimensions() {
    let engine = engine(4);
    engine.upsert_batch(random_vectors(20, 4, 71)).unwrap();
    let hits = engine.staged_search(&[1.0, 0.5, -0.5, 0.1], Some(16), Some(20)).unwrap();
    assert_eq!(hits.len(), 20);
}

#[test]
fn staged_search_defaults() {
    let engine = engine(8);
    engine.upsert_batch(random_vectors(120, 8, 81)).unwrap();
    let hits = engine.staged_search(&[0.1; 8], None, None).unwrap();
    assert_eq!(hits.len(), 50);
}

#[test]
fn concurrent_searches_share_one_engine() {
    let engine = Arc::new(engine(16));
    engine.upsert_batch(random_vectors(200, 16, 91)).unwrap();
    let query = random_vectors(1, 16, 92).remove(0);
    let expected = engine.search(&query, Some(5)).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let query = query.clone();
            std::thread::spawn(move || engine.search(&query, Some(5)).unwrap())
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}
