use docshelf_core::config::VectorConfig;
use docshelf_core::error::Error;
use docshelf_core::traits::VectorIndexer;
use docshelf_core::types::{DocId, Metric};
use docshelf_vector::VectorStore;
use tempfile::TempDir;

fn cosine_config() -> VectorConfig {
    VectorConfig { metric: Metric::Cosine, ..VectorConfig::default() }
}

/// Deterministic pseudo-random vectors, good enough for recall checks.
fn synthetic_vectors(count: usize, dim: usize) -> Vec<(u64, Vec<f32>)> {
    let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
    (0..count as u64)
        .map(|id| {
            let v = (0..dim)
                .map(|_| {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    ((state >> 33) as f32 / (u32::MAX as f32)) * 2.0 - 1.0
                })
                .collect();
            (id + 1, v)
        })
        .collect()
}

#[test]
fn dimensionality_is_fixed_by_the_first_insert() {
    let store = VectorStore::new(&cosine_config());
    store.insert(DocId(1), &[1.0, 0.0, 0.0]).expect("first insert");
    assert_eq!(store.dim(), Some(3));

    let err = store.insert(DocId(2), &[1.0, 0.0]).expect_err("mismatched insert");
    match err {
        Error::DimensionMismatch { expected, actual } => {
            assert_eq!(expected, 3);
            assert_eq!(actual, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    // The failed insert must not have touched the store.
    assert_eq!(store.len(), 1);

    let err = store.search(&[1.0, 0.0], 5).expect_err("mismatched query");
    assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 2 }));
}

#[test]
fn deleted_vectors_stop_matching_immediately() {
    let store = VectorStore::new(&cosine_config());
    store.insert(DocId(1), &[1.0, 0.0]).expect("insert");
    store.insert(DocId(2), &[0.9, 0.1]).expect("insert");

    store.delete(DocId(1)).expect("delete");
    let ids: Vec<DocId> =
        store.search(&[1.0, 0.0], 10).expect("search").iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![DocId(2)]);

    // Deleting an absent id is a no-op.
    store.delete(DocId(99)).expect("delete absent");
    assert_eq!(store.len(), 1);
}

#[test]
fn identical_vectors_tie_break_by_smaller_id() {
    let store = VectorStore::new(&cosine_config());
    store.insert(DocId(7), &[0.0, 1.0]).expect("insert");
    store.insert(DocId(3), &[0.0, 1.0]).expect("insert");

    let hits = store.search(&[0.0, 1.0], 2).expect("search");
    assert_eq!(hits[0].id, DocId(3));
    assert_eq!(hits[1].id, DocId(7));
    assert!((hits[0].score - hits[1].score).abs() < 1e-6);
}

#[test]
fn cosine_similarity_ignores_magnitude() {
    let store = VectorStore::new(&cosine_config());
    store.insert(DocId(1), &[100.0, 0.0]).expect("insert");
    store.insert(DocId(2), &[0.0, 0.001]).expect("insert");

    let hits = store.search(&[2.0, 0.0], 2).expect("search");
    assert_eq!(hits[0].id, DocId(1));
    assert!((hits[0].score - 1.0).abs() < 1e-5);
    assert!(hits[1].score.abs() < 1e-5);
}

#[test]
fn zero_magnitude_vectors_score_zero_under_cosine() {
    let store = VectorStore::new(&cosine_config());
    store.insert(DocId(1), &[0.0, 0.0]).expect("insert zero");
    store.insert(DocId(2), &[1.0, 0.0]).expect("insert");

    let hits = store.search(&[1.0, 0.0], 2).expect("search");
    assert_eq!(hits[0].id, DocId(2));
    assert_eq!(hits[1].id, DocId(1));
    assert!(hits[1].score.abs() < 1e-6);
}

#[test]
fn l2_metric_prefers_the_closest_entry() {
    let config = VectorConfig { metric: Metric::L2, ..VectorConfig::default() };
    let store = VectorStore::new(&config);
    store.insert(DocId(1), &[0.0, 0.0]).expect("insert");
    store.insert(DocId(2), &[5.0, 5.0]).expect("insert");

    let hits = store.search(&[0.5, 0.5], 2).expect("search");
    assert_eq!(hits[0].id, DocId(1));
    assert!(hits[0].score > hits[1].score);
}

#[test]
fn empty_store_and_zero_k_return_nothing() {
    let store = VectorStore::new(&cosine_config());
    assert!(store.search(&[1.0, 0.0], 5).expect("empty store").is_empty());

    store.insert(DocId(1), &[1.0, 0.0]).expect("insert");
    assert!(store.search(&[1.0, 0.0], 0).expect("zero k").is_empty());
}

#[test]
fn approximate_path_matches_exact_results_when_probing_everything() {
    // Forcing the threshold to 1 routes every search through the coarse
    // index; probing all lists must reproduce the exact ranking.
    let dim = 8;
    let entries = synthetic_vectors(64, dim);

    let exact = VectorStore::new(&VectorConfig {
        metric: Metric::Cosine,
        exact_threshold: 10_000,
        ..VectorConfig::default()
    });
    let approx = VectorStore::new(&VectorConfig {
        metric: Metric::Cosine,
        exact_threshold: 1,
        nprobe: 64,
        ..VectorConfig::default()
    });
    for (id, v) in &entries {
        exact.insert(DocId(*id), v).expect("insert exact");
        approx.insert(DocId(*id), v).expect("insert approx");
    }

    let query = &entries[17].1;
    let exact_ids: Vec<DocId> =
        exact.search(query, 10).expect("exact").iter().map(|h| h.id).collect();
    let approx_ids: Vec<DocId> =
        approx.search(query, 10).expect("approx").iter().map(|h| h.id).collect();
    assert_eq!(exact_ids, approx_ids);
}

#[test]
fn approximate_search_finds_its_own_entry() {
    let entries = synthetic_vectors(200, 8);
    let store = VectorStore::new(&VectorConfig {
        metric: Metric::Cosine,
        exact_threshold: 50,
        nprobe: 4,
        ..VectorConfig::default()
    });
    for (id, v) in &entries {
        store.insert(DocId(*id), v).expect("insert");
    }
    // A stored vector is its own nearest neighbor under cosine.
    let hits = store.search(&entries[42].1, 1).expect("search");
    assert_eq!(hits[0].id, DocId(entries[42].0));
}

#[test]
fn snapshot_survives_reopen() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("vectors.json");
    {
        let store = VectorStore::open(&path, &cosine_config()).expect("open");
        store.insert(DocId(1), &[1.0, 0.0]).expect("insert");
        store.insert(DocId(2), &[0.0, 1.0]).expect("insert");
        store.delete(DocId(2)).expect("delete");
    }
    let reopened = VectorStore::open(&path, &cosine_config()).expect("reopen");
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened.dim(), Some(2));
    let hits = reopened.search(&[1.0, 0.0], 5).expect("search");
    assert_eq!(hits[0].id, DocId(1));
}

#[test]
fn reopening_with_a_different_metric_is_rejected() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("vectors.json");
    {
        let store = VectorStore::open(&path, &cosine_config()).expect("open");
        store.insert(DocId(1), &[1.0, 0.0]).expect("insert");
    }
    let config = VectorConfig { metric: Metric::L2, ..VectorConfig::default() };
    assert!(matches!(VectorStore::open(&path, &config), Err(Error::InvalidConfig(_))));
}
