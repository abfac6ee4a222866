//! Determinism, sortedness, and candidate-size invariants, exercised
//! through the public `ClusterIndex`/selector API.

use edutwin_predict::prelude::*;
use edutwin_predict::selector::{select_candidates, DEFAULT_TARGET};
use std::collections::BTreeMap;

fn keys() -> Vec<FeatureKey> {
    vec![FeatureKey::new("A", "T1"), FeatureKey::new("B", "T1")]
}

fn sample(id: usize, a: f64, b: f64) -> ReferenceSample {
    let mut scores = BTreeMap::new();
    scores.insert(FeatureKey::new("A", "T1"), a);
    scores.insert(FeatureKey::new("B", "T1"), b);
    ReferenceSample {
        sample_id: format!("s{id}"),
        scores,
    }
}

fn dataset(n: usize) -> ReferenceDataset {
    let samples = (0..n).map(|i| sample(i, (i % 37) as f64, (i % 19) as f64)).collect();
    ReferenceDataset { samples }
}

#[test]
fn fit_is_deterministic_across_refits() {
    let ds = dataset(4000);
    let k = keys();
    let a = ClusterIndex::fit(&ds, &k).unwrap();
    let b = ClusterIndex::fit(&ds, &k).unwrap();
    assert_eq!(a.cluster_count(), b.cluster_count());
    for id in 0..a.cluster_count() {
        assert_eq!(a.get_members(id).len(), b.get_members(id).len());
        assert_eq!(a.centroid(id), b.centroid(id));
    }
}

#[test]
fn members_sorted_ascending_across_all_clusters() {
    let ds = dataset(4000);
    let k = keys();
    let index = ClusterIndex::fit(&ds, &k).unwrap();
    for id in 0..index.cluster_count() {
        let members = index.get_members(id);
        let centroid = index.centroid(id);
        let mut prev = 0.0;
        for m in members {
            let d = edutwin_predict::model::euclidean(&m.to_vector(&k), centroid);
            assert!(d + 1e-9 >= prev);
            prev = d;
        }
    }
}

#[test]
fn cluster_count_crosses_threshold_at_3000_samples() {
    assert_eq!(ClusterIndex::choose_k(2999), 1);
    assert_eq!(ClusterIndex::choose_k(3000), 1);
    assert_eq!(ClusterIndex::choose_k(3001), 2);

    let k = keys();
    let idx_2999 = ClusterIndex::fit(&dataset(2999), &k).unwrap();
    assert_eq!(idx_2999.cluster_count(), 1);
    let idx_3001 = ClusterIndex::fit(&dataset(3001), &k).unwrap();
    assert_eq!(idx_3001.cluster_count(), 2);
}

#[test]
fn selector_merges_neighbor_clusters_to_reach_target() {
    let ds = dataset(7500);
    let k = keys();
    let index = ClusterIndex::fit(&ds, &k).unwrap();
    assert_eq!(index.cluster_count(), 3);

    let mut query = Query::default();
    query.inputs.insert(k[0].clone(), 18.0);
    query.inputs.insert(k[1].clone(), 9.0);

    let candidates = select_candidates(&index, &query, DEFAULT_TARGET);
    assert!(candidates.len() >= DEFAULT_TARGET);
}

#[test]
fn candidate_size_invariant() {
    let k = keys();

    let small = dataset(500);
    let small_index = ClusterIndex::fit(&small, &k).unwrap();
    let mut q = Query::default();
    q.inputs.insert(k[0].clone(), 10.0);
    q.inputs.insert(k[1].clone(), 5.0);
    let candidates = select_candidates(&small_index, &q, DEFAULT_TARGET);
    assert_eq!(candidates.len(), 500);

    let large = dataset(5000);
    let large_index = ClusterIndex::fit(&large, &k).unwrap();
    let candidates = select_candidates(&large_index, &q, DEFAULT_TARGET);
    assert!(candidates.len() >= DEFAULT_TARGET);
}
