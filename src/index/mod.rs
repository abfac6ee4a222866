//! Reference index: partitions a reference dataset into clusters and stores
//! per-cluster members in distance-sorted order, so prediction queries touch
//! only a bounded neighborhood.

mod kmeans;

use crate::error::{PredictError, Result};
use crate::model::{euclidean, FeatureKey, ReferenceDataset, ReferenceSample};
use serde::{Deserialize, Serialize};

const KMEANS_SEED: u64 = 42;
const KMEANS_RESTARTS: u32 = 10;
const MAX_CLUSTERS: usize = 100;
const TARGET_SAMPLES_PER_CLUSTER: usize = 3000;

/// One cluster's fitted centroid plus its full membership, sorted ascending
/// by distance-to-centroid (closest first). The sort is the *only* ordering
/// the selector relies on; no truncation happens at fit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Cluster {
    centroid: Vec<f64>,
    members: Vec<ReferenceSample>,
}

/// The built clustering structure: fixed feature-key order, fitted
/// centroids, and per-cluster distance-sorted membership.
///
/// Serializes as a flat, explicit schema (not a language-native pickle) per
/// the design notes — safe to persist in the index cache and reload across
/// processes without deserialization-of-untrusted-data hazards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterIndex {
    feature_keys: Vec<FeatureKey>,
    clusters: Vec<Cluster>,
    fitted: bool,
}

impl ClusterIndex {
    /// Choose cluster count K for a reference population of size `n`.
    pub fn choose_k(n: usize) -> usize {
        if n < TARGET_SAMPLES_PER_CLUSTER {
            return 1;
        }
        let k = (n + TARGET_SAMPLES_PER_CLUSTER - 1) / TARGET_SAMPLES_PER_CLUSTER;
        let k = k.min(MAX_CLUSTERS);
        if n < k {
            (n / 5).max(1)
        } else {
            k
        }
    }

    /// Fit a cluster index over `dataset` using `feature_keys` as the fixed
    /// vector-space ordering. Samples missing any feature key are dropped
    /// from clustering (not from imputation use elsewhere).
    pub fn fit(dataset: &ReferenceDataset, feature_keys: &[FeatureKey]) -> Result<Self> {
        if feature_keys.is_empty() {
            return Err(PredictError::EmptyFeatureKeys);
        }
        if dataset.is_empty() {
            return Err(PredictError::EmptyDataset(String::new()));
        }

        let complete: Vec<&ReferenceSample> = dataset.filter_complete(feature_keys);
        if complete.is_empty() {
            return Err(PredictError::EmptyDataset(String::new()));
        }

        let rows: Vec<Vec<f64>> = complete.iter().map(|s| s.to_vector(feature_keys)).collect();
        let k = Self::choose_k(complete.len());

        let fitted = kmeans::fit(&rows, k, KMEANS_SEED, KMEANS_RESTARTS);

        let mut clusters: Vec<Cluster> = fitted
            .centroids
            .iter()
            .map(|c| Cluster {
                centroid: c.clone(),
                members: Vec::new(),
            })
            .collect();

        // Group members per cluster, carrying the distance-to-centroid
        // alongside so we can sort without recomputing.
        let mut staged: Vec<Vec<(f64, ReferenceSample)>> = vec![Vec::new(); clusters.len()];
        for (row, (sample, &label)) in rows.iter().zip(complete.iter().zip(fitted.labels.iter())) {
            let dist = euclidean(row, &clusters[label].centroid);
            staged[label].push((dist, (*sample).clone()));
        }
        for (cluster, mut members) in clusters.iter_mut().zip(staged.into_iter()) {
            members.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            cluster.members = members.into_iter().map(|(_, s)| s).collect();
        }

        Ok(ClusterIndex {
            feature_keys: feature_keys.to_vec(),
            clusters,
            fitted: true,
        })
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn feature_keys(&self) -> &[FeatureKey] {
        &self.feature_keys
    }

    /// Assign a query's input map to the nearest cluster by centroid
    /// distance; missing features 0-fill (documented tradeoff, see design
    /// notes). Ties break to the lowest cluster id via strict `<`.
    pub fn assign(&self, query_vector_source: &dyn QueryVector) -> Result<usize> {
        if !self.fitted {
            return Err(PredictError::IndexNotFitted);
        }
        let vector = query_vector_source.to_vector(&self.feature_keys);
        let mut best = 0usize;
        let mut best_dist = f64::INFINITY;
        for (id, cluster) in self.clusters.iter().enumerate() {
            let d = euclidean(&vector, &cluster.centroid);
            if d < best_dist {
                best_dist = d;
                best = id;
            }
        }
        Ok(best)
    }

    /// Full ordered membership of cluster `id`, closest-to-centroid first.
    /// Callers slice the prefix they need.
    pub fn get_members(&self, id: usize) -> &[ReferenceSample] {
        self.clusters
            .get(id)
            .map(|c| c.members.as_slice())
            .unwrap_or(&[])
    }

    /// The fitted centroid for cluster `id`, in `feature_keys()` order.
    pub fn centroid(&self, id: usize) -> &[f64] {
        self.clusters
            .get(id)
            .map(|c| c.centroid.as_slice())
            .unwrap_or(&[])
    }

    /// The other cluster ids, ordered by ascending centroid-to-centroid
    /// distance from `id`. This is the only definition of "nearby cluster".
    pub fn neighbor_clusters(&self, id: usize) -> Vec<usize> {
        if id >= self.clusters.len() {
            return Vec::new();
        }
        let source = &self.clusters[id].centroid;
        let mut others: Vec<(f64, usize)> = self
            .clusters
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != id)
            .map(|(i, c)| (euclidean(source, &c.centroid), i))
            .collect();
        others.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        others.into_iter().map(|(_, i)| i).collect()
    }
}

/// Anything that can be projected onto a fixed feature-key order: both
/// `ReferenceSample` and `Query` implement this so `assign` works for either.
pub trait QueryVector {
    fn to_vector(&self, keys: &[FeatureKey]) -> Vec<f64>;
}

impl QueryVector for crate::model::Query {
    fn to_vector(&self, keys: &[FeatureKey]) -> Vec<f64> {
        crate::model::Query::to_vector(self, keys)
    }
}

impl QueryVector for ReferenceSample {
    fn to_vector(&self, keys: &[FeatureKey]) -> Vec<f64> {
        ReferenceSample::to_vector(self, keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Query;
    use std::collections::BTreeMap;

    fn sample(id: &str, keys: &[FeatureKey], values: &[f64]) -> ReferenceSample {
        let mut scores = BTreeMap::new();
        for (k, v) in keys.iter().zip(values.iter()) {
            scores.insert(k.clone(), *v);
        }
        ReferenceSample {
            sample_id: id.to_string(),
            scores,
        }
    }

    fn keys() -> Vec<FeatureKey> {
        vec![FeatureKey::new("A", "T1"), FeatureKey::new("B", "T1")]
    }

    #[test]
    fn choose_k_thresholds() {
        assert_eq!(ClusterIndex::choose_k(2999), 1);
        assert_eq!(ClusterIndex::choose_k(3000), 1);
        assert_eq!(ClusterIndex::choose_k(3001), 2);
    }

    #[test]
    fn fit_empty_dataset_errors() {
        let ds = ReferenceDataset::default();
        let err = ClusterIndex::fit(&ds, &keys()).unwrap_err();
        assert!(matches!(err, PredictError::EmptyDataset(_)));
    }

    #[test]
    fn members_are_sorted_ascending_by_distance() {
        let k = keys();
        let ds = ReferenceDataset {
            samples: vec![
                sample("s1", &k, &[8.0, 7.0]),
                sample("s2", &k, &[6.0, 5.0]),
                sample("s3", &k, &[9.0, 8.0]),
            ],
        };
        let index = ClusterIndex::fit(&ds, &k).unwrap();
        assert_eq!(index.cluster_count(), 1);
        let members = index.get_members(0);
        let centroid = index.centroid(0);
        let mut prev = 0.0;
        for m in members {
            let d = euclidean(&m.to_vector(&k), centroid);
            assert!(d + 1e-9 >= prev);
            prev = d;
        }
        assert_eq!(members.len(), 3);
    }

    #[test]
    fn assign_picks_nearest_centroid() {
        let k = keys();
        let ds = ReferenceDataset {
            samples: vec![sample("s1", &k, &[0.0, 0.0]), sample("s2", &k, &[100.0, 100.0])],
        };
        // force K=1 (small dataset), so assign is trivially cluster 0.
        let index = ClusterIndex::fit(&ds, &k).unwrap();
        let mut q = Query::default();
        q.inputs.insert(k[0].clone(), 0.0);
        q.inputs.insert(k[1].clone(), 0.0);
        assert_eq!(index.assign(&q).unwrap(), 0);
    }
}
