//! Adaptive neighborhood selector: merges or truncates cluster membership to
//! target roughly 3000 candidates per query.

use crate::index::{ClusterIndex, QueryVector};
use crate::model::ReferenceSample;

pub const DEFAULT_TARGET: usize = 3000;

/// Produce a candidate set for `query` from `index`, aiming for `target`
/// members. Order within the result does not matter to any regressor, so no
/// re-sort happens after merging.
pub fn select_candidates<'a>(
    index: &'a ClusterIndex,
    query: &dyn QueryVector,
    target: usize,
) -> Vec<&'a ReferenceSample> {
    let home = match index.assign(query) {
        Ok(id) => id,
        Err(_) => return Vec::new(),
    };

    let home_members = index.get_members(home);

    if home_members.len() >= target {
        return home_members.iter().take(target).collect();
    }

    let mut candidates: Vec<&ReferenceSample> = home_members.iter().collect();
    for neighbor in index.neighbor_clusters(home) {
        if candidates.len() >= target {
            break;
        }
        candidates.extend(index.get_members(neighbor).iter());
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FeatureKey, Query, ReferenceDataset};
    use std::collections::BTreeMap;

    fn keys() -> Vec<FeatureKey> {
        vec![FeatureKey::new("A", "T1")]
    }

    fn sample(id: &str, key: &FeatureKey, value: f64) -> ReferenceSample {
        let mut scores = BTreeMap::new();
        scores.insert(key.clone(), value);
        ReferenceSample {
            sample_id: id.to_string(),
            scores,
        }
    }

    #[test]
    fn small_dataset_is_passthrough() {
        let k = keys();
        let samples: Vec<ReferenceSample> = (0..10)
            .map(|i| sample(&format!("s{i}"), &k[0], i as f64))
            .collect();
        let ds = ReferenceDataset { samples };
        let index = ClusterIndex::fit(&ds, &k).unwrap();
        let mut q = Query::default();
        q.inputs.insert(k[0].clone(), 5.0);
        let candidates = select_candidates(&index, &q, DEFAULT_TARGET);
        assert_eq!(candidates.len(), 10);
    }

    #[test]
    fn truncates_to_target_when_home_cluster_is_larger() {
        let k = keys();
        let samples: Vec<ReferenceSample> = (0..50)
            .map(|i| sample(&format!("s{i}"), &k[0], i as f64))
            .collect();
        let ds = ReferenceDataset { samples };
        let index = ClusterIndex::fit(&ds, &k).unwrap();
        let mut q = Query::default();
        q.inputs.insert(k[0].clone(), 25.0);
        let candidates = select_candidates(&index, &q, 5);
        assert_eq!(candidates.len(), 5);
    }
}
