//! Weighted k-nearest-neighbors regression.

use super::{inverse_distance_weight, score_candidates, RegressionOutput};
use crate::model::{round2, FeatureKey, Query, ReferenceSample};
use std::collections::BTreeSet;

/// Predict every key in `target_keys` from the weighted average of the `k`
/// nearest candidates carrying that key. Weight = 1/(distance + eps),
/// distance 0 -> weight 1.0. Keys with no carrying candidate are omitted.
pub fn predict(
    candidates: &[&ReferenceSample],
    query: &Query,
    target_keys: &BTreeSet<FeatureKey>,
    k: usize,
) -> RegressionOutput {
    let mut output = RegressionOutput::new();
    if candidates.is_empty() || query.inputs.is_empty() || target_keys.is_empty() {
        return output;
    }

    let mut scored: Vec<_> = score_candidates(candidates, query)
        .into_iter()
        .filter_map(|c| c.distance.map(|d| (d, c.sample)))
        .collect();
    scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let top = &scored[..k.min(scored.len())];

    for key in target_keys {
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        let mut count = 0usize;
        for (distance, sample) in top {
            if let Some(value) = sample.get(key) {
                let weight = inverse_distance_weight(*distance);
                numerator += weight * value;
                denominator += weight;
                count += 1;
            }
        }
        if denominator > 0.0 {
            output.insert(key.clone(), (round2(numerator / denominator), count));
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample(id: &str, pairs: &[(&FeatureKey, f64)]) -> ReferenceSample {
        let mut scores = BTreeMap::new();
        for (k, v) in pairs {
            scores.insert((*k).clone(), *v);
        }
        ReferenceSample {
            sample_id: id.to_string(),
            scores,
        }
    }

    #[test]
    fn knn_exact_match_wins() {
        let a_t1 = FeatureKey::new("A", "T1");
        let b_t1 = FeatureKey::new("B", "T1");
        let a_t2 = FeatureKey::new("A", "T2");
        let b_t2 = FeatureKey::new("B", "T2");

        let s1 = sample(
            "s1",
            &[(&a_t1, 8.0), (&b_t1, 7.0), (&a_t2, 9.0), (&b_t2, 8.0)],
        );
        let s2 = sample(
            "s2",
            &[(&a_t1, 6.0), (&b_t1, 5.0), (&a_t2, 7.0), (&b_t2, 6.0)],
        );
        let candidates = vec![&s1, &s2];

        let mut query = Query::default();
        query.inputs.insert(a_t1.clone(), 8.0);
        query.inputs.insert(b_t1.clone(), 7.0);

        let targets: BTreeSet<FeatureKey> = [a_t2.clone(), b_t2.clone()].into_iter().collect();
        let result = predict(&candidates, &query, &targets, 2);

        assert_eq!(result[&a_t2].0, 9.0);
        assert_eq!(result[&b_t2].0, 8.0);
    }

    #[test]
    fn uniform_distance_equals_plain_mean() {
        let key = FeatureKey::new("A", "T1");
        let target = FeatureKey::new("A", "T2");
        let s1 = sample("s1", &[(&key, 5.0), (&target, 10.0)]);
        let s2 = sample("s2", &[(&key, 5.0), (&target, 20.0)]);
        let s3 = sample("s3", &[(&key, 5.0), (&target, 30.0)]);
        let candidates = vec![&s1, &s2, &s3];

        let mut query = Query::default();
        query.inputs.insert(key.clone(), 5.0);
        let targets: BTreeSet<FeatureKey> = [target.clone()].into_iter().collect();

        let result = predict(&candidates, &query, &targets, candidates.len());
        assert_eq!(result[&target].0, 20.0);
    }

    #[test]
    fn omits_key_with_no_carrying_candidate() {
        let key = FeatureKey::new("A", "T1");
        let target = FeatureKey::new("A", "T2");
        let other_target = FeatureKey::new("B", "T2");
        let s1 = sample("s1", &[(&key, 5.0), (&target, 10.0)]);
        let candidates = vec![&s1];

        let mut query = Query::default();
        query.inputs.insert(key.clone(), 5.0);
        let targets: BTreeSet<FeatureKey> = [target.clone(), other_target.clone()].into_iter().collect();

        let result = predict(&candidates, &query, &targets, 1);
        assert!(result.contains_key(&target));
        assert!(!result.contains_key(&other_target));
    }
}
