//! Nadaraya-Watson kernel regression with a Gaussian kernel.

use super::{score_candidates, RegressionOutput};
use crate::model::{round2, FeatureKey, Query, ReferenceSample};
use std::collections::BTreeSet;

/// Predict every key in `target_keys` via Gaussian-kernel-weighted average:
/// weight = exp(-distance^2 / (2*sigma^2)); omit a key when its denominator
/// is zero (no candidate carries it, or every carrying candidate has empty
/// overlap with the query).
pub fn predict(
    candidates: &[&ReferenceSample],
    query: &Query,
    target_keys: &BTreeSet<FeatureKey>,
    sigma: f64,
) -> RegressionOutput {
    let mut output = RegressionOutput::new();
    if candidates.is_empty() || query.inputs.is_empty() || target_keys.is_empty() {
        return output;
    }

    let weights: Vec<(f64, &ReferenceSample)> = score_candidates(candidates, query)
        .into_iter()
        .map(|c| {
            let w = match c.distance {
                Some(d) => (-(d * d) / (2.0 * sigma * sigma)).exp(),
                None => 0.0,
            };
            (w, c.sample)
        })
        .collect();

    for key in target_keys {
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        let mut count = 0usize;
        for (weight, sample) in &weights {
            if *weight == 0.0 {
                continue;
            }
            if let Some(value) = sample.get(key) {
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
    fn large_sigma_converges_to_unweighted_mean() {
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
        query.inputs.insert(a_t1.clone(), 7.0);
        query.inputs.insert(b_t1.clone(), 6.0);

        let targets: BTreeSet<FeatureKey> = [a_t2.clone(), b_t2.clone()].into_iter().collect();
        let result = predict(&candidates, &query, &targets, 1e9);

        assert_eq!(result[&a_t2].0, 8.0);
        assert_eq!(result[&b_t2].0, 7.0);
    }

    #[test]
    fn tiny_sigma_converges_to_nearest_neighbor() {
        let key = FeatureKey::new("A", "T1");
        let target = FeatureKey::new("A", "T2");
        let near = sample("near", &[(&key, 5.0), (&target, 100.0)]);
        let far = sample("far", &[(&key, 50.0), (&target, 0.0)]);
        let candidates = vec![&near, &far];

        let mut query = Query::default();
        query.inputs.insert(key.clone(), 5.0);
        let targets: BTreeSet<FeatureKey> = [target.clone()].into_iter().collect();

        let result = predict(&candidates, &query, &targets, 1e-6);
        assert!((result[&target].0 - 100.0).abs() < 1.0);
    }
}
