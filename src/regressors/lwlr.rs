//! Locally weighted linear regression.

use super::linalg::{solve, weighted_normal_equations};
use super::RegressionOutput;
use crate::model::{euclidean, round2, FeatureKey, Query, ReferenceSample};
use std::collections::BTreeSet;

/// Predict every key in `target_keys` by fitting a bias-augmented weighted
/// linear model per target key, restricted to the common-feature subspace
/// (intersection of the query's input keys with every candidate's keys).
/// Requires >= 2 candidates carrying a target key; skips keys with a
/// singular normal-equation system.
pub fn predict(
    candidates: &[&ReferenceSample],
    query: &Query,
    target_keys: &BTreeSet<FeatureKey>,
    tau: f64,
) -> RegressionOutput {
    let mut output = RegressionOutput::new();
    if candidates.is_empty() || query.inputs.is_empty() || target_keys.is_empty() {
        return output;
    }

    let mut common: BTreeSet<FeatureKey> = query.inputs.keys().cloned().collect();
    for candidate in candidates {
        common.retain(|k| candidate.scores.contains_key(k));
    }
    if common.is_empty() {
        return output;
    }
    let common: Vec<FeatureKey> = common.into_iter().collect();
    let query_point = query.to_vector(&common);

    for key in target_keys {
        let mut rows: Vec<Vec<f64>> = Vec::new();
        let mut targets: Vec<f64> = Vec::new();
        let mut distances: Vec<f64> = Vec::new();

        for candidate in candidates {
            let Some(y) = candidate.get(key) else {
                continue;
            };
            let x = candidate.to_vector(&common);
            let dist = euclidean(&x, &query_point);
            rows.push(x);
            targets.push(y);
            distances.push(dist);
        }

        if rows.len() < 2 {
            continue;
        }

        let weights: Vec<f64> = distances
            .iter()
            .map(|d| (-(d * d) / (2.0 * tau * tau)).exp())
            .collect();

        let design: Vec<Vec<f64>> = rows
            .iter()
            .map(|r| std::iter::once(1.0).chain(r.iter().copied()).collect())
            .collect();

        let (xtwx, xtwy) = weighted_normal_equations(&design, &weights, &targets);
        let Some(theta) = solve(xtwx, xtwy) else {
            continue;
        };

        let query_design: Vec<f64> = std::iter::once(1.0).chain(query_point.iter().copied()).collect();
        let prediction: f64 = theta.iter().zip(query_design.iter()).map(|(t, x)| t * x).sum();

        output.insert(key.clone(), (round2(prediction), rows.len()));
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
    fn single_candidate_target_key_is_skipped() {
        let key = FeatureKey::new("A", "T1");
        let target = FeatureKey::new("A", "T2");
        let s1 = sample("s1", &[(&key, 5.0), (&target, 10.0)]);
        let candidates = vec![&s1];

        let mut query = Query::default();
        query.inputs.insert(key.clone(), 5.0);
        let targets: BTreeSet<FeatureKey> = [target.clone()].into_iter().collect();

        let result = predict(&candidates, &query, &targets, 1.0);
        assert!(!result.contains_key(&target));
    }

    #[test]
    fn fits_linear_relationship_exactly() {
        let key = FeatureKey::new("A", "T1");
        let target = FeatureKey::new("A", "T2");
        // y = 2x exactly, enough points on the line so the weighted fit
        // recovers it closely near the query.
        let samples: Vec<ReferenceSample> = (1..=5)
            .map(|i| sample(&format!("s{i}"), &[(&key, i as f64), (&target, 2.0 * i as f64)]))
            .collect();
        let candidates: Vec<&ReferenceSample> = samples.iter().collect();

        let mut query = Query::default();
        query.inputs.insert(key.clone(), 3.0);
        let targets: BTreeSet<FeatureKey> = [target.clone()].into_iter().collect();

        let result = predict(&candidates, &query, &targets, 10.0);
        assert!((result[&target].0 - 6.0).abs() < 0.1);
    }
}
