//! Missing-input imputer: fills holes among a query's input keys using the
//! reference dataset as a donor pool before regression sees the query.

use crate::model::{FeatureKey, Query, ReferenceDataset};
use std::collections::BTreeMap;
use tracing::warn;

const MAX_NEIGHBORS: usize = 10;

/// Result of imputation: the merged query plus the set of keys that were
/// actually filled (these get written back with source "knn_imputer" and
/// status "imputed" by the orchestrator).
pub struct ImputationResult {
    pub query: Query,
    pub filled_keys: Vec<FeatureKey>,
}

/// Fill any `input_keys` missing from `query.inputs` using KNN imputation
/// over `reference` restricted to `input_keys` columns. `n_neighbors =
/// min(10, available donor rows)`. Falls back to the unfilled query if no
/// reference row shares any input key with the query.
pub fn impute(reference: &ReferenceDataset, input_keys: &[FeatureKey], query: &Query) -> ImputationResult {
    let missing: Vec<FeatureKey> = input_keys
        .iter()
        .filter(|k| !query.inputs.contains_key(k))
        .cloned()
        .collect();

    if missing.is_empty() {
        return ImputationResult {
            query: query.clone(),
            filled_keys: Vec::new(),
        };
    }

    let known_keys: Vec<&FeatureKey> = input_keys
        .iter()
        .filter(|k| query.inputs.contains_key(*k))
        .collect();

    if known_keys.is_empty() || reference.is_empty() {
        warn!("imputer: no known input keys or empty reference, falling back to unfilled query");
        return ImputationResult {
            query: query.clone(),
            filled_keys: Vec::new(),
        };
    }

    // Distance to each reference row over the keys both sides carry.
    let mut distances: Vec<(f64, usize)> = Vec::new();
    for (idx, sample) in reference.samples.iter().enumerate() {
        let mut sum_sq = 0.0;
        let mut shared = 0usize;
        for key in &known_keys {
            if let (Some(qv), Some(sv)) = (query.get(key), sample.get(key)) {
                sum_sq += (qv - sv) * (qv - sv);
                shared += 1;
            }
        }
        if shared > 0 {
            distances.push((sum_sq.sqrt(), idx));
        }
    }

    if distances.is_empty() {
        warn!("imputer: no reference rows share input keys with query, falling back");
        return ImputationResult {
            query: query.clone(),
            filled_keys: Vec::new(),
        };
    }

    distances.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let n_neighbors = MAX_NEIGHBORS.min(distances.len());
    let neighbors = &distances[..n_neighbors];

    let mut filled: BTreeMap<FeatureKey, f64> = BTreeMap::new();
    for key in &missing {
        let mut sum = 0.0;
        let mut count = 0usize;
        for (_, idx) in neighbors {
            if let Some(v) = reference.samples[*idx].get(key) {
                sum += v;
                count += 1;
            }
        }
        if count > 0 {
            filled.insert(key.clone(), sum / count as f64);
        }
    }

    let mut merged = query.clone();
    let mut filled_keys = Vec::new();
    for (key, value) in filled {
        merged.inputs.insert(key.clone(), value);
        filled_keys.push(key);
    }

    ImputationResult {
        query: merged,
        filled_keys,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReferenceSample;
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
    fn fills_missing_input_key_from_neighbors() {
        let a_t1 = FeatureKey::new("A", "T1");
        let b_t1 = FeatureKey::new("B", "T1");
        let input_keys = vec![a_t1.clone(), b_t1.clone()];

        let reference = ReferenceDataset {
            samples: vec![
                sample("s1", &[(&a_t1, 8.0), (&b_t1, 7.0)]),
                sample("s2", &[(&a_t1, 6.0), (&b_t1, 7.0)]),
            ],
        };

        let mut query = Query::default();
        query.inputs.insert(b_t1.clone(), 7.0); // A_T1 missing

        let result = impute(&reference, &input_keys, &query);
        assert!(result.filled_keys.contains(&a_t1));
        assert!(result.query.get(&a_t1).is_some());
    }

    #[test]
    fn no_known_keys_falls_back_unfilled() {
        let a_t1 = FeatureKey::new("A", "T1");
        let input_keys = vec![a_t1.clone()];
        let reference = ReferenceDataset {
            samples: vec![sample("s1", &[(&a_t1, 8.0)])],
        };
        let query = Query::default();
        let result = impute(&reference, &input_keys, &query);
        assert!(result.filled_keys.is_empty());
    }
}
