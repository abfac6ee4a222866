//! Local regressors: weighted KNN, Nadaraya-Watson kernel regression, and
//! locally weighted linear regression (LWLR). All three consume the same
//! candidate set and predict each target key independently.

pub mod kernel;
pub mod knn;
pub(crate) mod linalg;
pub mod lwlr;

use crate::model::{euclidean, FeatureKey, Query, ReferenceSample};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters for the three regressors, threaded explicitly as a value
/// object rather than a global singleton, so callers can vary them per
/// structure/evaluation run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RegressorParams {
    pub knn_k: usize,
    pub kernel_bandwidth: f64,
    pub lwlr_tau: f64,
}

impl Default for RegressorParams {
    fn default() -> Self {
        RegressorParams {
            knn_k: 5,
            kernel_bandwidth: 1.0,
            lwlr_tau: 1.0,
        }
    }
}

/// A (distance, candidate) pair computed over the intersection of the
/// candidate's own keys with the query's input keys. Candidates with empty
/// intersection carry `distance = None` and contribute zero weight.
pub struct ScoredCandidate<'a> {
    pub distance: Option<f64>,
    pub sample: &'a ReferenceSample,
}

/// Shared pre-step for all three regressors: compute each candidate's
/// distance to `query` over the overlap of keys it actually carries with
/// `query`'s input keys.
pub fn score_candidates<'a>(
    candidates: &[&'a ReferenceSample],
    query: &Query,
) -> Vec<ScoredCandidate<'a>> {
    candidates
        .iter()
        .map(|sample| {
            let overlap: Vec<FeatureKey> = query
                .inputs
                .keys()
                .filter(|k| sample.scores.contains_key(*k))
                .cloned()
                .collect();
            if overlap.is_empty() {
                ScoredCandidate {
                    distance: None,
                    sample,
                }
            } else {
                let q_vec: Vec<f64> = overlap.iter().map(|k| query.get(k).unwrap()).collect();
                let s_vec: Vec<f64> = overlap.iter().map(|k| sample.get(k).unwrap()).collect();
                ScoredCandidate {
                    distance: Some(euclidean(&q_vec, &s_vec)),
                    sample,
                }
            }
        })
        .collect()
}

/// Output of a regressor call: target key -> predicted value, plus a count
/// of candidates that actually carried each target key (feeds
/// `Prediction::confidence`).
pub type RegressionOutput = BTreeMap<FeatureKey, (f64, usize)>;

const EPSILON: f64 = 1e-6;

pub(crate) fn inverse_distance_weight(distance: f64) -> f64 {
    if distance == 0.0 {
        1.0
    } else {
        1.0 / (distance + EPSILON)
    }
}
