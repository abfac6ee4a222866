//! Holdout evaluation harness: reports MAE/MSE/RMSE/accuracy for all three
//! regressors and recommends the best one.

use crate::cache::CacheLayer;
use crate::error::{PredictError, Result};
use crate::index::ClusterIndex;
use crate::model::{euclidean, round2, FeatureKey, Query, ReferenceDataset, RegressorName, ScaleType};
use crate::regressors::{kernel, knn, lwlr, RegressorParams};
use crate::selector;
use crate::stores::KvCache;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

const MIN_VALID_SAMPLES: usize = 20;
const CLUSTERED_THRESHOLD: usize = 3000;
const SPLIT_SEED: u64 = 42;
const TRAIN_FRACTION: f64 = 0.8;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegressorMetrics {
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegressorResult {
    Metrics(RegressorMetrics),
    Error { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub results: BTreeMap<String, RegressorResult>,
    pub recommendation: Option<String>,
    pub method: String,
}

pub struct EvaluationHarness<'a, K: KvCache> {
    pub cache: &'a CacheLayer<K>,
}

impl<'a, K: KvCache> EvaluationHarness<'a, K> {
    pub async fn evaluate(
        &self,
        structure_id: &str,
        dataset: &ReferenceDataset,
        scale_type: ScaleType,
        input_time_points: &[String],
        output_time_points: &[String],
        subjects: &[String],
        params: RegressorParams,
    ) -> Result<EvaluationResult> {
        let input_keys: Vec<FeatureKey> = input_time_points
            .iter()
            .flat_map(|tp| subjects.iter().map(move |s| FeatureKey::new(s, tp)))
            .collect();
        let output_keys: Vec<FeatureKey> = output_time_points
            .iter()
            .flat_map(|tp| subjects.iter().map(move |s| FeatureKey::new(s, tp)))
            .collect();

        let mut required = input_keys.clone();
        required.extend(output_keys.iter().cloned());
        let valid = dataset.filter_complete(&required);

        if valid.len() < MIN_VALID_SAMPLES {
            return Err(PredictError::InsufficientEvaluationData {
                have: valid.len(),
                need: MIN_VALID_SAMPLES,
            });
        }

        let method = if valid.len() >= CLUSTERED_THRESHOLD { "clustered" } else { "standard" };

        let content_hash = crate::model::hash::content_hash(&(input_time_points, output_time_points, params));

        if let Some(cached) = self
            .cache
            .get_evaluation::<EvaluationResult>(structure_id, method, &content_hash)
            .await
        {
            return Ok(cached);
        }

        let mut rng = StdRng::seed_from_u64(SPLIT_SEED);
        let mut indices: Vec<usize> = (0..valid.len()).collect();
        indices.shuffle(&mut rng);
        let split = ((valid.len() as f64) * TRAIN_FRACTION).round() as usize;
        let train_idx = &indices[..split];
        let test_idx = &indices[split..];

        let train: Vec<&crate::model::ReferenceSample> = train_idx.iter().map(|&i| valid[i]).collect();
        let test: Vec<&crate::model::ReferenceSample> = test_idx.iter().map(|&i| valid[i]).collect();

        let scale_max = scale_type.max();
        let mut results = BTreeMap::new();

        for name in [RegressorName::Knn, RegressorName::KernelRegression, RegressorName::Lwlr] {
            let outcome = if method == "clustered" {
                self.evaluate_clustered(name, &input_keys, &output_keys, &train, &test, params)
            } else {
                evaluate_plain(name, &input_keys, &output_keys, &train, &test, params)
            };
            let result = match outcome {
                Ok(metrics) => {
                    let accuracy = accuracy_from_mae(metrics.mae, scale_max);
                    RegressorResult::Metrics(RegressorMetrics {
                        mae: metrics.mae,
                        mse: metrics.mse,
                        rmse: metrics.rmse,
                        accuracy,
                    })
                }
                Err(e) => RegressorResult::Error { error: e.to_string() },
            };
            results.insert(name.as_str().to_string(), result);
        }

        let recommendation = results
            .iter()
            .filter_map(|(name, result)| match result {
                RegressorResult::Metrics(m) => Some((name.clone(), m.accuracy)),
                RegressorResult::Error { .. } => None,
            })
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(name, _)| name);

        info!(structure_id, method, ?recommendation, "evaluation complete");

        let result = EvaluationResult {
            results,
            recommendation,
            method: method.to_string(),
        };
        self.cache.put_evaluation(structure_id, method, &content_hash, &result).await;
        Ok(result)
    }

    fn evaluate_clustered(
        &self,
        name: RegressorName,
        input_keys: &[FeatureKey],
        output_keys: &[FeatureKey],
        train: &[&crate::model::ReferenceSample],
        test: &[&crate::model::ReferenceSample],
        params: RegressorParams,
    ) -> Result<Metrics> {
        let feature_keys: Vec<FeatureKey> = input_keys.iter().chain(output_keys.iter()).cloned().collect();
        let train_dataset = ReferenceDataset {
            samples: train.iter().map(|s| (*s).clone()).collect(),
        };
        let index = ClusterIndex::fit(&train_dataset, &feature_keys)?;
        let target_keys: BTreeSet<FeatureKey> = output_keys.iter().cloned().collect();

        let mut errors = Vec::with_capacity(test.len());
        for sample in test {
            let mut query = Query::default();
            for key in input_keys {
                if let Some(v) = sample.get(key) {
                    query.inputs.insert(key.clone(), v);
                }
            }
            let candidates = selector::select_candidates(&index, &query, selector::DEFAULT_TARGET);
            let output = match name {
                RegressorName::Knn => knn::predict(&candidates, &query, &target_keys, params.knn_k),
                RegressorName::KernelRegression => kernel::predict(&candidates, &query, &target_keys, params.kernel_bandwidth),
                RegressorName::Lwlr => lwlr::predict(&candidates, &query, &target_keys, params.lwlr_tau),
            };
            if output.is_empty() {
                continue;
            }
            let predicted_mean = output.values().map(|(v, _)| v).sum::<f64>() / output.len() as f64;
            let actual_mean = mean_of_keys(sample, output_keys);
            errors.push(predicted_mean - actual_mean);
        }
        metrics_from_errors(&errors)
    }
}

struct Metrics {
    mae: f64,
    mse: f64,
    rmse: f64,
}

fn metrics_from_errors(errors: &[f64]) -> Result<Metrics> {
    if errors.is_empty() {
        return Err(PredictError::fatal("no test predictions produced"));
    }
    let n = errors.len() as f64;
    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
    let mse = errors.iter().map(|e| e * e).sum::<f64>() / n;
    Ok(Metrics {
        mae,
        mse,
        rmse: mse.sqrt(),
    })
}

fn accuracy_from_mae(mae: f64, scale_max: f64) -> f64 {
    let raw = 100.0 - (mae / scale_max) * 100.0;
    round2(raw.clamp(0.0, 100.0))
}

fn mean_of_keys(sample: &crate::model::ReferenceSample, keys: &[FeatureKey]) -> f64 {
    let values: Vec<f64> = keys.iter().filter_map(|k| sample.get(k)).collect();
    values.iter().sum::<f64>() / values.len() as f64
}

/// The non-clustered evaluation path: scalar target per sample, dedicated
/// scalar forms of each regressor rather than the per-target-key
/// production path.
fn evaluate_plain(
    name: RegressorName,
    input_keys: &[FeatureKey],
    output_keys: &[FeatureKey],
    train: &[&crate::model::ReferenceSample],
    test: &[&crate::model::ReferenceSample],
    params: RegressorParams,
) -> Result<Metrics> {
    let train_vectors: Vec<Vec<f64>> = train.iter().map(|s| s.to_vector(input_keys)).collect();
    let train_targets: Vec<f64> = train.iter().map(|s| mean_of_keys(s, output_keys)).collect();

    let mut errors = Vec::with_capacity(test.len());
    for sample in test {
        let x = sample.to_vector(input_keys);
        let actual = mean_of_keys(sample, output_keys);
        let predicted = match name {
            RegressorName::Knn => plain_knn(&x, &train_vectors, &train_targets, params.knn_k),
            RegressorName::KernelRegression => plain_kernel(&x, &train_vectors, &train_targets, params.kernel_bandwidth),
            RegressorName::Lwlr => plain_tricube_lwlr(&x, &train_vectors, &train_targets, params.lwlr_tau),
        };
        if let Some(p) = predicted {
            errors.push(p - actual);
        }
    }
    metrics_from_errors(&errors)
}

fn plain_knn(x: &[f64], train: &[Vec<f64>], targets: &[f64], k: usize) -> Option<f64> {
    if train.is_empty() {
        return None;
    }
    let mut scored: Vec<(f64, f64)> = train
        .iter()
        .zip(targets.iter())
        .map(|(row, &t)| (euclidean(x, row), t))
        .collect();
    scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let top = &scored[..k.min(scored.len())];
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (dist, target) in top {
        let weight = if *dist == 0.0 { 1.0 } else { 1.0 / (dist + 1e-6) };
        numerator += weight * target;
        denominator += weight;
    }
    if denominator > 0.0 {
        Some(round2(numerator / denominator))
    } else {
        None
    }
}

fn plain_kernel(x: &[f64], train: &[Vec<f64>], targets: &[f64], sigma: f64) -> Option<f64> {
    if train.is_empty() {
        return None;
    }
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (row, &target) in train.iter().zip(targets.iter()) {
        let d = euclidean(x, row);
        let weight = (-(d * d) / (2.0 * sigma * sigma)).exp();
        numerator += weight * target;
        denominator += weight;
    }
    if denominator > 0.0 {
        Some(round2(numerator / denominator))
    } else {
        None
    }
}

/// Tricube-weighted linear regression: bandwidth = max-distance / tau
/// (floored at 0.1); weight = (1-(d/bw)^3)^3 within the window, 0.01
/// outside.
fn plain_tricube_lwlr(x: &[f64], train: &[Vec<f64>], targets: &[f64], tau: f64) -> Option<f64> {
    if train.len() < 2 {
        return None;
    }
    let distances: Vec<f64> = train.iter().map(|row| euclidean(x, row)).collect();
    let max_distance = distances.iter().cloned().fold(0.0, f64::max);
    let bandwidth = (max_distance / tau).max(0.1);

    let weights: Vec<f64> = distances
        .iter()
        .map(|&d| {
            let ratio = d / bandwidth;
            if ratio < 1.0 {
                (1.0 - ratio.powi(3)).powi(3)
            } else {
                0.01
            }
        })
        .collect();

    let design: Vec<Vec<f64>> = train
        .iter()
        .map(|row| std::iter::once(1.0).chain(row.iter().copied()).collect())
        .collect();

    let (xtwx, xtwy) = crate::regressors::linalg::weighted_normal_equations(&design, &weights, targets);
    let theta = crate::regressors::linalg::solve(xtwx, xtwy)?;

    let query_design: Vec<f64> = std::iter::once(1.0).chain(x.iter().copied()).collect();
    Some(round2(theta.iter().zip(query_design.iter()).map(|(t, v)| t * v).sum()))
}
