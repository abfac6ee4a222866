//! Prediction orchestrator: drives index -> selector -> regressor -> cache ->
//! write-back for a single "update predictions for this user" request.

use crate::cache::{prediction_content_hash, CacheLayer};
use crate::config::RegressorConfig;
use crate::error::{PredictError, Result};
use crate::imputer;
use crate::index::ClusterIndex;
use crate::model::{FeatureKey, Prediction, PredictionStatus, Query, RegressorName};
use crate::regressors::{kernel, knn, lwlr, RegressionOutput, RegressorParams};
use crate::selector;
use crate::stores::{ConfigStore, KvCache, ReferenceStore, StructureStore, UserScoreStore};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// The minimum reference-set size at which the orchestrator routes through a
/// `ClusterIndex` instead of regressing against the whole dataset directly.
const CLUSTERING_THRESHOLD: usize = 3000;

pub struct PredictionEngine<'a, S, R, U, C, K>
where
    S: StructureStore,
    R: ReferenceStore,
    U: UserScoreStore,
    C: ConfigStore,
    K: KvCache,
{
    pub structures: &'a S,
    pub reference: &'a R,
    pub user_scores: &'a U,
    pub config: &'a C,
    pub cache: &'a CacheLayer<K>,
}

#[derive(Serialize)]
struct PredictionCacheInputs<'a> {
    inputs: &'a std::collections::BTreeMap<FeatureKey, f64>,
    regressor: &'static str,
    params: RegressorParams,
}

impl<'a, S, R, U, C, K> PredictionEngine<'a, S, R, U, C, K>
where
    S: StructureStore,
    R: ReferenceStore,
    U: UserScoreStore,
    C: ConfigStore,
    K: KvCache,
{
    /// Update the predictions for `user_id` at `current_time_point` under
    /// the configuration store's current regressor choice. Returns the
    /// count of target keys written back.
    pub async fn predict(&self, user_id: &str, structure_id: &str, current_time_point: &str) -> Result<usize> {
        // 1. Load structure and verify time point.
        let structure = self.structures.get_structure(structure_id).await?;
        let t_star = structure
            .time_point_index(current_time_point)
            .ok_or_else(|| PredictError::UnknownTimePoint(current_time_point.to_string()))?;

        // 2. Load reference dataset.
        let reference = self.reference.load_reference(structure_id).await?;
        if reference.is_empty() {
            return Ok(0);
        }

        // 3. Load/create the user's score records.
        let feature_keys = structure.feature_keys();
        self.user_scores.ensure_records(user_id, structure_id, &feature_keys).await?;
        let existing = self.user_scores.load_scores(user_id, structure_id).await?;

        // 4. Input/target key sets, with missing-current backfill.
        let input_keys = structure.input_keys(t_star);
        let mut target_keys: BTreeSet<FeatureKey> = structure.future_keys(t_star).into_iter().collect();

        let mut query = Query::default();
        for key in &input_keys {
            match existing.get(key).and_then(|r| r.actual_value) {
                Some(value) => {
                    query.inputs.insert(key.clone(), value);
                }
                None => {
                    target_keys.insert(key.clone());
                }
            }
        }

        // 5. Impute missing input values. A key the imputer fills is
        // resolved by imputation, not by regression: drop it from the
        // target set so the write-back below doesn't overwrite its
        // "imputed" status with a regressor-generated one.
        let imputation = imputer::impute(&reference, &input_keys, &query);
        let query = imputation.query;
        for key in &imputation.filled_keys {
            target_keys.remove(key);
            if let Some(value) = query.get(key) {
                self.user_scores
                    .upsert_prediction(user_id, structure_id, key, value, "knn_imputer", "imputed")
                    .await?;
            }
        }

        let regressor_config = self.config.regressor_config().await?;

        // 6. Prediction cache lookup.
        let cache_inputs = PredictionCacheInputs {
            inputs: &query.inputs,
            regressor: regressor_config.name.as_str(),
            params: regressor_config.params,
        };
        let content_hash = prediction_content_hash(&cache_inputs);

        if let Some(cached) = self
            .cache
            .get_predictions(user_id, structure_id, current_time_point, &content_hash)
            .await
        {
            debug!(user_id, structure_id, "prediction cache hit");
            return self.write_back(user_id, structure_id, &cached).await;
        }

        // 7/8. Clustered vs direct regression.
        let output = if reference.len() >= CLUSTERING_THRESHOLD {
            self.predict_clustered(structure_id, &reference, &feature_keys, &query, &target_keys, &regressor_config)
                .await?
        } else {
            run_regressor(
                &reference.samples.iter().collect::<Vec<_>>(),
                &query,
                &target_keys,
                &regressor_config,
            )
        };

        let total_candidates = if reference.len() >= CLUSTERING_THRESHOLD {
            selector::DEFAULT_TARGET
        } else {
            reference.len()
        };

        let predictions: Vec<Prediction> = output
            .into_iter()
            .map(|(key, (value, count))| Prediction {
                key,
                value,
                regressor: regressor_config.name,
                status: PredictionStatus::Generated,
                confidence: confidence(count, total_candidates),
            })
            .collect();

        // 9. Cache the result.
        self.cache
            .put_predictions(user_id, structure_id, current_time_point, &content_hash, &predictions)
            .await;

        // 10/11. Write back and return count.
        self.write_back(user_id, structure_id, &predictions).await
    }

    async fn predict_clustered(
        &self,
        structure_id: &str,
        reference: &crate::model::ReferenceDataset,
        feature_keys: &[FeatureKey],
        query: &Query,
        target_keys: &BTreeSet<FeatureKey>,
        regressor_config: &RegressorConfig,
    ) -> Result<RegressionOutput> {
        let dataset_hash = self.reference.dataset_hash(structure_id).await?;
        let index = match self.cache.get_index(structure_id, &dataset_hash).await {
            Some(index) => index,
            None => {
                info!(structure_id, "building cluster index");
                let index = ClusterIndex::fit(reference, feature_keys)?;
                self.cache.put_index(structure_id, &dataset_hash, &index).await?;
                index
            }
        };

        let candidates = selector::select_candidates(&index, query, selector::DEFAULT_TARGET);
        Ok(run_regressor(&candidates, query, target_keys, regressor_config))
    }

    async fn write_back(&self, user_id: &str, structure_id: &str, predictions: &[Prediction]) -> Result<usize> {
        for prediction in predictions {
            self.user_scores
                .upsert_prediction(
                    user_id,
                    structure_id,
                    &prediction.key,
                    prediction.value,
                    prediction.regressor.as_str(),
                    "active",
                )
                .await?;
        }
        Ok(predictions.len())
    }
}

fn run_regressor(
    candidates: &[&crate::model::ReferenceSample],
    query: &Query,
    target_keys: &BTreeSet<FeatureKey>,
    config: &RegressorConfig,
) -> RegressionOutput {
    match config.name {
        RegressorName::Knn => knn::predict(candidates, query, target_keys, config.params.knn_k),
        RegressorName::KernelRegression => kernel::predict(candidates, query, target_keys, config.params.kernel_bandwidth),
        RegressorName::Lwlr => lwlr::predict(candidates, query, target_keys, config.params.lwlr_tau),
    }
}

/// A prediction's confidence reflects how many candidates actually carried
/// the target key relative to the full candidate-set size.
fn confidence(carrying: usize, total_candidates: usize) -> f64 {
    if total_candidates == 0 {
        return 0.0;
    }
    (carrying as f64 / total_candidates as f64).min(1.0)
}
