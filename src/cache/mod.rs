//! The three content-addressed caches (cluster index, prediction,
//! evaluation), their key formats, TTLs, and invalidation primitives.

pub mod redis_kv;

use crate::config::CacheTtls;
use crate::error::Result;
use crate::index::ClusterIndex;
use crate::model::hash::content_hash;
use crate::model::Prediction;
use crate::stores::KvCache;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// `cluster:<structure_id>:<dataset_hash>`
pub fn index_key(structure_id: &str, dataset_hash: &str) -> String {
    format!("cluster:{structure_id}:{dataset_hash}")
}

/// `prediction:<user_id>:<structure_id>:<tp>:<content_hash>`
pub fn prediction_key(user_id: &str, structure_id: &str, current_time_point: &str, content_hash: &str) -> String {
    format!("prediction:{user_id}:{structure_id}:{current_time_point}:{content_hash}")
}

/// `evaluation:<structure_id>:<method>:<content_hash>`
pub fn evaluation_key(structure_id: &str, method: &str, content_hash: &str) -> String {
    format!("evaluation:{structure_id}:{method}:{content_hash}")
}

/// Content hash over the prediction-cache inputs: query input map,
/// regressor name, regressor parameters.
pub fn prediction_content_hash<T: Serialize>(inputs_and_params: &T) -> String {
    content_hash(inputs_and_params)
}

/// Breakdown of cache contents per family, reporting one count per cache
/// family rather than a single aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub index_keys: usize,
    pub prediction_keys: usize,
    pub evaluation_keys: usize,
    pub approx_bytes: usize,
    pub ttls: CacheTtls,
}

/// Facade over a `KvCache` implementing the three named caches plus
/// pattern-based invalidation. The cache is optional end to end: every
/// method degrades to a miss/no-op if the backing `KvCache` is unreachable,
/// never an error.
pub struct CacheLayer<C: KvCache> {
    kv: C,
    ttls: CacheTtls,
}

impl<C: KvCache> CacheLayer<C> {
    pub fn new(kv: C, ttls: CacheTtls) -> Self {
        CacheLayer { kv, ttls }
    }

    pub async fn get_index(&self, structure_id: &str, dataset_hash: &str) -> Option<ClusterIndex> {
        let key = index_key(structure_id, dataset_hash);
        let bytes = self.kv.get(&key).await?;
        match bincode::deserialize(&bytes) {
            Ok(index) => {
                debug!(key = %key, "cluster index cache hit");
                Some(index)
            }
            Err(e) => {
                debug!(key = %key, error = %e, "cluster index cache entry unreadable, treating as miss");
                None
            }
        }
    }

    pub async fn put_index(&self, structure_id: &str, dataset_hash: &str, index: &ClusterIndex) -> Result<()> {
        let key = index_key(structure_id, dataset_hash);
        let bytes = bincode::serialize(index).map_err(|e| crate::error::PredictError::SerializationFailed(e.to_string()))?;
        self.kv.setex(&key, self.ttls.index_secs, bytes).await;
        Ok(())
    }

    pub async fn get_predictions(
        &self,
        user_id: &str,
        structure_id: &str,
        current_time_point: &str,
        content_hash: &str,
    ) -> Option<Vec<Prediction>> {
        let key = prediction_key(user_id, structure_id, current_time_point, content_hash);
        let bytes = self.kv.get(&key).await?;
        serde_json::from_slice(&bytes).ok()
    }

    pub async fn put_predictions(
        &self,
        user_id: &str,
        structure_id: &str,
        current_time_point: &str,
        content_hash: &str,
        predictions: &[Prediction],
    ) {
        let key = prediction_key(user_id, structure_id, current_time_point, content_hash);
        if let Ok(bytes) = serde_json::to_vec(predictions) {
            self.kv.setex(&key, self.ttls.prediction_secs, bytes).await;
        }
    }

    pub async fn get_evaluation<T: for<'de> Deserialize<'de>>(
        &self,
        structure_id: &str,
        method: &str,
        content_hash: &str,
    ) -> Option<T> {
        let key = evaluation_key(structure_id, method, content_hash);
        let bytes = self.kv.get(&key).await?;
        serde_json::from_slice(&bytes).ok()
    }

    pub async fn put_evaluation<T: Serialize>(&self, structure_id: &str, method: &str, content_hash: &str, result: &T) {
        let key = evaluation_key(structure_id, method, content_hash);
        if let Ok(bytes) = serde_json::to_vec(result) {
            self.kv.setex(&key, self.ttls.evaluation_secs, bytes).await;
        }
    }

    /// Delete every prediction-cache entry matching the given scope.
    /// `user_id`/`structure_id` are optional filters over the
    /// `prediction:<user_id>:<structure_id>:...` key shape.
    pub async fn invalidate_prediction_cache(&self, user_id: Option<&str>, structure_id: Option<&str>) -> usize {
        let pattern = match (user_id, structure_id) {
            (Some(u), Some(s)) => format!("prediction:{u}:{s}:*"),
            (Some(u), None) => format!("prediction:{u}:*"),
            (None, Some(s)) => format!("prediction:*:{s}:*"),
            (None, None) => "prediction:*".to_string(),
        };
        self.delete_matching(&pattern).await
    }

    pub async fn invalidate_evaluation_cache(&self, structure_id: Option<&str>) -> usize {
        let pattern = match structure_id {
            Some(s) => format!("evaluation:{s}:*"),
            None => "evaluation:*".to_string(),
        };
        self.delete_matching(&pattern).await
    }

    pub async fn invalidate_index_cache(&self, structure_id: &str) -> usize {
        self.delete_matching(&format!("cluster:{structure_id}:*")).await
    }

    async fn delete_matching(&self, pattern: &str) -> usize {
        let keys = self.kv.scan_iter(pattern).await;
        for key in &keys {
            self.kv.delete(key).await;
        }
        keys.len()
    }

    pub async fn stats(&self) -> CacheStats {
        let index_keys = self.kv.scan_iter("cluster:*").await;
        let prediction_keys = self.kv.scan_iter("prediction:*").await;
        let evaluation_keys = self.kv.scan_iter("evaluation:*").await;
        CacheStats {
            index_keys: index_keys.len(),
            prediction_keys: prediction_keys.len(),
            evaluation_keys: evaluation_keys.len(),
            approx_bytes: 0,
            ttls: self.ttls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FeatureKey, ReferenceDataset};
    use crate::stores::testing::InMemoryKvCache;

    fn fitted_index() -> ClusterIndex {
        let key = FeatureKey::new("A", "T1");
        let mut scores = std::collections::BTreeMap::new();
        scores.insert(key.clone(), 5.0);
        let sample = crate::model::ReferenceSample {
            sample_id: "s1".into(),
            scores,
        };
        let ds = ReferenceDataset { samples: vec![sample] };
        ClusterIndex::fit(&ds, &[key]).unwrap()
    }

    #[tokio::test]
    async fn index_round_trips_through_cache() {
        let layer = CacheLayer::new(InMemoryKvCache::default(), CacheTtls::default());
        let index = fitted_index();
        layer.put_index("s1", "hash1", &index).await.unwrap();
        let loaded = layer.get_index("s1", "hash1").await;
        assert!(loaded.is_some());
        assert_eq!(loaded.unwrap().cluster_count(), index.cluster_count());
    }

    #[tokio::test]
    async fn missing_index_is_a_miss() {
        let layer = CacheLayer::new(InMemoryKvCache::default(), CacheTtls::default());
        assert!(layer.get_index("s1", "nope").await.is_none());
    }

    #[tokio::test]
    async fn invalidate_prediction_cache_scopes_by_user_and_structure() {
        let layer = CacheLayer::new(InMemoryKvCache::default(), CacheTtls::default());
        layer.put_predictions("u1", "s1", "T1", "h1", &[]).await;
        layer.put_predictions("u2", "s1", "T1", "h2", &[]).await;
        let removed = layer.invalidate_prediction_cache(Some("u1"), Some("s1")).await;
        assert_eq!(removed, 1);
        assert!(layer.get_predictions("u1", "s1", "T1", "h1").await.is_none());
        assert!(layer.get_predictions("u2", "s1", "T1", "h2").await.is_some());
    }

    #[tokio::test]
    async fn stats_counts_per_family() {
        let layer = CacheLayer::new(InMemoryKvCache::default(), CacheTtls::default());
        layer.put_predictions("u1", "s1", "T1", "h1", &[]).await;
        let stats = layer.stats().await;
        assert_eq!(stats.prediction_keys, 1);
        assert_eq!(stats.index_keys, 0);
    }
}
