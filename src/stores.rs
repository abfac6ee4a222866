//! The four external collaborators the engine reads/writes through, plus the
//! KV cache. The engine performs no direct file or network I/O of its own —
//! every boundary crossing goes through one of these traits rather than
//! inlined SQL or HTTP calls.

use crate::config::RegressorConfig;
use crate::error::Result;
use crate::model::{FeatureKey, ReferenceDataset, TeachingStructure};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Read-only access to `TeachingStructure` configuration.
#[async_trait]
pub trait StructureStore: Send + Sync {
    async fn get_structure(&self, structure_id: &str) -> Result<TeachingStructure>;
}

/// Read-only iteration over the reference cohort, plus the content hash that
/// identifies its current state.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn load_reference(&self, structure_id: &str) -> Result<ReferenceDataset>;

    /// Content fingerprint of the cohort; see `model::hash::dataset_hash`.
    /// A store backed by a real database computes this from the same
    /// ordered `(sample_id, score_data)` pairs `load_reference` would
    /// return, typically without materializing the whole dataset twice.
    async fn dataset_hash(&self, structure_id: &str) -> Result<String>;
}

/// One user score cell: the student's own recorded value (if any) plus the
/// most recent prediction written into it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserScoreRecord {
    pub actual_value: Option<f64>,
    pub predicted_score: Option<f64>,
    pub predicted_source: Option<String>,
    pub predicted_status: Option<String>,
}

/// Read/write access to a user's score rows.
#[async_trait]
pub trait UserScoreStore: Send + Sync {
    async fn load_scores(
        &self,
        user_id: &str,
        structure_id: &str,
    ) -> Result<BTreeMap<FeatureKey, UserScoreRecord>>;

    /// Create an empty record for every key in `keys` that the user doesn't
    /// already have a row for, so write-back always has a target row.
    async fn ensure_records(&self, user_id: &str, structure_id: &str, keys: &[FeatureKey]) -> Result<()>;

    /// Write a predicted value into the user's row for `key`, tagging its
    /// source (regressor name or `"knn_imputer"`) and status.
    async fn upsert_prediction(
        &self,
        user_id: &str,
        structure_id: &str,
        key: &FeatureKey,
        value: f64,
        source: &str,
        status: &str,
    ) -> Result<()>;
}

/// The current active regressor + parameters, with its version counter.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn regressor_config(&self) -> Result<RegressorConfig>;
}

/// The shared external KV store backing all three caches. Every operation is
/// infallible from the caller's perspective: an unreachable backend behaves
/// as an always-miss, no-op cache, never an error.
#[async_trait]
pub trait KvCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn setex(&self, key: &str, ttl_secs: u64, value: Vec<u8>);
    async fn scan_iter(&self, pattern: &str) -> Vec<String>;
    async fn delete(&self, key: &str);
}

/// In-memory test doubles for the four stores and the cache. Not behind
/// `#[cfg(test)]` so integration tests (which compile this crate as an
/// external dependency) can reach them too.
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryStructureStore {
        pub structures: Mutex<BTreeMap<String, TeachingStructure>>,
    }

    impl InMemoryStructureStore {
        pub fn with(structure: TeachingStructure) -> Self {
            let mut structures = BTreeMap::new();
            structures.insert(structure.id.clone(), structure);
            InMemoryStructureStore {
                structures: Mutex::new(structures),
            }
        }
    }

    #[async_trait]
    impl StructureStore for InMemoryStructureStore {
        async fn get_structure(&self, structure_id: &str) -> Result<TeachingStructure> {
            self.structures
                .lock()
                .unwrap()
                .get(structure_id)
                .cloned()
                .ok_or_else(|| crate::error::PredictError::UnknownStructure(structure_id.to_string()))
        }
    }

    #[derive(Default)]
    pub struct InMemoryReferenceStore {
        pub datasets: Mutex<BTreeMap<String, ReferenceDataset>>,
    }

    impl InMemoryReferenceStore {
        pub fn with(structure_id: &str, dataset: ReferenceDataset) -> Self {
            let mut datasets = BTreeMap::new();
            datasets.insert(structure_id.to_string(), dataset);
            InMemoryReferenceStore {
                datasets: Mutex::new(datasets),
            }
        }
    }

    #[async_trait]
    impl ReferenceStore for InMemoryReferenceStore {
        async fn load_reference(&self, structure_id: &str) -> Result<ReferenceDataset> {
            Ok(self
                .datasets
                .lock()
                .unwrap()
                .get(structure_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn dataset_hash(&self, structure_id: &str) -> Result<String> {
            let datasets = self.datasets.lock().unwrap();
            let dataset = datasets.get(structure_id).cloned().unwrap_or_default();
            Ok(crate::model::hash::dataset_hash(&dataset))
        }
    }

    #[derive(Default)]
    pub struct InMemoryUserScoreStore {
        pub rows: Mutex<BTreeMap<(String, String), BTreeMap<FeatureKey, UserScoreRecord>>>,
    }

    #[async_trait]
    impl UserScoreStore for InMemoryUserScoreStore {
        async fn load_scores(
            &self,
            user_id: &str,
            structure_id: &str,
        ) -> Result<BTreeMap<FeatureKey, UserScoreRecord>> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .get(&(user_id.to_string(), structure_id.to_string()))
                .cloned()
                .unwrap_or_default())
        }

        async fn ensure_records(&self, user_id: &str, structure_id: &str, keys: &[FeatureKey]) -> Result<()> {
            let mut rows = self.rows.lock().unwrap();
            let entry = rows
                .entry((user_id.to_string(), structure_id.to_string()))
                .or_default();
            for key in keys {
                entry.entry(key.clone()).or_default();
            }
            Ok(())
        }

        async fn upsert_prediction(
            &self,
            user_id: &str,
            structure_id: &str,
            key: &FeatureKey,
            value: f64,
            source: &str,
            status: &str,
        ) -> Result<()> {
            let mut rows = self.rows.lock().unwrap();
            let entry = rows
                .entry((user_id.to_string(), structure_id.to_string()))
                .or_default();
            let record = entry.entry(key.clone()).or_default();
            record.predicted_score = Some(value);
            record.predicted_source = Some(source.to_string());
            record.predicted_status = Some(status.to_string());
            Ok(())
        }
    }

    pub struct InMemoryConfigStore {
        pub config: Mutex<RegressorConfig>,
    }

    impl Default for InMemoryConfigStore {
        fn default() -> Self {
            InMemoryConfigStore {
                config: Mutex::new(RegressorConfig::default()),
            }
        }
    }

    #[async_trait]
    impl ConfigStore for InMemoryConfigStore {
        async fn regressor_config(&self) -> Result<RegressorConfig> {
            Ok(self.config.lock().unwrap().clone())
        }
    }

    #[derive(Default)]
    pub struct InMemoryKvCache {
        pub entries: Mutex<BTreeMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl KvCache for InMemoryKvCache {
        async fn get(&self, key: &str) -> Option<Vec<u8>> {
            self.entries.lock().unwrap().get(key).cloned()
        }

        async fn setex(&self, key: &str, _ttl_secs: u64, value: Vec<u8>) {
            self.entries.lock().unwrap().insert(key.to_string(), value);
        }

        async fn scan_iter(&self, pattern: &str) -> Vec<String> {
            let prefix = pattern.trim_end_matches('*');
            self.entries
                .lock()
                .unwrap()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect()
        }

        async fn delete(&self, key: &str) {
            self.entries.lock().unwrap().remove(key);
        }
    }

    /// A `KvCache` that always misses and no-ops, simulating an unreachable
    /// backend for the "cache unavailable" error-taxonomy path.
    #[derive(Default)]
    pub struct UnreachableKvCache;

    #[async_trait]
    impl KvCache for UnreachableKvCache {
        async fn get(&self, _key: &str) -> Option<Vec<u8>> {
            None
        }

        async fn setex(&self, _key: &str, _ttl_secs: u64, _value: Vec<u8>) {}

        async fn scan_iter(&self, _pattern: &str) -> Vec<String> {
            Vec::new()
        }

        async fn delete(&self, _key: &str) {}
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::model::ReferenceSample;

    #[tokio::test]
    async fn in_memory_structure_store_round_trips() {
        let structure = TeachingStructure {
            id: "s1".into(),
            time_points: vec!["T1".into(), "T2".into()],
            subjects: vec!["A".into()],
            scale_type: crate::model::ScaleType::Scale10,
        };
        let store = InMemoryStructureStore::with(structure.clone());
        let loaded = store.get_structure("s1").await.unwrap();
        assert_eq!(loaded.id, structure.id);
        assert!(store.get_structure("missing").await.is_err());
    }

    #[tokio::test]
    async fn in_memory_user_score_store_upserts() {
        let store = InMemoryUserScoreStore::default();
        let key = FeatureKey::new("A", "T2");
        store.ensure_records("u1", "s1", &[key.clone()]).await.unwrap();
        store
            .upsert_prediction("u1", "s1", &key, 8.5, "knn", "active")
            .await
            .unwrap();
        let scores = store.load_scores("u1", "s1").await.unwrap();
        assert_eq!(scores[&key].predicted_score, Some(8.5));
        assert_eq!(scores[&key].predicted_source.as_deref(), Some("knn"));
    }

    #[tokio::test]
    async fn unreachable_kv_cache_always_misses() {
        let cache = UnreachableKvCache;
        cache.setex("k", 10, vec![1, 2, 3]).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn reference_store_hash_is_stable() {
        let dataset = ReferenceDataset {
            samples: vec![ReferenceSample {
                sample_id: "s1".into(),
                scores: Default::default(),
            }],
        };
        let store = InMemoryReferenceStore::with("s1", dataset);
        let h1 = store.dataset_hash("s1").await.unwrap();
        let h2 = store.dataset_hash("s1").await.unwrap();
        assert_eq!(h1, h2);
    }
}
