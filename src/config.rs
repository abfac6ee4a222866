//! Engine configuration: cache TTLs, selector target size, and the current
//! regressor choice + parameters threaded as an explicit versioned value
//! object, never a global singleton.

use crate::regressors::RegressorParams;
use serde::{Deserialize, Serialize};

/// The "current active regressor + parameters" configuration. `version`
/// bumps on every change and is folded into the prediction/evaluation cache
/// keys so a parameter change naturally bypasses stale entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegressorConfig {
    pub name: crate::model::RegressorName,
    pub params: RegressorParams,
    pub version: u64,
}

impl Default for RegressorConfig {
    fn default() -> Self {
        RegressorConfig {
            name: crate::model::RegressorName::Knn,
            params: RegressorParams::default(),
            version: 0,
        }
    }
}

impl RegressorConfig {
    /// Produce the next version, keeping the name/params the caller passes.
    pub fn bump(&self, name: crate::model::RegressorName, params: RegressorParams) -> Self {
        RegressorConfig {
            name,
            params,
            version: self.version + 1,
        }
    }
}

/// Cache TTLs in seconds for the three content-addressed caches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CacheTtls {
    pub index_secs: u64,
    pub prediction_secs: u64,
    pub evaluation_secs: u64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        CacheTtls {
            index_secs: 24 * 3600,
            prediction_secs: 3600,
            evaluation_secs: 2 * 3600,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    pub cache_ttls: CacheTtls,
    pub selector_target: usize,
    pub clustering_threshold: usize,
    pub regressor: RegressorConfig,
    pub redis_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            cache_ttls: CacheTtls::default(),
            selector_target: crate::selector::DEFAULT_TARGET,
            clustering_threshold: crate::selector::DEFAULT_TARGET,
            regressor: RegressorConfig::default(),
            redis_url: None,
        }
    }
}

impl EngineConfig {
    /// Load from environment (`EDUTWIN_*` prefix) layered over defaults —
    /// env vars parsed with graceful fallback to the default on missing or
    /// unparsable values, never a hard error.
    pub fn load() -> Self {
        dotenvy::dotenv().ok();
        let mut config = EngineConfig::default();

        if let Ok(secs) = std::env::var("EDUTWIN_INDEX_CACHE_TTL_SECS") {
            if let Ok(v) = secs.parse() {
                config.cache_ttls.index_secs = v;
            }
        }
        if let Ok(secs) = std::env::var("EDUTWIN_PREDICTION_CACHE_TTL_SECS") {
            if let Ok(v) = secs.parse() {
                config.cache_ttls.prediction_secs = v;
            }
        }
        if let Ok(secs) = std::env::var("EDUTWIN_EVALUATION_CACHE_TTL_SECS") {
            if let Ok(v) = secs.parse() {
                config.cache_ttls.evaluation_secs = v;
            }
        }
        if let Ok(target) = std::env::var("EDUTWIN_SELECTOR_TARGET") {
            if let Ok(v) = target.parse() {
                config.selector_target = v;
                config.clustering_threshold = v;
            }
        }
        config.redis_url = std::env::var("EDUTWIN_REDIS_URL").ok();

        config
    }
}
