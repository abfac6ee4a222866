//! EduTwin's lazy-learning student score prediction engine.
//!
//! Given a cohort of reference students and a partial score vector for a
//! target student, estimates missing and future scores via weighted KNN,
//! Nadaraya-Watson kernel regression, or locally weighted linear regression
//! over a clustering-accelerated candidate set. See `DESIGN.md` for the
//! module-by-module grounding.

pub mod cache;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod imputer;
pub mod index;
pub mod model;
pub mod orchestrator;
pub mod regressors;
pub mod selector;
pub mod stores;

pub mod prelude {
    pub use crate::cache::{CacheLayer, CacheStats};
    pub use crate::config::{CacheTtls, EngineConfig, RegressorConfig};
    pub use crate::error::{PredictError, Result};
    pub use crate::evaluation::{EvaluationHarness, EvaluationResult, RegressorMetrics, RegressorResult};
    pub use crate::index::ClusterIndex;
    pub use crate::model::{
        FeatureKey, Prediction, PredictionStatus, Query, ReferenceDataset, ReferenceSample, RegressorName, ScaleType,
        TeachingStructure,
    };
    pub use crate::orchestrator::PredictionEngine;
    pub use crate::regressors::RegressorParams;
    pub use crate::stores::{ConfigStore, KvCache, ReferenceStore, StructureStore, UserScoreRecord, UserScoreStore};
}
