//! Core data model: feature keys, teaching structure, reference cohort,
//! queries, and predictions.

pub mod hash;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// String identifier of the form `<subject>_<time_point>`.
///
/// Equality and hashing are exact on the underlying string; a `FeatureKey`
/// carries no ordinal semantics of its own; chronological ordering comes
/// from the owning `TeachingStructure`'s time-point list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeatureKey(pub String);

impl FeatureKey {
    pub fn new(subject: &str, time_point: &str) -> Self {
        FeatureKey(format!("{subject}_{time_point}"))
    }
}

impl std::fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The numeric upper bound used in accuracy reporting.
///
/// The grading scales a teaching structure may report accuracy against.
/// `Scale10000` and `LetterGrade` supplement the base scale-10/scale-100/GPA
/// set to match institutions that grade on those systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleType {
    Scale10,
    Scale100,
    Scale10000,
    Gpa,
    LetterGrade,
}

impl ScaleType {
    /// Parse the structure's scale-type label. Unknown labels fall back to
    /// `Scale10`, matching the original system's permissive default.
    pub fn from_label(label: &str) -> Self {
        match label {
            "0-100" => ScaleType::Scale100,
            "0-10000" => ScaleType::Scale10000,
            "GPA" => ScaleType::Gpa,
            "A-F" => ScaleType::LetterGrade,
            _ => ScaleType::Scale10,
        }
    }

    /// Maximum value for this scale, used only for accuracy reporting —
    /// never derived from observed values.
    pub fn max(self) -> f64 {
        match self {
            ScaleType::Scale10 => 10.0,
            ScaleType::Scale100 => 100.0,
            ScaleType::Scale10000 => 10000.0,
            ScaleType::Gpa => 4.0,
            ScaleType::LetterGrade => 10.0,
        }
    }
}

/// Ordered time-point and subject labels, plus the scale type. The full
/// feature-key set is the Cartesian product subject × time-point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeachingStructure {
    pub id: String,
    pub time_points: Vec<String>,
    pub subjects: Vec<String>,
    pub scale_type: ScaleType,
}

impl TeachingStructure {
    /// All feature keys in canonical order: time-point major, subject minor
    /// within each time point (matches the fixed order `ClusterIndex` uses
    /// once fitted).
    pub fn feature_keys(&self) -> Vec<FeatureKey> {
        let mut keys = Vec::with_capacity(self.time_points.len() * self.subjects.len());
        for tp in &self.time_points {
            for subject in &self.subjects {
                keys.push(FeatureKey::new(subject, tp));
            }
        }
        keys
    }

    /// Index of a time-point label in the ordered list, or `None` if unknown.
    pub fn time_point_index(&self, time_point: &str) -> Option<usize> {
        self.time_points.iter().position(|tp| tp == time_point)
    }

    /// Feature keys whose time point has index `<= t_star`.
    pub fn input_keys(&self, t_star: usize) -> Vec<FeatureKey> {
        self.time_points[..=t_star]
            .iter()
            .flat_map(|tp| self.subjects.iter().map(move |s| FeatureKey::new(s, tp)))
            .collect()
    }

    /// Feature keys whose time point has index `> t_star`.
    pub fn future_keys(&self, t_star: usize) -> Vec<FeatureKey> {
        if t_star + 1 >= self.time_points.len() {
            return Vec::new();
        }
        self.time_points[t_star + 1..]
            .iter()
            .flat_map(|tp| self.subjects.iter().map(move |s| FeatureKey::new(s, tp)))
            .collect()
    }
}

/// One student in the reference cohort: a sparse mapping FeatureKey -> value.
/// All values are finite, non-negative, on the structure's scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSample {
    pub sample_id: String,
    pub scores: BTreeMap<FeatureKey, f64>,
}

impl ReferenceSample {
    pub fn get(&self, key: &FeatureKey) -> Option<f64> {
        self.scores.get(key).copied()
    }

    /// True iff every key in `keys` has a value in this sample.
    pub fn has_all(&self, keys: &[FeatureKey]) -> bool {
        keys.iter().all(|k| self.scores.contains_key(k))
    }

    /// Build the dense vector for `keys` in order, substituting 0.0 for any
    /// missing key. See design notes: this is the documented 0-fill
    /// tradeoff used for cluster assignment.
    pub fn to_vector(&self, keys: &[FeatureKey]) -> Vec<f64> {
        keys.iter().map(|k| self.get(k).unwrap_or(0.0)).collect()
    }
}

/// The ordered collection of `ReferenceSample`s for one structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReferenceDataset {
    pub samples: Vec<ReferenceSample>,
}

impl ReferenceDataset {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples that carry every key in `keys` — the population clustering
    /// and evaluation actually train on.
    pub fn filter_complete(&self, keys: &[FeatureKey]) -> Vec<&ReferenceSample> {
        self.samples.iter().filter(|s| s.has_all(keys)).collect()
    }
}

/// The partial score vector of the user being predicted for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    pub inputs: BTreeMap<FeatureKey, f64>,
}

impl Query {
    pub fn get(&self, key: &FeatureKey) -> Option<f64> {
        self.inputs.get(key).copied()
    }

    pub fn to_vector(&self, keys: &[FeatureKey]) -> Vec<f64> {
        keys.iter().map(|k| self.get(k).unwrap_or(0.0)).collect()
    }
}

/// Which regressor produced a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegressorName {
    Knn,
    KernelRegression,
    Lwlr,
}

impl RegressorName {
    pub fn as_str(self) -> &'static str {
        match self {
            RegressorName::Knn => "knn",
            RegressorName::KernelRegression => "kernel_regression",
            RegressorName::Lwlr => "lwlr",
        }
    }
}

/// Status tag for a written-back prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionStatus {
    Generated,
    Imputed,
}

/// One predicted value for one target key.
///
/// `confidence` is a supplemented field (not in the distilled spec): it
/// reflects how many candidates actually carried the target key relative to
/// the full candidate-set size, since a prediction averaged over few
/// candidates is less trustworthy than one averaged over thousands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub key: FeatureKey,
    pub value: f64,
    pub regressor: RegressorName,
    pub status: PredictionStatus,
    pub confidence: f64,
}

/// Round to 2 decimals, per spec's output contract for all three regressors.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Euclidean distance between two dense vectors of equal length.
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
