//! Content hashing for cache keys and the reference-dataset fingerprint.
//!
//! A stable canonical JSON serialization (sorted keys) hashed with MD5.
//! This is a deliberately weak hash — collisions are treated as cache hits,
//! an accepted risk for this domain — so this function must never be reused
//! outside cache-key derivation.

use serde::Serialize;
use serde_json::Value;

/// Recursively sort all object keys in a `serde_json::Value` so that
/// structurally-equal values always serialize to the same bytes regardless
/// of field insertion order.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> = Default::default();
            for (k, v) in map {
                sorted.insert(k, canonicalize(v));
            }
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// MD5 hex digest of `data`'s canonical JSON encoding.
pub fn content_hash<T: Serialize>(data: &T) -> String {
    let value = serde_json::to_value(data).expect("content_hash: value must serialize");
    let canonical = canonicalize(value);
    let bytes = serde_json::to_vec(&canonical).expect("content_hash: canonical value must serialize");
    format!("{:x}", md5::compute(bytes))
}

/// The reference dataset's content fingerprint: computed from the ordered
/// sequence of `(sample_id, score_data)` pairs.
pub fn dataset_hash(dataset: &crate::model::ReferenceDataset) -> String {
    #[derive(Serialize)]
    struct Row<'a> {
        sample_id: &'a str,
        score_data: &'a std::collections::BTreeMap<crate::model::FeatureKey, f64>,
    }
    let rows: Vec<Row> = dataset
        .samples
        .iter()
        .map(|s| Row {
            sample_id: &s.sample_id,
            score_data: &s.scores,
        })
        .collect();
    content_hash(&rows)
}
