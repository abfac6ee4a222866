//! The cluster index's bincode schema round-trips through an actual file on
//! disk, independent of any `KvCache` backend.

use edutwin_predict::prelude::*;
use std::collections::BTreeMap;
use std::io::{Read, Write};

#[test]
fn cluster_index_round_trips_through_a_file() {
    let key_a = FeatureKey::new("A", "T1");
    let key_b = FeatureKey::new("B", "T1");
    let mut samples = Vec::new();
    for i in 0..50 {
        let mut scores = BTreeMap::new();
        scores.insert(key_a.clone(), (i % 11) as f64);
        scores.insert(key_b.clone(), (i % 7) as f64);
        samples.push(ReferenceSample {
            sample_id: format!("s{i}"),
            scores,
        });
    }
    let dataset = ReferenceDataset { samples };
    let index = ClusterIndex::fit(&dataset, &[key_a, key_b]).unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    let bytes = bincode::serialize(&index).unwrap();
    file.write_all(&bytes).unwrap();
    file.flush().unwrap();

    let mut read_back = Vec::new();
    std::fs::File::open(file.path())
        .unwrap()
        .read_to_end(&mut read_back)
        .unwrap();
    let loaded: ClusterIndex = bincode::deserialize(&read_back).unwrap();

    assert_eq!(loaded.cluster_count(), index.cluster_count());
    for id in 0..index.cluster_count() {
        assert_eq!(loaded.get_members(id).len(), index.get_members(id).len());
        assert_eq!(loaded.centroid(id), index.centroid(id));
    }
}
