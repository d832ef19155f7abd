//! Content fingerprints for reproducibility.
//!
//! - `dataset_hash`: BLAKE3 over the canonical JSON of a normalized batch.
//! - `feature_checksum`: BLAKE3 over the canonical JSON of a feature set.
//! - `DataFingerprint`: both hashes plus shape, attached to run records so
//!   two runs on the same data can be matched.

use crate::domain::{DatasetHash, FeatureChecksum, NormalizedBatch};
use crate::features::FeatureSet;
use serde::{Deserialize, Serialize};

/// Hash a normalized batch. Records are already time-sorted and field maps
/// are `BTreeMap`s, so the serialization is canonical.
pub fn dataset_hash(batch: &NormalizedBatch) -> Result<DatasetHash, serde_json::Error> {
    let bytes = serde_json::to_vec(batch)?;
    Ok(DatasetHash(blake3::hash(&bytes).to_hex().to_string()))
}

pub fn feature_checksum(set: &FeatureSet) -> Result<FeatureChecksum, serde_json::Error> {
    let bytes = set.to_canonical_json()?;
    Ok(FeatureChecksum(blake3::hash(&bytes).to_hex().to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFingerprint {
    pub dataset_hash: DatasetHash,
    pub feature_checksum: FeatureChecksum,
    pub feature_rows: usize,
    pub feature_columns: usize,
}

impl DataFingerprint {
    pub fn new(batch: &NormalizedBatch, set: &FeatureSet) -> Result<Self, serde_json::Error> {
        Ok(Self {
            dataset_hash: dataset_hash(batch)?,
            feature_checksum: feature_checksum(set)?,
            feature_rows: set.len(),
            feature_columns: set.n_features(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldValue, NormalizedRecord, Schema};
    use chrono::NaiveDate;

    fn batch(temp: f64) -> NormalizedBatch {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        NormalizedBatch {
            records: vec![NormalizedRecord {
                timestamp: ts,
                fields: [("temp".to_string(), FieldValue::Number(temp))].into(),
            }],
            schema: Schema::new(vec!["temp".into()]),
        }
    }

    #[test]
    fn dataset_hash_is_stable() {
        assert_eq!(dataset_hash(&batch(1.0)).unwrap(), dataset_hash(&batch(1.0)).unwrap());
        assert_eq!(dataset_hash(&batch(1.0)).unwrap().0.len(), 64);
    }

    #[test]
    fn dataset_hash_changes_with_content() {
        assert_ne!(dataset_hash(&batch(1.0)).unwrap(), dataset_hash(&batch(1.5)).unwrap());
    }
}
