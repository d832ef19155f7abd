//! Tempcast Core: observation schema, quality gate, feature engine, partitioner.
//!
//! This crate holds everything up to the training boundary:
//! - Domain types (raw provider payloads, normalized records, identifiers)
//! - Observation source trait and a file-backed source
//! - Schema normalizer
//! - Quality gate with accumulated rule violations
//! - Trait-based feature derivers and the feature engine
//! - Chronological partitioner
//! - Local artifact store (Parquet + CSV mirror + metadata sidecar)

pub mod data;
pub mod domain;
pub mod features;
pub mod fingerprint;
pub mod partition;
pub mod quality;

pub use features::{FeatureConfig, FeatureEngine, FeatureError, FeatureSet, FeatureVector};
pub use partition::{partition, Partition, PartitionError};
pub use quality::{QualityConfig, QualityReport};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: pipeline data types can cross thread boundaries.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::RawBatch>();
        require_sync::<domain::RawBatch>();
        require_send::<domain::NormalizedBatch>();
        require_sync::<domain::NormalizedBatch>();
        require_send::<QualityReport>();
        require_sync::<QualityReport>();
        require_send::<FeatureSet>();
        require_sync::<FeatureSet>();
        require_send::<FeatureEngine>();
        require_sync::<FeatureEngine>();
        require_send::<Partition>();
        require_sync::<Partition>();
        require_send::<data::LocalArtifactStore>();
        require_sync::<data::LocalArtifactStore>();
    }
}
