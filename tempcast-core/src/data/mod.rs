//! Data ingestion, normalization, and artifact persistence

pub mod normalize;
pub mod provider;
pub mod store;

pub use normalize::{normalize, NormalizeError, FIELD_CATALOGUE};
pub use provider::{
    observation_time, FetchError, JsonFileSource, Location, ObservationSource, TimeWindow,
};
pub use store::{
    read_feature_table, sanitize, write_atomic, ArtifactError, ArtifactManifest, ArtifactSink, FeatureTableMeta,
    LocalArtifactStore, ModelArtifact,
};
