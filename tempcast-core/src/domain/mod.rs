//! Domain types: raw provider payloads, normalized records, identifiers.

pub mod ids;
pub mod observation;
pub mod record;

pub use ids::{DatasetHash, FeatureChecksum, RunId};
pub use observation::{
    CityInfo, CloudsBlock, Coord, MainBlock, RawBatch, RawObservation, Reading, SysBlock,
    WeatherCondition, WindBlock,
};
pub use record::{FieldValue, NormalizedBatch, NormalizedRecord, Schema};
