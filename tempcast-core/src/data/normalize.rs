//! Schema normalizer: flattens nested forecast entries into uniform records.
//!
//! Each raw entry becomes one [`NormalizedRecord`] keyed by the columns of
//! [`FIELD_CATALOGUE`]. Absent or null readings become `FieldValue::Unknown`.
//! Output is sorted by timestamp; two entries resolving to the same instant
//! abort normalization.

use crate::data::provider::DT_TXT_FORMAT;
use crate::domain::{
    FieldValue, NormalizedBatch, NormalizedRecord, RawBatch, RawObservation, Reading, Schema,
};
use chrono::{DateTime, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::debug;

/// Flattened column names, in output order.
pub const FIELD_CATALOGUE: [&str; 18] = [
    "temp",
    "feels_like",
    "temp_min",
    "temp_max",
    "pressure",
    "humidity",
    "sea_level",
    "grnd_level",
    "weather_id",
    "weather_main",
    "weather_description",
    "clouds_all",
    "wind_speed",
    "wind_deg",
    "wind_gust",
    "visibility",
    "pop",
    "pod",
];

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("observation {index} has no timestamp (neither dt nor dt_txt)")]
    MissingTimestamp { index: usize },

    #[error("observation {index} has unparsable timestamp '{raw}'")]
    InvalidTimestamp { index: usize, raw: String },

    #[error("duplicate timestamp {timestamp} in batch")]
    DuplicateTimestamp { timestamp: NaiveDateTime },
}

/// Normalize a raw batch. Never mutates the input.
pub fn normalize(batch: &RawBatch) -> Result<NormalizedBatch, NormalizeError> {
    let mut records = Vec::with_capacity(batch.len());
    let mut present: BTreeSet<&'static str> = BTreeSet::new();

    for (index, obs) in batch.observations.iter().enumerate() {
        let timestamp = resolve_timestamp(index, obs)?;
        let mut fields = BTreeMap::new();
        for (name, reading) in flatten(obs) {
            if !reading.is_missing() {
                present.insert(name);
            }
            fields.insert(name.to_string(), reading.into_field_value());
        }
        records.push(NormalizedRecord { timestamp, fields });
    }

    records.sort_by_key(|r| r.timestamp);
    if let Some(pair) = records.windows(2).find(|w| w[0].timestamp == w[1].timestamp) {
        return Err(NormalizeError::DuplicateTimestamp {
            timestamp: pair[0].timestamp,
        });
    }

    let schema = Schema::new(
        FIELD_CATALOGUE
            .iter()
            .filter(|f| present.contains(*f))
            .map(|f| f.to_string())
            .collect(),
    );

    debug!(
        records = records.len(),
        fields = schema.len(),
        "normalized raw batch"
    );
    Ok(NormalizedBatch { records, schema })
}

fn resolve_timestamp(index: usize, obs: &RawObservation) -> Result<NaiveDateTime, NormalizeError> {
    if let Some(dt) = obs.dt {
        return DateTime::from_timestamp(dt, 0)
            .map(|d| d.naive_utc())
            .ok_or(NormalizeError::InvalidTimestamp {
                index,
                raw: dt.to_string(),
            });
    }
    match obs.dt_txt.as_deref() {
        Some(raw) => NaiveDateTime::parse_from_str(raw, DT_TXT_FORMAT).map_err(|_| {
            NormalizeError::InvalidTimestamp {
                index,
                raw: raw.to_string(),
            }
        }),
        None => Err(NormalizeError::MissingTimestamp { index }),
    }
}

// ── Flattening ──────────────────────────────────────────────────────

/// A reading of either kind, pending conversion to a `FieldValue`.
enum Cell {
    Number(Reading),
    Text(Reading<String>),
}

impl Cell {
    fn is_missing(&self) -> bool {
        match self {
            Cell::Number(r) => r.is_missing(),
            Cell::Text(r) => r.is_missing(),
        }
    }

    fn into_field_value(self) -> FieldValue {
        match self {
            Cell::Number(Reading::Value(v)) if v.is_finite() => FieldValue::Number(v),
            Cell::Text(Reading::Value(s)) => FieldValue::Text(s),
            _ => FieldValue::Unknown,
        }
    }
}

/// Pull `$field` out of an optional block, `Missing` if the block is absent.
macro_rules! nested {
    ($block:expr, $field:ident) => {
        $block
            .as_ref()
            .map(|b| b.$field.clone())
            .unwrap_or_default()
    };
}

fn flatten(obs: &RawObservation) -> [(&'static str, Cell); 18] {
    let weather = obs.weather.as_ref().and_then(|w| w.first());
    [
        ("temp", Cell::Number(nested!(obs.main, temp))),
        ("feels_like", Cell::Number(nested!(obs.main, feels_like))),
        ("temp_min", Cell::Number(nested!(obs.main, temp_min))),
        ("temp_max", Cell::Number(nested!(obs.main, temp_max))),
        ("pressure", Cell::Number(nested!(obs.main, pressure))),
        ("humidity", Cell::Number(nested!(obs.main, humidity))),
        ("sea_level", Cell::Number(nested!(obs.main, sea_level))),
        ("grnd_level", Cell::Number(nested!(obs.main, grnd_level))),
        ("weather_id", Cell::Number(nested!(weather, id))),
        ("weather_main", Cell::Text(nested!(weather, main))),
        ("weather_description", Cell::Text(nested!(weather, description))),
        ("clouds_all", Cell::Number(nested!(obs.clouds, all))),
        ("wind_speed", Cell::Number(nested!(obs.wind, speed))),
        ("wind_deg", Cell::Number(nested!(obs.wind, deg))),
        ("wind_gust", Cell::Number(nested!(obs.wind, gust))),
        ("visibility", Cell::Number(obs.visibility.clone())),
        ("pop", Cell::Number(obs.pop.clone())),
        ("pod", Cell::Text(nested!(obs.sys, pod))),
    ]
}
