//! Observation source trait and structured fetch errors.
//!
//! The `ObservationSource` trait abstracts over where a raw forecast payload
//! comes from (a live provider client, a saved JSON payload, a test fixture)
//! so the pipeline never depends on a network stack.

use crate::domain::{RawBatch, RawObservation};
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Format of the provider's `dt_txt` field.
pub const DT_TXT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Named geographic location the forecast is requested for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            name: "Lahore".to_string(),
            lat: 31.5497,
            lon: 74.3436,
        }
    }
}

/// Half-open time window `[start, end)`. Unbounded on a side when `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDateTime>,
}

impl TimeWindow {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts < e)
    }
}

/// Structured error types for observation fetches.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("failed to read payload {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("invalid time window: start {start} is not before end {end}")]
    InvalidWindow {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

/// Trait for observation sources.
///
/// Implementations return one bounded batch per call. The pipeline treats the
/// returned batch as immutable.
pub trait ObservationSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch the raw observations for `location` within `window`.
    fn fetch_batch(&self, location: &Location, window: &TimeWindow) -> Result<RawBatch, FetchError>;
}

/// Best-effort timestamp of a raw entry: `dt` first, then `dt_txt`.
pub fn observation_time(obs: &RawObservation) -> Option<NaiveDateTime> {
    if let Some(dt) = obs.dt {
        return DateTime::from_timestamp(dt, 0).map(|d| d.naive_utc());
    }
    obs.dt_txt
        .as_deref()
        .and_then(|s| NaiveDateTime::parse_from_str(s, DT_TXT_FORMAT).ok())
}

/// Reads a saved provider payload from disk.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ObservationSource for JsonFileSource {
    fn name(&self) -> &str {
        "json-file"
    }

    fn fetch_batch(&self, location: &Location, window: &TimeWindow) -> Result<RawBatch, FetchError> {
        if let (Some(start), Some(end)) = (window.start, window.end) {
            if start >= end {
                return Err(FetchError::InvalidWindow { start, end });
            }
        }

        let content = fs::read_to_string(&self.path).map_err(|e| FetchError::Io {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        let mut batch: RawBatch = serde_json::from_str(&content)
            .map_err(|e| FetchError::ResponseFormatChanged(format!("{}: {e}", self.path.display())))?;

        // Entries without a resolvable timestamp are kept so the normalizer
        // can report them.
        let before = batch.observations.len();
        batch
            .observations
            .retain(|obs| observation_time(obs).map_or(true, |ts| window.contains(ts)));

        debug!(
            source = self.name(),
            location = %location.name,
            kept = batch.observations.len(),
            dropped = before - batch.observations.len(),
            "loaded raw payload"
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn window_is_half_open() {
        let w = TimeWindow {
            start: Some(at(1, 0)),
            end: Some(at(2, 0)),
        };
        assert!(w.contains(at(1, 0)));
        assert!(w.contains(at(1, 21)));
        assert!(!w.contains(at(2, 0)));
        assert!(TimeWindow::unbounded().contains(at(9, 9)));
    }

    #[test]
    fn observation_time_prefers_unix_seconds() {
        let obs = RawObservation {
            dt: Some(1_704_067_200), // 2024-01-01 00:00:00
            dt_txt: Some("1999-01-01 00:00:00".into()),
            ..Default::default()
        };
        assert_eq!(observation_time(&obs), Some(at(1, 0)));

        let obs = RawObservation {
            dt_txt: Some("2024-01-01 03:00:00".into()),
            ..Default::default()
        };
        assert_eq!(observation_time(&obs), Some(at(1, 3)));
    }

    #[test]
    fn file_source_filters_to_window() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"list": [
                {{"dt_txt": "2024-01-01 00:00:00"}},
                {{"dt_txt": "2024-01-01 03:00:00"}},
                {{"dt_txt": "2024-01-02 00:00:00"}}
            ]}}"#
        )
        .unwrap();

        let source = JsonFileSource::new(file.path());
        let window = TimeWindow {
            start: Some(at(1, 0)),
            end: Some(at(2, 0)),
        };
        let batch = source.fetch_batch(&Location::default(), &window).unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn file_source_reports_missing_file() {
        let source = JsonFileSource::new("/nonexistent/tempcast/payload.json");
        let err = source
            .fetch_batch(&Location::default(), &TimeWindow::unbounded())
            .unwrap_err();
        assert!(matches!(err, FetchError::Io { .. }));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let source = JsonFileSource::new("unused.json");
        let window = TimeWindow {
            start: Some(at(2, 0)),
            end: Some(at(1, 0)),
        };
        let err = source.fetch_batch(&Location::default(), &window).unwrap_err();
        assert!(matches!(err, FetchError::InvalidWindow { .. }));
    }
}
