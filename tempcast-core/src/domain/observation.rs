//! Raw provider payload types.
//!
//! A forecast payload carries a `list` of 3-hourly entries with nested
//! blocks (`main`, `weather`, `clouds`, `wind`, `sys`). Every scalar is a
//! tri-state [`Reading`] so the normalizer can tell an absent key apart from
//! an explicit JSON `null`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A scalar as it arrived from the provider.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Reading<T = f64> {
    /// Key was not present in the payload.
    #[default]
    Missing,
    /// Key was present with a JSON `null`.
    Null,
    Value(T),
}

impl<T> Reading<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Reading::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Reading::Missing)
    }
}

impl<T: Clone> Reading<T> {
    pub fn cloned_value(&self) -> Option<T> {
        self.value().cloned()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Reading<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Reading::Value(v),
            None => Reading::Null,
        })
    }
}

impl<T: Serialize> Serialize for Reading<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Reading::Value(v) => serializer.serialize_some(v),
            _ => serializer.serialize_none(),
        }
    }
}

/// The `main` block: thermodynamic readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MainBlock {
    #[serde(default, skip_serializing_if = "Reading::is_missing")]
    pub temp: Reading,
    #[serde(default, skip_serializing_if = "Reading::is_missing")]
    pub feels_like: Reading,
    #[serde(default, skip_serializing_if = "Reading::is_missing")]
    pub temp_min: Reading,
    #[serde(default, skip_serializing_if = "Reading::is_missing")]
    pub temp_max: Reading,
    #[serde(default, skip_serializing_if = "Reading::is_missing")]
    pub pressure: Reading,
    #[serde(default, skip_serializing_if = "Reading::is_missing")]
    pub humidity: Reading,
    #[serde(default, skip_serializing_if = "Reading::is_missing")]
    pub sea_level: Reading,
    #[serde(default, skip_serializing_if = "Reading::is_missing")]
    pub grnd_level: Reading,
}

/// One entry of the `weather` array. Only the first entry is used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherCondition {
    #[serde(default, skip_serializing_if = "Reading::is_missing")]
    pub id: Reading,
    #[serde(default, skip_serializing_if = "Reading::is_missing")]
    pub main: Reading<String>,
    #[serde(default, skip_serializing_if = "Reading::is_missing")]
    pub description: Reading<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudsBlock {
    #[serde(default, skip_serializing_if = "Reading::is_missing")]
    pub all: Reading,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindBlock {
    #[serde(default, skip_serializing_if = "Reading::is_missing")]
    pub speed: Reading,
    #[serde(default, skip_serializing_if = "Reading::is_missing")]
    pub deg: Reading,
    #[serde(default, skip_serializing_if = "Reading::is_missing")]
    pub gust: Reading,
}

/// `sys.pod` is the part of day: `"d"` or `"n"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SysBlock {
    #[serde(default, skip_serializing_if = "Reading::is_missing")]
    pub pod: Reading<String>,
}

/// A single timestamped forecast entry, immutable once fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    /// Unix seconds (UTC).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dt: Option<i64>,
    /// `"%Y-%m-%d %H:%M:%S"` rendering of the same instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dt_txt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<MainBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<Vec<WeatherCondition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clouds: Option<CloudsBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind: Option<WindBlock>,
    #[serde(default, skip_serializing_if = "Reading::is_missing")]
    pub visibility: Reading,
    /// Probability of precipitation.
    #[serde(default, skip_serializing_if = "Reading::is_missing")]
    pub pop: Reading,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sys: Option<SysBlock>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

/// The payload's top-level `city` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CityInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub coord: Option<Coord>,
    /// UTC offset in seconds.
    #[serde(default)]
    pub timezone: Option<i64>,
}

/// One provider payload: the unit of work for a single pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBatch {
    #[serde(rename = "list", default)]
    pub observations: Vec<RawObservation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<CityInfo>,
}

impl RawBatch {
    pub fn new(observations: Vec<RawObservation>) -> Self {
        Self {
            observations,
            city: None,
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}
