//! Calendar features and their cyclical encodings.
//!
//! Plain calendar fields are integers taken from the row timestamp (UTC).
//! Cyclical features map a periodic field onto the unit circle with
//! `sin(2π·value/period)` and `cos(2π·value/period)` so the last hour of a
//! day sits next to the first.

use super::{FeatureDeriver, FeatureFrame};
use chrono::{Datelike, NaiveDateTime, Timelike};
use std::f64::consts::TAU;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarField {
    Hour,
    /// Monday = 0.
    DayOfWeek,
    DayOfMonth,
    Month,
    IsWeekend,
}

impl CalendarField {
    pub const ALL: [CalendarField; 5] = [
        CalendarField::Hour,
        CalendarField::DayOfWeek,
        CalendarField::DayOfMonth,
        CalendarField::Month,
        CalendarField::IsWeekend,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CalendarField::Hour => "hour",
            CalendarField::DayOfWeek => "day_of_week",
            CalendarField::DayOfMonth => "day_of_month",
            CalendarField::Month => "month",
            CalendarField::IsWeekend => "is_weekend",
        }
    }

    fn extract(self, ts: &NaiveDateTime) -> f64 {
        match self {
            CalendarField::Hour => ts.hour() as f64,
            CalendarField::DayOfWeek => ts.weekday().num_days_from_monday() as f64,
            CalendarField::DayOfMonth => ts.day() as f64,
            CalendarField::Month => ts.month() as f64,
            CalendarField::IsWeekend => {
                if ts.weekday().num_days_from_monday() >= 5 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Cycle length for fields with a cyclical encoding.
    pub fn period(self) -> Option<f64> {
        match self {
            CalendarField::Hour => Some(24.0),
            CalendarField::DayOfWeek => Some(7.0),
            CalendarField::Month => Some(12.0),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Calendar {
    field: CalendarField,
}

impl Calendar {
    pub fn new(field: CalendarField) -> Self {
        Self { field }
    }
}

impl FeatureDeriver for Calendar {
    fn name(&self) -> &str {
        self.field.label()
    }

    fn inputs(&self) -> Vec<&str> {
        Vec::new()
    }

    fn compute(&self, frame: &FeatureFrame) -> Vec<f64> {
        frame
            .timestamps()
            .iter()
            .map(|ts| self.field.extract(ts))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wave {
    Sin,
    Cos,
}

/// One half of a (sin, cos) pair for a periodic calendar field.
#[derive(Debug, Clone)]
pub struct Cyclical {
    field: CalendarField,
    period: f64,
    wave: Wave,
    name: String,
}

impl Cyclical {
    /// Returns `None` for fields without a natural period.
    pub fn new(field: CalendarField, wave: Wave) -> Option<Self> {
        let period = field.period()?;
        let suffix = match wave {
            Wave::Sin => "sin",
            Wave::Cos => "cos",
        };
        Some(Self {
            field,
            period,
            wave,
            name: format!("{}_{suffix}", field.label()),
        })
    }

    pub fn encode(&self, value: f64) -> f64 {
        let angle = TAU * value / self.period;
        match self.wave {
            Wave::Sin => angle.sin(),
            Wave::Cos => angle.cos(),
        }
    }
}

impl FeatureDeriver for Cyclical {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<&str> {
        Vec::new()
    }

    fn compute(&self, frame: &FeatureFrame) -> Vec<f64> {
        frame
            .timestamps()
            .iter()
            .map(|ts| self.encode(self.field.extract(ts)))
            .collect()
    }
}

/// 1.0 when the provider's part-of-day marker is `"d"`, 0.0 for any other
/// marker, NaN when unknown.
#[derive(Debug, Clone, Default)]
pub struct IsDay;

impl FeatureDeriver for IsDay {
    fn name(&self) -> &str {
        "is_day"
    }

    fn inputs(&self) -> Vec<&str> {
        vec!["pod"]
    }

    fn compute(&self, frame: &FeatureFrame) -> Vec<f64> {
        match frame.text("pod") {
            Some(pods) => pods
                .iter()
                .map(|p| match p.as_deref() {
                    Some("d") => 1.0,
                    Some(_) => 0.0,
                    None => f64::NAN,
                })
                .collect(),
            None => vec![f64::NAN; frame.len()],
        }
    }
}
