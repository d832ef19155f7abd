//! Feature engine: assembles derivers from a [`FeatureConfig`], computes
//! every column, then keeps only fully defined rows.

use super::{
    Calendar, CalendarField, Cyclical, Difference, FeatureConfig, FeatureDeriver, FeatureError,
    FeatureFrame, FeatureSet, FeatureVector, IsDay, Lag, Passthrough, Product, Rolling,
    RollingStat, Target, Wave, WindChill,
};
use crate::domain::{NormalizedBatch, Schema};
use std::collections::HashSet;
use tracing::{debug, info};

pub struct FeatureEngine {
    config: FeatureConfig,
    derivers: Vec<Box<dyn FeatureDeriver>>,
    target: Target,
}

impl std::fmt::Debug for FeatureEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureEngine")
            .field("features", &self.feature_names())
            .field("target", &self.target.name())
            .finish()
    }
}

impl FeatureEngine {
    /// Validate the configuration and build the deriver list.
    ///
    /// `is_day` is only added later, when the batch schema carries `pod`.
    pub fn new(config: FeatureConfig) -> Result<Self, FeatureError> {
        config.validate()?;

        let mut derivers: Vec<Box<dyn FeatureDeriver>> = Vec::new();

        for field in &config.base_fields {
            derivers.push(Box::new(Passthrough::new(field)));
        }
        if config.calendar {
            for field in CalendarField::ALL {
                derivers.push(Box::new(Calendar::new(field)));
            }
        }
        if config.cyclical {
            for field in CalendarField::ALL {
                for wave in [Wave::Sin, Wave::Cos] {
                    if let Some(c) = Cyclical::new(field, wave) {
                        derivers.push(Box::new(c));
                    }
                }
            }
        }
        for field in &config.lag_fields {
            for &depth in &config.lag_depths {
                derivers.push(Box::new(Lag::new(field, depth)));
            }
        }
        for field in &config.context_lag_fields {
            derivers.push(Box::new(Lag::new(field, 1)));
        }
        for field in &config.rolling_fields {
            for &window in &config.rolling_windows {
                for stat in RollingStat::ALL {
                    derivers.push(Box::new(Rolling::new(field, window, stat)));
                }
            }
        }
        for field in &config.diff_fields {
            for &period in &config.diff_periods {
                derivers.push(Box::new(Difference::new(field, period)));
            }
        }
        for [a, b] in &config.interactions {
            derivers.push(Box::new(Product::new(a, b)));
        }
        if config.wind_chill {
            derivers.push(Box::new(WindChill));
        }

        let mut seen = HashSet::new();
        for d in &derivers {
            if !seen.insert(d.name().to_string()) {
                return Err(FeatureError::InvalidConfig(format!(
                    "duplicate feature name '{}'",
                    d.name()
                )));
            }
        }

        let target = Target::new(&config.target_field, config.horizon_steps);
        Ok(Self {
            config,
            derivers,
            target,
        })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Largest lookback over all derivers.
    pub fn lookback(&self) -> usize {
        self.derivers.iter().map(|d| d.lookback()).max().unwrap_or(0)
    }

    pub fn horizon(&self) -> usize {
        self.target.lookahead()
    }

    /// Fewest rows that can produce at least one feature row.
    pub fn min_history(&self) -> usize {
        self.lookback() + self.horizon() + 1
    }

    pub fn feature_names(&self) -> Vec<&str> {
        self.derivers.iter().map(|d| d.name()).collect()
    }

    pub fn target_name(&self) -> &str {
        self.target.name()
    }

    /// Derive the feature set for a quality-passed batch.
    ///
    /// Deterministic: the same batch and configuration always produce the
    /// same rows in the same order.
    pub fn build(&self, batch: &NormalizedBatch) -> Result<FeatureSet, FeatureError> {
        self.check_schema(&batch.schema)?;

        let frame = FeatureFrame::from_batch(batch);
        let is_day = IsDay;
        let mut derivers: Vec<&dyn FeatureDeriver> =
            self.derivers.iter().map(|d| d.as_ref()).collect();
        if self.config.calendar && frame.has_field("pod") {
            derivers.push(&is_day);
        }

        let columns: Vec<Vec<f64>> = derivers.iter().map(|d| d.compute(&frame)).collect();
        let targets = self.target.compute(&frame);

        let rows: Vec<FeatureVector> = frame
            .timestamps()
            .iter()
            .enumerate()
            .filter_map(|(i, &timestamp)| {
                let target = targets[i];
                if !target.is_finite() {
                    return None;
                }
                let values: Vec<f64> = columns.iter().map(|c| c[i]).collect();
                values.iter().all(|v| v.is_finite()).then_some(FeatureVector {
                    timestamp,
                    values,
                    target,
                })
            })
            .collect();

        let lookback = derivers.iter().map(|d| d.lookback()).max().unwrap_or(0);
        if rows.is_empty() {
            return Err(FeatureError::InsufficientHistory {
                available: frame.len(),
                lookback,
                horizon: self.horizon(),
            });
        }

        debug!(
            lookback,
            horizon = self.horizon(),
            dropped = frame.len() - rows.len(),
            "pruned undefined rows"
        );
        info!(
            rows = rows.len(),
            features = derivers.len(),
            target = self.target.name(),
            "feature set built"
        );

        Ok(FeatureSet {
            feature_names: derivers.iter().map(|d| d.name().to_string()).collect(),
            target_name: self.target.name().to_string(),
            rows,
        })
    }

    fn check_schema(&self, schema: &Schema) -> Result<(), FeatureError> {
        let inputs = self
            .derivers
            .iter()
            .flat_map(|d| d.inputs())
            .chain(self.target.inputs());
        for field in inputs {
            if !schema.contains(field) {
                return Err(FeatureError::UnknownField {
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldValue, NormalizedRecord};
    use chrono::{Duration, NaiveDate};
    use std::collections::BTreeMap;

    fn batch(temps: &[f64]) -> NormalizedBatch {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let records = temps
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                let mut fields = BTreeMap::new();
                let temp = if t.is_nan() {
                    FieldValue::Unknown
                } else {
                    FieldValue::Number(t)
                };
                fields.insert("temp".to_string(), temp);
                NormalizedRecord {
                    timestamp: start + Duration::hours(3 * i as i64),
                    fields,
                }
            })
            .collect();
        NormalizedBatch {
            records,
            schema: Schema::new(vec!["temp".into()]),
        }
    }

    fn temp_only() -> FeatureConfig {
        FeatureConfig {
            lag_depths: vec![1, 2],
            lag_fields: vec!["temp".into()],
            context_lag_fields: vec![],
            rolling_windows: vec![3],
            rolling_fields: vec!["temp".into()],
            diff_periods: vec![1],
            diff_fields: vec!["temp".into()],
            interactions: vec![],
            wind_chill: false,
            calendar: false,
            cyclical: false,
            base_fields: vec!["temp".into()],
            target_field: "temp".into(),
            horizon_steps: 1,
            test_fraction: 0.2,
        }
    }

    #[test]
    fn drops_leading_lookback_and_trailing_horizon() {
        let temps: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let engine = FeatureEngine::new(temp_only()).unwrap();
        assert_eq!(engine.lookback(), 2);
        let set = engine.build(&batch(&temps)).unwrap();
        // rows 2..=8 survive: 2 leading, 1 trailing dropped
        assert_eq!(set.len(), 7);
        assert_eq!(set.rows[0].target, 3.0);
        assert_eq!(set.rows.last().unwrap().target, 9.0);
        assert!(set.is_fully_defined());
    }

    #[test]
    fn feature_order_follows_configuration() {
        let engine = FeatureEngine::new(temp_only()).unwrap();
        assert_eq!(
            engine.feature_names(),
            vec![
                "temp",
                "temp_lag_1",
                "temp_lag_2",
                "temp_rolling_mean_3",
                "temp_rolling_std_3",
                "temp_rolling_min_3",
                "temp_rolling_max_3",
                "temp_diff_1",
            ]
        );
        assert_eq!(engine.target_name(), "target_temp_1step");
    }

    #[test]
    fn interior_unknown_removes_dependent_rows() {
        let mut temps: Vec<f64> = (0..12).map(|i| i as f64).collect();
        temps[6] = f64::NAN;
        let set = FeatureEngine::new(temp_only())
            .unwrap()
            .build(&batch(&temps))
            .unwrap();
        assert!(set.is_fully_defined());
        // row 6 itself, the rows whose lags/windows reach it (7, 8), and row 5
        // whose target is row 6 are gone
        let kept: Vec<f64> = set.column("temp").unwrap();
        assert_eq!(kept, vec![2.0, 3.0, 4.0, 9.0, 10.0]);
    }

    #[test]
    fn too_short_batch_is_insufficient_history() {
        let err = FeatureEngine::new(temp_only())
            .unwrap()
            .build(&batch(&[1.0, 2.0, 3.0]))
            .unwrap_err();
        assert_eq!(
            err,
            FeatureError::InsufficientHistory {
                available: 3,
                lookback: 2,
                horizon: 1
            }
        );
    }

    #[test]
    fn unknown_field_is_rejected() {
        let cfg = FeatureConfig {
            context_lag_fields: vec!["pressure".into()],
            ..temp_only()
        };
        let err = FeatureEngine::new(cfg)
            .unwrap()
            .build(&batch(&[1.0; 10]))
            .unwrap_err();
        assert_eq!(
            err,
            FeatureError::UnknownField {
                field: "pressure".into()
            }
        );
    }

    #[test]
    fn duplicate_feature_names_are_rejected() {
        let cfg = FeatureConfig {
            lag_depths: vec![1, 1],
            ..temp_only()
        };
        assert!(matches!(
            FeatureEngine::new(cfg),
            Err(FeatureError::InvalidConfig(_))
        ));
    }

    #[test]
    fn default_min_history() {
        let engine = FeatureEngine::new(FeatureConfig::default()).unwrap();
        // window 6 -> lookback 5, horizon 2
        assert_eq!(engine.lookback(), 5);
        assert_eq!(engine.min_history(), 8);
    }
}
