//! Property tests for pipeline invariants.
//!
//! Uses proptest to verify:
//! 1. Gate verdict: a monitored field over the null threshold always fails
//! 2. Full definition: no feature row carries an undefined value
//! 3. Partition ordering: every test timestamp follows every train timestamp
//! 4. Idempotence: building features twice yields identical bytes
//! 5. Cyclical continuity: hour 23 sits one step from hour 0

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use std::collections::BTreeMap;
use tempcast_core::domain::{FieldValue, NormalizedBatch, NormalizedRecord, Schema};
use tempcast_core::features::{CalendarField, Cyclical, Wave};
use tempcast_core::quality::{evaluate, QualityConfig};
use tempcast_core::{partition, FeatureConfig, FeatureEngine};

const FIELDS: [&str; 4] = ["temp", "pressure", "humidity", "wind_speed"];

// ── Strategies (proptest) ────────────────────────────────────────────

/// A column of readings where about one in ten is unknown.
fn arb_column(len: usize) -> impl Strategy<Value = Vec<Option<f64>>> {
    prop::collection::vec(
        prop_oneof![9 => (-5.0..45.0_f64).prop_map(Some), 1 => Just(None)],
        len,
    )
}

fn arb_batch() -> impl Strategy<Value = NormalizedBatch> {
    (8usize..60).prop_flat_map(|n| {
        prop::collection::vec(arb_column(n), FIELDS.len()).prop_map(move |cols| {
            let start = NaiveDate::from_ymd_opt(2024, 2, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap();
            let records = (0..n)
                .map(|i| {
                    let fields: BTreeMap<String, FieldValue> = FIELDS
                        .iter()
                        .zip(&cols)
                        .map(|(name, col)| {
                            let v = col[i].map_or(FieldValue::Unknown, FieldValue::Number);
                            (name.to_string(), v)
                        })
                        .collect();
                    NormalizedRecord {
                        timestamp: start + Duration::hours(3 * i as i64),
                        fields,
                    }
                })
                .collect();
            NormalizedBatch {
                records,
                schema: Schema::new(FIELDS.iter().map(|s| s.to_string()).collect()),
            }
        })
    })
}

fn small_config() -> FeatureConfig {
    FeatureConfig {
        base_fields: FIELDS.iter().map(|s| s.to_string()).collect(),
        interactions: vec![["temp".into(), "pressure".into()]],
        ..Default::default()
    }
}

// ── 1. Gate verdict ──────────────────────────────────────────────────

proptest! {
    /// Any monitored field whose unknown ratio exceeds the threshold fails the gate.
    #[test]
    fn null_ratio_over_threshold_fails(batch in arb_batch(), threshold in 0.0..0.5_f64) {
        let config = QualityConfig {
            null_ratio_threshold: threshold,
            monitored_fields: FIELDS.iter().map(|s| s.to_string()).collect(),
            required_fields: vec![],
            min_rows: Some(1),
            value_ranges: BTreeMap::new(),
        };
        let report = evaluate(&batch, &config);
        let worst = FIELDS
            .iter()
            .map(|f| batch.unknown_count(f) as f64 / batch.len() as f64)
            .fold(0.0, f64::max);
        prop_assert_eq!(report.passed, worst <= threshold);
    }
}

// ── 2. Full definition ───────────────────────────────────────────────

proptest! {
    /// Whatever survives pruning is fully defined.
    #[test]
    fn feature_rows_are_fully_defined(batch in arb_batch()) {
        let engine = FeatureEngine::new(small_config()).unwrap();
        if let Ok(set) = engine.build(&batch) {
            prop_assert!(set.is_fully_defined());
            prop_assert!(set.len() <= batch.len() - engine.lookback() - engine.horizon());
        }
    }
}

// ── 3. Partition ordering ────────────────────────────────────────────

proptest! {
    /// max(train timestamps) < min(test timestamps) for every valid fraction.
    #[test]
    fn partition_respects_time_order(batch in arb_batch(), f in 0.05..0.95_f64) {
        let engine = FeatureEngine::new(small_config()).unwrap();
        if let Ok(set) = engine.build(&batch) {
            if let Ok(p) = partition(&set, f) {
                let max_train = p.train.iter().map(|r| r.timestamp).max().unwrap();
                let min_test = p.test.iter().map(|r| r.timestamp).min().unwrap();
                prop_assert!(max_train < min_test);
                prop_assert_eq!(p.train.len() + p.test.len(), set.len());
            }
        }
    }
}

// ── 4. Idempotence ───────────────────────────────────────────────────

proptest! {
    /// Two builds over the same input serialize to the same bytes.
    #[test]
    fn feature_engine_is_idempotent(batch in arb_batch()) {
        let engine = FeatureEngine::new(small_config()).unwrap();
        let a = engine.build(&batch).map(|s| s.to_canonical_json().unwrap());
        let b = engine.build(&batch).map(|s| s.to_canonical_json().unwrap());
        prop_assert_eq!(a, b);
    }
}

// ── 5. Cyclical continuity ───────────────────────────────────────────

#[test]
fn hour_wrap_is_no_larger_than_any_adjacent_step() {
    let sin = Cyclical::new(CalendarField::Hour, Wave::Sin).unwrap();
    let max_step = (0..23)
        .map(|h| (sin.encode((h + 1) as f64) - sin.encode(h as f64)).abs())
        .fold(0.0, f64::max);
    let wrap = (sin.encode(23.0) - sin.encode(0.0)).abs();
    assert!(wrap <= max_step + 1e-12, "wrap={wrap}, max_step={max_step}");
}
