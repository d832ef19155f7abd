//! BDD tests for the data side of the pipeline
//!
//! These tests drive raw forecast payloads through:
//! - Schema normalization
//! - The quality gate
//! - The feature engine
//! - Chronological partitioning

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tempcast_core::data::{normalize, read_feature_table, LocalArtifactStore};
use tempcast_core::domain::{
    CloudsBlock, MainBlock, RawBatch, RawObservation, Reading, SysBlock, WeatherCondition,
    WindBlock,
};
use tempcast_core::features::DatasetProfile;
use tempcast_core::quality::{evaluate, QualityConfig};
use tempcast_core::{partition, FeatureConfig, FeatureEngine};

// ── Helpers ──────────────────────────────────────────────────────────

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 7, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn entry(ts: NaiveDateTime, i: usize) -> RawObservation {
    let temp = 30.0 + (i as f64 * 0.7).sin() * 5.0;
    RawObservation {
        dt: Some(ts.and_utc().timestamp()),
        dt_txt: Some(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
        main: Some(MainBlock {
            temp: Reading::Value(temp),
            feels_like: Reading::Value(temp + 1.5),
            temp_min: Reading::Value(temp - 0.5),
            temp_max: Reading::Value(temp + 0.5),
            pressure: Reading::Value(1005.0 + (i % 7) as f64),
            humidity: Reading::Value(40.0 + (i % 11) as f64),
            sea_level: Reading::Value(1005.0),
            grnd_level: Reading::Value(980.0),
        }),
        weather: Some(vec![WeatherCondition {
            id: Reading::Value(800.0),
            main: Reading::Value("Clear".into()),
            description: Reading::Value("clear sky".into()),
        }]),
        clouds: Some(CloudsBlock {
            all: Reading::Value((i * 7 % 100) as f64),
        }),
        wind: Some(WindBlock {
            speed: Reading::Value(2.0 + (i % 5) as f64 * 0.4),
            deg: Reading::Value((i * 30 % 360) as f64),
            gust: Reading::Value(4.0),
        }),
        visibility: Reading::Value(10000.0),
        pop: Reading::Value(0.0),
        sys: Some(SysBlock {
            pod: Reading::Value(if (6..18).contains(&(i * 3 % 24)) { "d" } else { "n" }.into()),
        }),
    }
}

fn forecast(n: usize, step_hours: i64) -> RawBatch {
    RawBatch::new(
        (0..n)
            .map(|i| entry(start() + Duration::hours(step_hours * i as i64), i))
            .collect(),
    )
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn bdd_scenario_humidity_gaps_fail_the_gate() {
    // GIVEN 10 hourly records where humidity is null in 2 of them (20%)
    let mut raw = forecast(10, 1);
    for obs in raw.observations.iter_mut().take(2) {
        obs.main.as_mut().unwrap().humidity = Reading::Null;
    }

    // WHEN the batch is normalized and evaluated with a 1% threshold
    let batch = normalize(&raw).unwrap();
    let report = evaluate(
        &batch,
        &QualityConfig::default().with_default_min_rows(5),
    );

    // THEN the gate fails naming the humidity rule
    assert!(!report.passed);
    assert_eq!(report.violated_rules(), vec!["null_ratio_exceeded:humidity"]);
    assert_eq!(report.field("humidity").unwrap().null_ratio, Some(0.2));
}

#[test]
fn bdd_scenario_fifty_records_lose_lookback_and_horizon_rows() {
    // GIVEN 50 three-hourly records and the default feature configuration
    // (lags 1..4, windows 3 and 6, horizon 2)
    let raw = forecast(50, 3);
    let batch = normalize(&raw).unwrap();
    let config = FeatureConfig::default();
    let engine = FeatureEngine::new(config).unwrap();

    // AND the gate passes
    let quality = QualityConfig::default().with_default_min_rows(engine.min_history());
    assert!(evaluate(&batch, &quality).passed);

    // WHEN features are built
    let set = engine.build(&batch).unwrap();

    // THEN the first 5 rows (longest window - 1) and the last 2 rows (horizon)
    // are dropped
    assert_eq!(set.len(), 43);
    assert_eq!(set.rows[0].timestamp, batch.records[5].timestamp);
    assert_eq!(set.rows[42].timestamp, batch.records[47].timestamp);
    assert!(set.is_fully_defined());

    // AND the target is the temperature two steps ahead
    let temps = batch.numeric_column("temp");
    assert_eq!(set.rows[0].target, temps[7]);
    assert_eq!(set.target_name, "target_temp_2step");

    // AND day/night is derived from the part-of-day marker
    assert!(set.feature_names.contains(&"is_day".to_string()));
}

#[test]
fn bdd_scenario_forty_five_rows_partition_chronologically() {
    // GIVEN a feature set of exactly 45 rows
    let raw = forecast(52, 3);
    let batch = normalize(&raw).unwrap();
    let set = FeatureEngine::new(FeatureConfig::default())
        .unwrap()
        .build(&batch)
        .unwrap();
    assert_eq!(set.len(), 45);

    // WHEN it is partitioned with a test fraction of 0.2
    let p = partition(&set, 0.2).unwrap();

    // THEN train has 36 rows, test has 9, and the boundary sits at row 36
    assert_eq!(p.train.len(), 36);
    assert_eq!(p.test.len(), 9);
    assert_eq!(p.test[0].timestamp, set.rows[36].timestamp);
    assert!(p.last_train_timestamp().unwrap() < p.first_test_timestamp().unwrap());
}

#[test]
fn bdd_scenario_missing_wind_block_is_unknown_field() {
    // GIVEN a payload without any wind readings
    let mut raw = forecast(20, 3);
    for obs in &mut raw.observations {
        obs.wind = None;
    }
    let batch = normalize(&raw).unwrap();

    // WHEN the default configuration (which lags wind speed) is applied
    let err = FeatureEngine::new(FeatureConfig::default())
        .unwrap()
        .build(&batch)
        .unwrap_err();

    // THEN the engine names the absent field instead of imputing it
    assert!(err.to_string().contains("wind_speed"));
}

#[test]
fn bdd_scenario_persisted_features_round_trip() {
    // GIVEN a built feature set and its profile
    let batch = normalize(&forecast(30, 3)).unwrap();
    let set = FeatureEngine::new(FeatureConfig::default())
        .unwrap()
        .build(&batch)
        .unwrap();
    let profile = DatasetProfile::from_feature_set(&set);

    // WHEN it is written to the local store and read back
    let dir = tempfile::tempdir().unwrap();
    let store = LocalArtifactStore::new(dir.path(), "weather_processed");
    let manifest = store
        .persist_features_at(&set, Some(&profile), start())
        .unwrap();
    let back = read_feature_table(&manifest.parquet).unwrap();

    // THEN the table is unchanged and the sidecar checksum matches
    assert_eq!(back, set);
    assert_eq!(
        manifest.table.checksum,
        tempcast_core::fingerprint::feature_checksum(&set).unwrap()
    );
    assert_eq!(profile.columns, set.n_features() + 1);
}
