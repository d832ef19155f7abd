//! Local artifact store for feature tables and fitted models.
//!
//! Layout under the store root:
//! - `{prefix}_{YYYYmmdd_HHMMSS}.parquet`: column-oriented feature table
//! - `{prefix}_{YYYYmmdd_HHMMSS}.csv`: row-oriented mirror
//! - `{prefix}_{YYYYmmdd_HHMMSS}.meta.json`: creation time, shape, checksum
//! - `{prefix}_{YYYYmmdd_HHMMSS}.summary.json`: dataset profile, if given
//! - `models/{name}_model_{YYYYmmdd_HHMMSS}.json` plus `..._features.json`
//!
//! Names are never reused: a collision gets a numeric suffix. Every file is
//! written to `.tmp` and renamed into place.

use crate::domain::FeatureChecksum;
use crate::features::{DatasetProfile, FeatureSet, FeatureVector};
use crate::fingerprint::feature_checksum;
use chrono::{DateTime, NaiveDateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const TIMESTAMP_COLUMN: &str = "timestamp";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact I/O error: {0}")]
    Io(String),

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("csv error: {0}")]
    Csv(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Metadata sidecar for a persisted feature table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTableMeta {
    pub created_at: NaiveDateTime,
    pub rows: usize,
    pub columns: usize,
    pub feature_names: Vec<String>,
    pub target_name: String,
    pub checksum: FeatureChecksum,
}

/// Where a feature table landed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub parquet: PathBuf,
    pub csv: PathBuf,
    pub meta: PathBuf,
    pub summary: Option<PathBuf>,
    pub table: FeatureTableMeta,
}

/// Where a fitted model landed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model: PathBuf,
    pub features: PathBuf,
}

/// Persistence capability for pipeline outputs.
pub trait ArtifactSink: Send + Sync {
    fn persist_features(
        &self,
        set: &FeatureSet,
        profile: Option<&DatasetProfile>,
    ) -> Result<ArtifactManifest, ArtifactError>;

    /// Store a serialized model alongside the feature names it was fit on.
    fn persist_model(
        &self,
        name: &str,
        model_json: &[u8],
        feature_names: &[String],
    ) -> Result<ModelArtifact, ArtifactError>;
}

/// Filesystem-backed artifact store.
pub struct LocalArtifactStore {
    root: PathBuf,
    prefix: String,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist a feature table with an explicit creation time.
    pub fn persist_features_at(
        &self,
        set: &FeatureSet,
        profile: Option<&DatasetProfile>,
        created_at: NaiveDateTime,
    ) -> Result<ArtifactManifest, ArtifactError> {
        if set.is_empty() {
            return Err(ArtifactError::Validation("no feature rows to persist".into()));
        }
        fs::create_dir_all(&self.root)
            .map_err(|e| ArtifactError::Io(format!("failed to create dir: {e}")))?;

        let base = format!("{}_{}", self.prefix, created_at.format(STAMP_FORMAT));
        let stem = unique_stem(&self.root, &base, &["parquet", "csv", "meta.json"]);
        let parquet = self.root.join(format!("{stem}.parquet"));
        let csv_path = self.root.join(format!("{stem}.csv"));
        let meta_path = self.root.join(format!("{stem}.meta.json"));

        let mut df = feature_set_to_dataframe(set)?;
        write_atomic_with(&parquet, |tmp| write_parquet(&mut df, tmp))?;
        let csv_bytes = feature_set_to_csv(set)?;
        write_atomic_with(&csv_path, |tmp| write_bytes(tmp, &csv_bytes))?;

        let checksum = feature_checksum(set)
            .map_err(|e| ArtifactError::Serialization(format!("checksum: {e}")))?;
        let table = FeatureTableMeta {
            created_at,
            rows: set.len(),
            columns: set.n_features() + 2,
            feature_names: set.feature_names.clone(),
            target_name: set.target_name.clone(),
            checksum,
        };
        let meta_json = serde_json::to_vec_pretty(&table)
            .map_err(|e| ArtifactError::Serialization(format!("meta: {e}")))?;
        write_atomic_with(&meta_path, |tmp| write_bytes(tmp, &meta_json))?;

        let summary = match profile {
            Some(p) => {
                let path = self.root.join(format!("{stem}.summary.json"));
                let json = serde_json::to_vec_pretty(p)
                    .map_err(|e| ArtifactError::Serialization(format!("summary: {e}")))?;
                write_atomic_with(&path, |tmp| write_bytes(tmp, &json))?;
                Some(path)
            }
            None => None,
        };

        info!(path = %parquet.display(), rows = table.rows, "feature table persisted");
        Ok(ArtifactManifest {
            parquet,
            csv: csv_path,
            meta: meta_path,
            summary,
            table,
        })
    }

    /// Persist a model with an explicit creation time.
    pub fn persist_model_at(
        &self,
        name: &str,
        model_json: &[u8],
        feature_names: &[String],
        created_at: NaiveDateTime,
    ) -> Result<ModelArtifact, ArtifactError> {
        let dir = self.root.join("models");
        fs::create_dir_all(&dir)
            .map_err(|e| ArtifactError::Io(format!("failed to create dir: {e}")))?;

        let base = format!(
            "{}_model_{}",
            sanitize(name),
            created_at.format(STAMP_FORMAT)
        );
        let stem = unique_stem(&dir, &base, &["json"]);
        let model = dir.join(format!("{stem}.json"));
        let features = dir.join(format!("{stem}_features.json"));

        write_atomic_with(&model, |tmp| write_bytes(tmp, model_json))?;
        let names = serde_json::to_vec_pretty(feature_names)
            .map_err(|e| ArtifactError::Serialization(format!("feature names: {e}")))?;
        write_atomic_with(&features, |tmp| write_bytes(tmp, &names))?;

        info!(path = %model.display(), "model persisted");
        Ok(ModelArtifact { model, features })
    }
}

impl ArtifactSink for LocalArtifactStore {
    fn persist_features(
        &self,
        set: &FeatureSet,
        profile: Option<&DatasetProfile>,
    ) -> Result<ArtifactManifest, ArtifactError> {
        self.persist_features_at(set, profile, Utc::now().naive_utc())
    }

    fn persist_model(
        &self,
        name: &str,
        model_json: &[u8],
        feature_names: &[String],
    ) -> Result<ModelArtifact, ArtifactError> {
        self.persist_model_at(name, model_json, feature_names, Utc::now().naive_utc())
    }
}

/// Load a persisted feature table back into a [`FeatureSet`].
///
/// Column roles come from the `.meta.json` sidecar when present; otherwise
/// the single `target_*` column is the target and every other non-timestamp
/// column is a feature.
pub fn read_feature_table(path: &Path) -> Result<FeatureSet, ArtifactError> {
    let file = fs::File::open(path).map_err(|e| ArtifactError::Parquet(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| ArtifactError::Parquet(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(ArtifactError::Validation("empty feature table".into()));
    }

    let (feature_names, target_name) = match read_meta(&path.with_extension("meta.json")) {
        Some(meta) => (meta.feature_names, meta.target_name),
        None => infer_roles(&df)?,
    };

    let map_err = |e: PolarsError| ArtifactError::Parquet(format!("column read: {e}"));

    let ts_col = df
        .column(TIMESTAMP_COLUMN)
        .map_err(|_| ArtifactError::Validation(format!("missing column '{TIMESTAMP_COLUMN}'")))?
        .cast(&DataType::Int64)
        .map_err(map_err)?;
    let ts_ca = ts_col.i64().map_err(map_err)?;

    let mut feature_cols = Vec::with_capacity(feature_names.len());
    for name in &feature_names {
        let col = df
            .column(name)
            .map_err(|_| ArtifactError::Validation(format!("missing column '{name}'")))?
            .cast(&DataType::Float64)
            .map_err(map_err)?;
        feature_cols.push(col);
    }
    let target_col = df
        .column(&target_name)
        .map_err(|_| ArtifactError::Validation(format!("missing column '{target_name}'")))?
        .cast(&DataType::Float64)
        .map_err(map_err)?;

    let feature_cas = feature_cols
        .iter()
        .map(|c| c.f64().map_err(map_err))
        .collect::<Result<Vec<_>, _>>()?;
    let target_ca = target_col.f64().map_err(map_err)?;

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let ms = ts_ca
            .get(i)
            .ok_or_else(|| ArtifactError::Validation(format!("null timestamp at row {i}")))?;
        let timestamp = DateTime::from_timestamp_millis(ms)
            .map(|d| d.naive_utc())
            .ok_or_else(|| ArtifactError::Validation(format!("timestamp out of range at row {i}")))?;
        let values = feature_cas
            .iter()
            .map(|ca| ca.get(i).unwrap_or(f64::NAN))
            .collect();
        rows.push(FeatureVector {
            timestamp,
            values,
            target: target_ca.get(i).unwrap_or(f64::NAN),
        });
    }

    let set = FeatureSet {
        feature_names,
        target_name,
        rows,
    };
    if !set.is_fully_defined() {
        return Err(ArtifactError::Validation(
            "feature table contains undefined values".into(),
        ));
    }
    Ok(set)
}

fn read_meta(path: &Path) -> Option<FeatureTableMeta> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

fn infer_roles(df: &DataFrame) -> Result<(Vec<String>, String), ArtifactError> {
    let names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|n| n.to_string())
        .filter(|n| n != TIMESTAMP_COLUMN)
        .collect();
    let targets: Vec<&String> = names.iter().filter(|n| n.starts_with("target_")).collect();
    let target = match targets.as_slice() {
        [only] => (*only).clone(),
        _ => {
            return Err(ArtifactError::Validation(format!(
                "expected exactly one target_* column, found {}",
                targets.len()
            )))
        }
    };
    let features = names.into_iter().filter(|n| *n != target).collect();
    Ok((features, target))
}

// ── File helpers ────────────────────────────────────────────────────

/// First of `base`, `base_1`, `base_2`, ... with no existing file for any
/// of the given extensions.
fn unique_stem(dir: &Path, base: &str, extensions: &[&str]) -> String {
    let taken = |stem: &str| {
        extensions
            .iter()
            .any(|ext| dir.join(format!("{stem}.{ext}")).exists())
    };
    if !taken(base) {
        return base.to_string();
    }
    (1..)
        .map(|i| format!("{base}_{i}"))
        .find(|s| !taken(s))
        .unwrap_or_else(|| base.to_string())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(".tmp");
    PathBuf::from(s)
}

/// Write through `f` into a temp file, then rename onto `path`.
fn write_atomic_with(
    path: &Path,
    f: impl FnOnce(&Path) -> Result<(), ArtifactError>,
) -> Result<(), ArtifactError> {
    let tmp = tmp_path(path);
    if let Err(e) = f(&tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        ArtifactError::Io(format!("atomic rename failed: {e}"))
    })
}

/// Write `bytes` to `path` through a `.tmp` sibling and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    write_atomic_with(path, |tmp| write_bytes(tmp, bytes))
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    fs::write(path, bytes).map_err(|e| ArtifactError::Io(format!("write {}: {e}", path.display())))
}

/// Replace anything outside `[A-Za-z0-9_.-]` so a name is safe as a path segment.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ── Table encoders ──────────────────────────────────────────────────

fn feature_set_to_dataframe(set: &FeatureSet) -> Result<DataFrame, ArtifactError> {
    let millis: Vec<i64> = set
        .rows
        .iter()
        .map(|r| r.timestamp.and_utc().timestamp_millis())
        .collect();

    let mut columns = Vec::with_capacity(set.n_features() + 2);
    columns.push(
        Column::new(TIMESTAMP_COLUMN.into(), millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(|e| ArtifactError::Parquet(format!("timestamp cast: {e}")))?,
    );
    for (i, name) in set.feature_names.iter().enumerate() {
        let values: Vec<f64> = set.rows.iter().map(|r| r.values[i]).collect();
        columns.push(Column::new(name.as_str().into(), values));
    }
    columns.push(Column::new(set.target_name.as_str().into(), set.targets()));

    DataFrame::new(columns).map_err(|e| ArtifactError::Parquet(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), ArtifactError> {
    let file =
        fs::File::create(path).map_err(|e| ArtifactError::Parquet(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| ArtifactError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

fn feature_set_to_csv(set: &FeatureSet) -> Result<Vec<u8>, ArtifactError> {
    let csv_err = |e: csv::Error| ArtifactError::Csv(e.to_string());
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec![TIMESTAMP_COLUMN.to_string()];
    header.extend(set.feature_names.iter().cloned());
    header.push(set.target_name.clone());
    wtr.write_record(&header).map_err(csv_err)?;

    for row in &set.rows {
        let mut record = vec![row.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()];
        record.extend(row.values.iter().map(|v| v.to_string()));
        record.push(row.target.to_string());
        wtr.write_record(&record).map_err(csv_err)?;
    }

    wtr.into_inner()
        .map_err(|e| ArtifactError::Csv(format!("failed to flush CSV writer: {e}")))
}
