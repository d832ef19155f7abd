//! Tempcast CLI: run, check, and train commands.
//!
//! Commands:
//! - `run`: normalize, gate, build features, train, record, and report one payload
//! - `check`: normalize and gate a payload without training
//! - `train`: train from a persisted Parquet feature table
//!
//! Exit codes: 0 success, 1 usage/configuration/ingestion errors,
//! 2 quality gate failed, 3 training failed.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tempcast_core::data::{normalize, read_feature_table, JsonFileSource, LocalArtifactStore, ObservationSource};
use tempcast_core::quality::evaluate;
use tempcast_core::{FeatureEngine, QualityReport};
use tempcast_runner::{
    export_report, fetch_and_run, run_from_features, JsonlRecorder, PipelineConfig, PipelineError,
    PipelineReport, PipelineServices, TrainingMode,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tempcast",
    about = "Tempcast: quality-gated weather features and tracked temperature models"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline on a raw forecast payload.
    Run {
        /// Raw provider payload (JSON).
        #[arg(long)]
        input: PathBuf,

        #[command(flatten)]
        common: CommonArgs,

        /// Directory for processed feature tables and models.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Normalize a payload and evaluate the quality gate only.
    Check {
        /// Raw provider payload (JSON).
        #[arg(long)]
        input: PathBuf,

        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Train from a persisted feature table.
    Train {
        /// Parquet feature table written by an earlier `run`.
        #[arg(long)]
        features: PathBuf,

        #[command(flatten)]
        common: CommonArgs,

        /// Directory for persisted models.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct CommonArgs {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Train every configured candidate instead of the default one.
    #[arg(long, default_value_t = false)]
    multiple: bool,

    /// Experiment tracking root.
    #[arg(long)]
    tracking_dir: Option<PathBuf>,

    /// Experiment name.
    #[arg(long)]
    experiment: Option<String>,

    /// Directory for the JSON and Markdown run reports.
    #[arg(long, default_value = "reports")]
    report_dir: PathBuf,
}

fn main() {
    init_tracing();
    // clap's own usage exit code (2) would collide with a failed gate.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let code = match dispatch(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn dispatch(command: Commands) -> Result<i32> {
    match command {
        Commands::Run {
            input,
            common,
            output_dir,
        } => run_cmd(&input, &common, output_dir),
        Commands::Check { input, config } => check_cmd(&input, config.as_deref()),
        Commands::Train {
            features,
            common,
            output_dir,
        } => train_cmd(&features, &common, output_dir),
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::from_file(p).with_context(|| format!("loading config {}", p.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn apply_overrides(config: &mut PipelineConfig, common: &CommonArgs, output_dir: Option<PathBuf>) {
    if common.multiple {
        config.training.mode = TrainingMode::Multiple;
    }
    if let Some(dir) = &common.tracking_dir {
        config.tracking.root = dir.clone();
    }
    if let Some(name) = &common.experiment {
        config.tracking.experiment = name.clone();
    }
    if let Some(dir) = output_dir {
        config.output.dir = dir;
    }
}

fn run_cmd(input: &Path, common: &CommonArgs, output_dir: Option<PathBuf>) -> Result<i32> {
    let mut config = load_config(common.config.as_deref())?;
    apply_overrides(&mut config, common, output_dir);

    info!(input = %input.display(), mode = ?config.training.mode, "run requested");
    let source = JsonFileSource::new(input);
    let store = LocalArtifactStore::new(&config.output.dir, &config.output.prefix);
    let recorder = JsonlRecorder::new(&config.tracking.root);
    let services = PipelineServices {
        recorder: Some(&recorder),
        sink: Some(&store),
    };

    match fetch_and_run(&source, &config, services) {
        Ok(report) => finish(&report, &common.report_dir),
        Err(e) => Ok(report_failure(&e)),
    }
}

fn check_cmd(input: &Path, config_path: Option<&Path>) -> Result<i32> {
    let config = load_config(config_path)?;
    config.validate()?;

    let source = JsonFileSource::new(input);
    let raw = source.fetch_batch(&config.source.location, &config.source.window)?;
    let batch = normalize(&raw)?;
    let engine = FeatureEngine::new(config.features.clone())?;
    let gate = config.quality.clone().with_default_min_rows(engine.min_history());

    let report = evaluate(&batch, &gate);
    print_quality(&report);
    Ok(if report.passed { 0 } else { 2 })
}

fn train_cmd(features: &Path, common: &CommonArgs, output_dir: Option<PathBuf>) -> Result<i32> {
    let mut config = load_config(common.config.as_deref())?;
    apply_overrides(&mut config, common, output_dir);
    // The table is already on disk.
    config.output.persist_features = false;

    info!(features = %features.display(), mode = ?config.training.mode, "retrain requested");
    let set = read_feature_table(features).with_context(|| format!("reading {}", features.display()))?;
    let store = LocalArtifactStore::new(&config.output.dir, &config.output.prefix);
    let recorder = JsonlRecorder::new(&config.tracking.root);
    let services = PipelineServices {
        recorder: Some(&recorder),
        sink: Some(&store),
    };

    match run_from_features(&set, &config, services) {
        Ok(report) => finish(&report, &common.report_dir),
        Err(e) => Ok(report_failure(&e)),
    }
}

fn finish(report: &PipelineReport, report_dir: &Path) -> Result<i32> {
    print_summary(report);
    // Training already succeeded; a report that cannot be written is a warning.
    match export_report(report_dir, report) {
        Ok(paths) => println!("Report saved to: {}", paths.markdown.display()),
        Err(e) => {
            warn!(dir = %report_dir.display(), error = %e, "report export failed");
            println!("warning: report not written: {e:#}");
        }
    }
    Ok(0)
}

fn report_failure(err: &PipelineError) -> i32 {
    if let Some(quality) = err.quality_report() {
        print_quality(quality);
    }
    eprintln!("error: {err} (stage {:?})", err.terminal_stage());
    err.exit_code()
}

fn print_quality(report: &QualityReport) {
    println!("{report}");
    for v in &report.violations {
        println!("  violation: {v}");
    }
    for w in &report.warnings {
        println!("  warning: {w}");
    }
}

fn print_summary(report: &PipelineReport) {
    println!();
    println!("=== Run Summary ===");
    println!("Experiment:  {}", report.experiment);
    println!("Features:    {}", report.feature_names.len());
    println!(
        "Rows:        {} train / {} test",
        report.partition.train_rows, report.partition.test_rows
    );
    println!();
    println!("{:<4} {:<24} {:<18} {:>10} {:>10} {:>8}", "Rank", "Candidate", "Algorithm", "RMSE", "MAE", "R²");
    println!("{}", "-".repeat(78));
    for r in &report.training.ranking {
        println!(
            "{:<4} {:<24} {:<18} {:>10.4} {:>10.4} {:>8.4}",
            r.rank, r.name, r.algorithm, r.test_rmse, r.test_mae, r.test_r2
        );
    }
    for f in &report.training.failures {
        println!("FAILED {:<24} {}", f.name, f.error);
    }
    for w in &report.warnings {
        println!("warning: {w}");
    }
    if let Some(manifest) = &report.feature_artifacts {
        println!("Features saved to: {}", manifest.parquet.display());
    }
    println!();
}
