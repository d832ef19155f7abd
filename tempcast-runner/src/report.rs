//! Run reports: JSON for machines, Markdown for people.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::pipeline::PipelineReport;
use crate::ranking::render_table;

#[derive(Debug, Clone, PartialEq)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

/// Write `run_report_<stamp>.json` and `.md` into `dir`, never overwriting.
pub fn export_report(dir: impl AsRef<Path>, report: &PipelineReport) -> Result<ReportPaths> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).with_context(|| format!("creating report dir {}", dir.display()))?;

    let base = format!("run_report_{}", Utc::now().format("%Y%m%d_%H%M%S"));
    let stem = (0..)
        .map(|k| if k == 0 { base.clone() } else { format!("{base}_{k}") })
        .find(|s| !dir.join(format!("{s}.json")).exists() && !dir.join(format!("{s}.md")).exists())
        .unwrap_or(base);

    let json_path = dir.join(format!("{stem}.json"));
    let md_path = dir.join(format!("{stem}.md"));

    let json = serde_json::to_vec_pretty(report).context("serializing run report")?;
    std::fs::write(&json_path, json).with_context(|| format!("writing {}", json_path.display()))?;
    std::fs::write(&md_path, render_markdown(report))
        .with_context(|| format!("writing {}", md_path.display()))?;

    Ok(ReportPaths {
        json: json_path,
        markdown: md_path,
    })
}

pub fn render_markdown(report: &PipelineReport) -> String {
    let mut md = format!(
        "# Tempcast Run Report\n\n\
Experiment: `{}`\n\n\
Config hash: `{}`\n\n\
## Data\n\
- Features: {}\n\
- Target: `{}`\n\
- Train rows: {}\n\
- Test rows: {}\n",
        report.experiment,
        &report.config_hash[..report.config_hash.len().min(16)],
        report.feature_names.len(),
        report.target_name,
        report.partition.train_rows,
        report.partition.test_rows,
    );

    if let (Some(last), Some(first)) = (
        report.partition.last_train_timestamp,
        report.partition.first_test_timestamp,
    ) {
        md.push_str(&format!("- Split: train ends {last}, test starts {first}\n"));
    }
    if let Some(fp) = &report.fingerprint {
        md.push_str(&format!("- Dataset hash: `{}`\n", fp.dataset_hash.short()));
    }
    if let Some(q) = &report.quality {
        md.push_str(&format!("- {q}\n"));
        for w in &q.warnings {
            md.push_str(&format!(
                "  - `{}`: {} values outside [{}, {}]\n",
                w.field, w.out_of_range, w.min, w.max
            ));
        }
    }

    md.push_str("\n## Ranking\n\n");
    md.push_str(&render_table(&report.training.ranking));

    if let Some(best) = report.training.best() {
        md.push_str(&format!(
            "\nBest model: **{}** (test RMSE {:.4}, test R² {:.4})\n",
            best.name, best.metrics.test_rmse, best.metrics.test_r2
        ));
        if let Some(importance) = &best.feature_importance {
            md.push_str("\n### Top Features\n\n| Feature | Importance |\n|---|---:|\n");
            for fi in importance.iter().take(10) {
                md.push_str(&format!("| {} | {:.4} |\n", fi.feature, fi.importance));
            }
        }
    }

    if !report.training.failures.is_empty() {
        md.push_str("\n## Failed Candidates\n\n");
        for f in &report.training.failures {
            md.push_str(&format!("- {} ({}): {}\n", f.name, f.algorithm, f.error));
        }
    }

    if !report.warnings.is_empty() {
        md.push_str("\n## Warnings\n\n");
        for w in &report.warnings {
            md.push_str(&format!("- {w}\n"));
        }
    }

    md.push_str("\n## Stages\n\n");
    let stages: Vec<String> = report.stages.iter().map(|t| format!("{:?}", t.stage)).collect();
    md.push_str(&stages.join(" → "));
    md.push('\n');
    md
}
