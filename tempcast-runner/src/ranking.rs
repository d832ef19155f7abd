//! Ranking of successful runs by test RMSE (lower is better).
//!
//! Runs with a non-finite test RMSE are left out. The sort is stable, so
//! ties keep candidate order.

use serde::{Deserialize, Serialize};

use crate::trainer::ExperimentRun;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRun {
    /// 1-based position.
    pub rank: usize,
    pub name: String,
    pub algorithm: String,
    pub test_rmse: f64,
    pub test_mae: f64,
    pub test_r2: f64,
    pub run_id: Option<String>,
}

pub fn rank_runs(runs: &[ExperimentRun]) -> Vec<RankedRun> {
    let mut ranked: Vec<&ExperimentRun> = runs
        .iter()
        .filter(|r| r.metrics.test_rmse.is_finite())
        .collect();
    ranked.sort_by(|a, b| a.metrics.test_rmse.total_cmp(&b.metrics.test_rmse));

    ranked
        .into_iter()
        .enumerate()
        .map(|(i, r)| RankedRun {
            rank: i + 1,
            name: r.name.clone(),
            algorithm: r.algorithm.clone(),
            test_rmse: r.metrics.test_rmse,
            test_mae: r.metrics.test_mae,
            test_r2: r.metrics.test_r2,
            run_id: r.run_id.clone(),
        })
        .collect()
}

/// Markdown table of the ranking.
pub fn render_table(ranking: &[RankedRun]) -> String {
    let mut out = String::from("| Rank | Run | Algorithm | Test RMSE | Test MAE | Test R² |\n");
    out.push_str("|---:|---|---|---:|---:|---:|\n");
    for r in ranking {
        out.push_str(&format!(
            "| {} | {} | {} | {:.4} | {:.4} | {:.4} |\n",
            r.rank, r.name, r.algorithm, r.test_rmse, r.test_mae, r.test_r2
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::test_support::run_with_rmse;

    #[test]
    fn lower_rmse_ranks_first() {
        let runs = vec![run_with_rmse("a", 2.0), run_with_rmse("b", 1.0), run_with_rmse("c", 3.0)];
        let ranked = rank_runs(&runs);
        let names: Vec<&str> = ranked.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(ranked[0].rank, 1);
    }

    #[test]
    fn ties_keep_candidate_order() {
        let runs = vec![run_with_rmse("first", 1.0), run_with_rmse("second", 1.0)];
        let ranked = rank_runs(&runs);
        assert_eq!(ranked[0].name, "first");
    }

    #[test]
    fn non_finite_rmse_is_excluded() {
        let runs = vec![run_with_rmse("nan", f64::NAN), run_with_rmse("ok", 1.0)];
        let ranked = rank_runs(&runs);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].name, "ok");
    }

    #[test]
    fn table_has_one_line_per_run() {
        let ranked = rank_runs(&[run_with_rmse("a", 1.0), run_with_rmse("b", 2.0)]);
        let table = render_table(&ranked);
        assert_eq!(table.lines().count(), 4);
        assert!(table.contains("| 1 | a | ridge | 1.0000 |"));
    }
}
