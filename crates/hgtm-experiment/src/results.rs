//! Results collection and output for migration experiments.
//!
//! Captures per run:
//! - The configuration and scenario statistics
//! - Execution cost, migration cost and survival rate
//! - Every migration record, failover and leaderless group

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hgtm_kernel::{
    AgentId, ExperimentResult, FailoverEvent, GroupId, LeaderScoring, MigrationConfig,
    MigrationRecord, ScenarioStats, SimulationOutcome,
};

use crate::generator::GeneratorConfig;

/// Results from a single run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Trial number (for repeated runs)
    pub trial: usize,
    pub config: MigrationConfig,
    /// Absent when the scenario was loaded from a file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator: Option<GeneratorConfig>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub stats: ScenarioStats,
    pub metrics: ExperimentResult,
    pub records: Vec<MigrationRecord>,
    pub failovers: Vec<FailoverEvent>,
    pub leaderless_groups: Vec<GroupId>,
    /// Faulty agents still holding tasks at the end of the run
    pub stalled_agents: Vec<AgentId>,
}

impl RunReport {
    pub fn from_outcome(
        trial: usize,
        config: MigrationConfig,
        generator: Option<GeneratorConfig>,
        started_at: DateTime<Utc>,
        outcome: SimulationOutcome,
    ) -> Self {
        let ended_at = Utc::now();
        let duration_ms = (ended_at - started_at).num_milliseconds().max(0) as u64;
        Self {
            run_id: Uuid::new_v4(),
            trial,
            config,
            generator,
            started_at,
            ended_at,
            duration_ms,
            stats: outcome.stats,
            metrics: outcome.result,
            records: outcome.records,
            failovers: outcome.failovers,
            leaderless_groups: outcome.leaderless_groups,
            stalled_agents: outcome.stalled_agents,
        }
    }

    /// Save the report to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let report = serde_json::from_str(&json)?;
        Ok(report)
    }
}

/// Aggregate results of repeated runs under several leader scorings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrialResults {
    /// All individual runs
    pub runs: Vec<RunReport>,
    /// Summary statistics keyed by leader scoring
    pub summary: BTreeMap<String, ScoringSummary>,
}

/// Summary statistics for one leader scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringSummary {
    pub scoring: LeaderScoring,
    pub trials: usize,
    pub mean_execution_cost: f64,
    /// Standard error of the mean execution cost
    pub execution_cost_se: f64,
    pub mean_migration_cost: f64,
    pub migration_cost_se: f64,
    pub mean_survival_rate: f64,
    pub survival_rate_se: f64,
    pub mean_migrations: f64,
    /// Runs that ended with at least one leaderless group
    pub leaderless_runs: usize,
}

impl TrialResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, report: RunReport) {
        self.runs.push(report);
    }

    /// Compute summary statistics.
    pub fn compute_summary(&mut self) {
        let mut by_scoring: BTreeMap<String, Vec<&RunReport>> = BTreeMap::new();
        for run in &self.runs {
            by_scoring
                .entry(scoring_key(run.config.leader_scoring))
                .or_default()
                .push(run);
        }

        self.summary = by_scoring
            .into_iter()
            .map(|(key, runs)| {
                let scoring = runs[0].config.leader_scoring;
                let (mean_execution_cost, execution_cost_se) =
                    mean_se(runs.iter().map(|r| r.metrics.execution_cost));
                let (mean_migration_cost, migration_cost_se) =
                    mean_se(runs.iter().map(|r| r.metrics.migration_cost));
                let (mean_survival_rate, survival_rate_se) =
                    mean_se(runs.iter().map(|r| r.metrics.survival_rate));
                let (mean_migrations, _) = mean_se(runs.iter().map(|r| r.records.len() as f64));
                let summary = ScoringSummary {
                    scoring,
                    trials: runs.len(),
                    mean_execution_cost,
                    execution_cost_se,
                    mean_migration_cost,
                    migration_cost_se,
                    mean_survival_rate,
                    survival_rate_se,
                    mean_migrations,
                    leaderless_runs: runs
                        .iter()
                        .filter(|r| !r.leaderless_groups.is_empty())
                        .count(),
                };
                (key, summary)
            })
            .collect();
    }

    /// Save results to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load results from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let results = serde_json::from_str(&json)?;
        Ok(results)
    }
}

pub fn scoring_key(scoring: LeaderScoring) -> String {
    match scoring {
        LeaderScoring::Additive => "additive".to_string(),
        LeaderScoring::Multiplicative => "multiplicative".to_string(),
    }
}

/// Mean and standard error (sample standard deviation over sqrt(n)).
fn mean_se(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt() / n.sqrt())
}

/// Generate a timestamped output path from the given path.
/// e.g., "report.json" -> "report-20260108-010530.json"
pub fn timestamped_path(path: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d-%H%M%S");
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("report");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("json");
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!("{}-{}.{}", stem, timestamp, ext))
}

/// Format a duration in milliseconds for display.
pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{:.1}m", ms as f64 / 60_000.0)
    }
}
