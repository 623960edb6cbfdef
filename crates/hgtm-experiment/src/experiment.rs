//! Experiment runner for migration experiments.
//!
//! Orchestrates the experiment lifecycle:
//! 1. Generate (or accept) a scenario
//! 2. Run the kernel pipeline on it
//! 3. Collect metrics into a report

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use hgtm_kernel::{KernelError, LeaderScoring, MigrationConfig, Scenario, Simulation};

use crate::generator::{GeneratorConfig, ScenarioGenerator};
use crate::results::{scoring_key, RunReport, TrialResults};

/// Configuration for the experiment runner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentRunnerConfig {
    pub migration: MigrationConfig,
    pub generator: GeneratorConfig,
}

impl ExperimentRunnerConfig {
    /// Load a runner configuration from a JSON file; missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.migration.validate()?;

        let g = &self.generator;
        if g.groups == 0 || g.agents_per_group == 0 {
            bail!("generator needs at least one group with one agent");
        }
        if !(0.0..=1.0).contains(&g.chord_probability) {
            bail!(
                "chord_probability must lie in [0, 1], got {}",
                g.chord_probability
            );
        }
        for (name, (lo, hi)) in [
            ("capacity_range", g.capacity_range),
            ("task_size_range", g.task_size_range),
            ("weight_range", g.weight_range),
        ] {
            if !(lo.is_finite() && hi.is_finite() && lo > 0.0 && lo <= hi) {
                bail!("{name} must be a positive range, got ({lo}, {hi})");
            }
        }
        Ok(())
    }
}

/// The experiment runner.
pub struct ExperimentRunner {
    config: ExperimentRunnerConfig,
}

impl ExperimentRunner {
    /// Create a new experiment runner.
    pub fn new(config: ExperimentRunnerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ExperimentRunnerConfig {
        &self.config
    }

    /// Generate the scenario for a seed.
    pub fn generate(&self, seed: u64) -> Scenario {
        ScenarioGenerator::new(self.config.generator.clone(), seed).generate()
    }

    /// Run one trial on a freshly generated scenario. The seed drives both the
    /// generator and the kernel.
    pub fn run(&self, trial: usize, seed: u64) -> Result<RunReport> {
        let config = MigrationConfig {
            seed,
            ..self.config.migration.clone()
        };
        let scenario = self.generate(seed);
        let mut report = self.execute(trial, config, scenario)?;
        report.generator = Some(self.config.generator.clone());
        Ok(report)
    }

    /// Run one trial on a caller-supplied scenario with the kernel seeded by `seed`.
    pub fn run_scenario(&self, trial: usize, seed: u64, scenario: Scenario) -> Result<RunReport> {
        let config = MigrationConfig {
            seed,
            ..self.config.migration.clone()
        };
        self.execute(trial, config, scenario)
    }

    /// Repeat the run for every scoring and seed, then summarize by scoring.
    pub fn run_trials(
        &self,
        trials: usize,
        base_seed: u64,
        scorings: &[LeaderScoring],
    ) -> Result<TrialResults> {
        let mut results = TrialResults::new();
        for &scoring in scorings {
            let runner = ExperimentRunner {
                config: ExperimentRunnerConfig {
                    migration: MigrationConfig {
                        leader_scoring: scoring,
                        ..self.config.migration.clone()
                    },
                    generator: self.config.generator.clone(),
                },
            };
            for trial in 0..trials {
                let seed = base_seed.wrapping_add(trial as u64);
                info!(scoring = %scoring_key(scoring), trial, seed, "Running trial");
                results.add(runner.run(trial, seed)?);
            }
        }
        results.compute_summary();
        Ok(results)
    }

    fn execute(
        &self,
        trial: usize,
        config: MigrationConfig,
        scenario: Scenario,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        debug!(
            agents = scenario.agents.len(),
            tasks = scenario.tasks.len(),
            edges = scenario.edges.len(),
            "Scenario ready"
        );

        let mut simulation =
            Simulation::from_scenario(config.clone(), scenario).map_err(describe_kernel_error)?;
        let outcome = simulation.run().map_err(describe_kernel_error)?;

        if !outcome.leaderless_groups.is_empty() {
            warn!(groups = ?outcome.leaderless_groups, "Run finished with leaderless groups");
        }
        if let Err(problem) = simulation.context().check_consistency() {
            bail!("context inconsistent after migration: {problem}");
        }

        Ok(RunReport::from_outcome(trial, config, None, started_at, outcome))
    }
}

/// Label a kernel failure as bad scenario data or bad configuration.
fn describe_kernel_error(err: KernelError) -> anyhow::Error {
    let label = if err.is_input_inconsistency() {
        "inconsistent scenario input"
    } else {
        "invalid migration configuration"
    };
    anyhow::Error::new(err).context(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::ScenarioSize;
    use hgtm_kernel::EdgeSpec;

    fn runner() -> ExperimentRunner {
        ExperimentRunner::new(ExperimentRunnerConfig {
            generator: ScenarioSize::Small.config(),
            ..ExperimentRunnerConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_run_is_reproducible() {
        let runner = runner();
        let a = runner.run(0, 9).unwrap();
        let b = runner.run(0, 9).unwrap();

        assert_eq!(a.records, b.records);
        assert_eq!(a.metrics, b.metrics);
        assert_eq!(a.config.seed, 9);
        assert_eq!(a.stats.agents, 8);
        assert_eq!(a.stats.tasks, 20);
        assert!(a.generator.is_some());
    }

    #[test]
    fn test_run_scenario_uses_given_seed() {
        let runner = runner();
        let scenario = runner.generate(5);
        let report = runner.run_scenario(2, 77, scenario.clone()).unwrap();
        assert_eq!(report.trial, 2);
        assert_eq!(report.config.seed, 77);
        assert!(report.generator.is_none());

        let again = runner.run_scenario(2, 77, scenario).unwrap();
        assert_eq!(report.records, again.records);
        assert_eq!(report.metrics, again.metrics);
    }

    #[test]
    fn test_bad_scenario_is_reported_as_input_error() {
        let runner = runner();
        let mut scenario = runner.generate(5);
        scenario.edges.push(EdgeSpec {
            from: 0,
            to: 999,
            weight: 1.0,
        });

        let err = runner.run_scenario(0, 1, scenario).unwrap_err();
        assert_eq!(err.to_string(), "inconsistent scenario input");
        assert!(format!("{err:#}").contains("unknown agent 999"));
        assert!(err.downcast_ref::<KernelError>().is_some());
    }

    #[test]
    fn test_trials_cover_each_scoring() {
        let results = runner()
            .run_trials(
                3,
                100,
                &[LeaderScoring::Additive, LeaderScoring::Multiplicative],
            )
            .unwrap();
        assert_eq!(results.runs.len(), 6);
        assert_eq!(results.summary.len(), 2);
        assert_eq!(results.summary["additive"].trials, 3);
        assert_eq!(
            results.summary["multiplicative"].scoring,
            LeaderScoring::Multiplicative
        );
    }

    #[test]
    fn test_invalid_generator_config() {
        let config = ExperimentRunnerConfig {
            generator: GeneratorConfig {
                chord_probability: 1.5,
                ..GeneratorConfig::default()
            },
            ..ExperimentRunnerConfig::default()
        };
        assert!(ExperimentRunner::new(config).is_err());

        let config = ExperimentRunnerConfig {
            generator: GeneratorConfig {
                groups: 0,
                ..GeneratorConfig::default()
            },
            ..ExperimentRunnerConfig::default()
        };
        assert!(ExperimentRunner::new(config).is_err());
    }

    #[test]
    fn test_load_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "migration": { "backup_count": 3 }, "generator": { "groups": 4 } }"#,
        )
        .unwrap();

        let config = ExperimentRunnerConfig::load(&path).unwrap();
        assert_eq!(config.migration.backup_count, 3);
        assert_eq!(config.migration.weights.b, 0.9);
        assert_eq!(config.generator.groups, 4);
        assert_eq!(config.generator.agents_per_group, 6);
    }
}
