//! The migration pipeline: one deterministic pass from scenario to metrics.
//!
//! ## Usage
//!
//! ```
//! use hgtm_kernel::{MigrationConfig, Scenario, Simulation};
//!
//! let scenario = Scenario::default();
//! let mut simulation = Simulation::from_scenario(MigrationConfig::default(), scenario)?;
//! let outcome = simulation.run()?;
//! assert!(outcome.records.is_empty());
//! # Ok::<(), hgtm_kernel::KernelError>(())
//! ```

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bag::{BagFormation, BagPlan};
use crate::config::MigrationConfig;
use crate::context::SimulationContext;
use crate::error::Result;
use crate::evaluator::{Evaluator, ExperimentResult, ScenarioStats};
use crate::initializer::Initializer;
use crate::leadership::{BackupLeaderSelector, FailoverEvent, LeaderElection, LeaderFailover};
use crate::migration::TaskMigrationEngine;
use crate::model::{AgentId, GroupId, MigrationRecord};
use crate::scenario::Scenario;

/// Everything one run produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub records: Vec<MigrationRecord>,
    pub result: ExperimentResult,
    /// Statistics of the initialized scenario
    pub stats: ScenarioStats,
    pub failovers: Vec<FailoverEvent>,
    pub bags: BagPlan,
    pub leaderless_groups: Vec<GroupId>,
    pub stalled_agents: Vec<AgentId>,
}

/// One simulation, owning its context.
#[derive(Debug, Clone)]
pub struct Simulation {
    ctx: SimulationContext,
}

impl Simulation {
    /// Initialize a simulation from a scenario.
    pub fn from_scenario(config: MigrationConfig, scenario: Scenario) -> Result<Self> {
        let ctx = Initializer::new(config).run(scenario)?;
        Ok(Self { ctx })
    }

    /// Wrap an already initialized context.
    pub fn from_context(ctx: SimulationContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &SimulationContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut SimulationContext {
        &mut self.ctx
    }

    pub fn into_context(self) -> SimulationContext {
        self.ctx
    }

    /// Elect leaders, pick standbys, fail over, form bags, migrate, evaluate.
    pub fn run(&mut self) -> Result<SimulationOutcome> {
        let ctx = &mut self.ctx;
        let stats = Evaluator::scenario_stats(ctx);
        info!(
            agents = stats.agents,
            groups = stats.groups,
            tasks = stats.tasks,
            "Starting migration pipeline"
        );

        LeaderElection::run(ctx)?;
        BackupLeaderSelector::run(ctx);
        let failovers = LeaderFailover::run(ctx)?;

        let bags = BagFormation::run(ctx);
        let migration = TaskMigrationEngine::new(ctx, &bags).run(&bags)?;

        let result = Evaluator::evaluate(ctx, &migration.records);

        Ok(SimulationOutcome {
            records: migration.records,
            result,
            stats,
            failovers,
            bags,
            leaderless_groups: migration.leaderless_groups,
            stalled_agents: migration.stalled_agents,
        })
    }
}

/// Initialize and run a scenario in one call.
pub fn run_scenario(config: MigrationConfig, scenario: Scenario) -> Result<SimulationOutcome> {
    Simulation::from_scenario(config, scenario)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Task;
    use crate::scenario::{AgentSpec, EdgeSpec};

    fn ring(agents: u32, tasks: u32) -> Scenario {
        Scenario {
            tasks: (0..tasks)
                .map(|i| Task::pre_assigned(i, 1.0 + (i % 5) as f64))
                .collect(),
            agents: (0..agents)
                .map(|i| AgentSpec::new(i, 20.0, i % 2))
                .collect(),
            edges: (0..agents)
                .map(|i| EdgeSpec {
                    from: i,
                    to: (i + 2) % agents,
                    weight: 1.0 + (i % 3) as f64,
                })
                .collect(),
        }
    }

    #[test]
    fn test_pipeline_conserves_load() {
        let scenario = ring(10, 30);
        let total = scenario.total_task_size();
        let mut simulation = Simulation::from_scenario(MigrationConfig::default(), scenario).unwrap();
        let outcome = simulation.run().unwrap();

        let ctx = simulation.context();
        assert!((ctx.total_load() - total).abs() < 1e-9);
        assert!(ctx.check_consistency().is_ok());
        assert_eq!(outcome.stats.tasks, 30);
        for group in ctx.groups() {
            if let Some(leader) = group.leader {
                assert!(!ctx.is_faulty(leader));
            }
        }
    }

    #[test]
    fn test_empty_scenario() {
        let outcome = run_scenario(MigrationConfig::default(), Scenario::default()).unwrap();
        assert_eq!(outcome.result, ExperimentResult::default());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = MigrationConfig {
            fault_fraction: 1.5,
            ..MigrationConfig::default()
        };
        assert!(run_scenario(config, ring(4, 4)).is_err());
    }
}
