//! Post-migration metrics.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::SimulationContext;
use crate::model::MigrationRecord;

/// The three scalar metrics of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    /// Mean load/capacity over agents with capacity
    pub execution_cost: f64,
    /// Mean shortest-path weight per migration record
    pub migration_cost: f64,
    /// Mean of `(1 - functional) * (1 - overload)` over all agents
    pub survival_rate: f64,
}

/// Descriptive statistics of a scenario.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStats {
    pub agents: usize,
    pub groups: usize,
    pub tasks: usize,
    pub mean_capacity: f64,
    pub std_capacity: f64,
    pub mean_task_size: f64,
    pub std_task_size: f64,
}

pub struct Evaluator;

impl Evaluator {
    pub fn evaluate(ctx: &SimulationContext, records: &[MigrationRecord]) -> ExperimentResult {
        let result = ExperimentResult {
            execution_cost: Self::execution_cost(ctx),
            migration_cost: Self::migration_cost(ctx, records),
            survival_rate: Self::survival_rate(ctx),
        };
        info!(
            execution_cost = result.execution_cost,
            migration_cost = result.migration_cost,
            survival_rate = result.survival_rate,
            "Evaluated run"
        );
        result
    }

    /// Zero-capacity agents are left out of the mean.
    pub fn execution_cost(ctx: &SimulationContext) -> f64 {
        mean(
            ctx.agents()
                .iter()
                .filter(|a| a.has_capacity())
                .map(|a| a.load / a.capacity),
        )
    }

    /// Records between disconnected agents cost the configured penalty.
    pub fn migration_cost(ctx: &SimulationContext, records: &[MigrationRecord]) -> f64 {
        let penalty = ctx.config.penalties.migration_cost;
        mean(records.iter().map(|r| {
            ctx.topology
                .shortest_path_length(r.from, r.to)
                .unwrap_or(penalty)
        }))
    }

    pub fn survival_rate(ctx: &SimulationContext) -> f64 {
        mean(ctx.agents().iter().map(|a| a.survival()))
    }

    /// Population mean and standard deviation of capacities and task sizes.
    pub fn scenario_stats(ctx: &SimulationContext) -> ScenarioStats {
        let capacities: Vec<f64> = ctx.agents().iter().map(|a| a.capacity).collect();
        let sizes: Vec<f64> = ctx.tasks().map(|t| t.size).collect();
        let (mean_capacity, std_capacity) = mean_std(&capacities);
        let (mean_task_size, std_task_size) = mean_std(&sizes);
        ScenarioStats {
            agents: capacities.len(),
            groups: ctx.group_ids().len(),
            tasks: sizes.len(),
            mean_capacity,
            std_capacity,
            mean_task_size,
            std_task_size,
        }
    }
}

/// Arithmetic mean, 0 for an empty sequence.
fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let m = mean(values.iter().copied());
    let var = mean(values.iter().map(|v| (v - m) * (v - m)));
    (m, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{context, mark_faulty};

    #[test]
    fn test_execution_cost_skips_zero_capacity() {
        let ctx = context(
            &[(1, 10.0, 0), (2, 0.0, 0), (3, 20.0, 0)],
            &[(1, 5.0), (3, 5.0)],
            &[],
        );
        assert!((Evaluator::execution_cost(&ctx) - (0.5 + 0.25) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_migration_cost_uses_paths_and_penalty() {
        let ctx = context(
            &[(1, 10.0, 0), (2, 10.0, 0), (3, 10.0, 0), (4, 10.0, 1)],
            &[],
            &[(1, 2, 1.5), (2, 3, 2.0)],
        );
        let records = [
            MigrationRecord { task: 1, from: 1, to: 3 },
            MigrationRecord { task: 2, from: 1, to: 4 },
        ];
        assert_eq!(Evaluator::migration_cost(&ctx, &records), (3.5 + 10.0) / 2.0);
        assert_eq!(Evaluator::migration_cost(&ctx, &[]), 0.0);
    }

    #[test]
    fn test_survival_rate_zeroes_faulty_agents() {
        let mut ctx = context(&[(1, 10.0, 0), (2, 10.0, 0)], &[], &[]);
        mark_faulty(&mut ctx, 1);
        ctx.agent_mut(2).unwrap().overload_fault = 0.2;
        assert_eq!(Evaluator::survival_rate(&ctx), 0.4);
    }

    #[test]
    fn test_scenario_stats() {
        let ctx = context(&[(1, 10.0, 0), (2, 20.0, 1)], &[(1, 2.0), (2, 4.0)], &[]);
        let stats = Evaluator::scenario_stats(&ctx);
        assert_eq!(stats.agents, 2);
        assert_eq!(stats.groups, 2);
        assert_eq!(stats.mean_capacity, 15.0);
        assert_eq!(stats.std_capacity, 5.0);
        assert_eq!(stats.mean_task_size, 3.0);
        assert_eq!(stats.std_task_size, 1.0);
    }
}
