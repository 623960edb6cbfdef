//! Attractive and repulsive potentials at agent level and group level.
//!
//! Potentials are computed into an immutable [`FieldSnapshot`]. The migration
//! engine takes a fresh snapshot after every transfer instead of patching the
//! old one.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::context::SimulationContext;
use crate::contextual::ContextualLoadEstimator;
use crate::model::{AgentId, GroupId};

/// An attractive/repulsive pair. Migration follows the descent of their sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PotentialField {
    pub attractive: f64,
    pub repulsive: f64,
}

impl PotentialField {
    pub fn total(&self) -> f64 {
        self.attractive + self.repulsive
    }
}

/// Contextual loads and potentials of one system state.
#[derive(Debug, Clone, Default)]
pub struct FieldSnapshot {
    contextual: HashMap<AgentId, f64>,
    agents: HashMap<AgentId, PotentialField>,
    groups: BTreeMap<GroupId, PotentialField>,
}

impl FieldSnapshot {
    pub fn contextual_load(&self, agent: AgentId) -> Option<f64> {
        self.contextual.get(&agent).copied()
    }

    pub fn agent_field(&self, agent: AgentId) -> Option<PotentialField> {
        self.agents.get(&agent).copied()
    }

    pub fn group_field(&self, group: GroupId) -> Option<PotentialField> {
        self.groups.get(&group).copied()
    }

    /// Combined intra-group potential of `agent`; 0 for unknown agents.
    pub fn agent_potential(&self, agent: AgentId) -> f64 {
        self.agents.get(&agent).map(PotentialField::total).unwrap_or(0.0)
    }

    /// Combined inter-group potential of `group`; 0 for unknown groups.
    pub fn group_potential(&self, group: GroupId) -> f64 {
        self.groups.get(&group).map(PotentialField::total).unwrap_or(0.0)
    }

    /// Average combined potential over all groups.
    pub fn mean_group_potential(&self) -> f64 {
        if self.groups.is_empty() {
            return 0.0;
        }
        self.groups.values().map(PotentialField::total).sum::<f64>() / self.groups.len() as f64
    }

    /// Groups with their combined potential, ordered by id.
    pub fn group_potentials(&self) -> impl Iterator<Item = (GroupId, f64)> + '_ {
        self.groups.iter().map(|(&id, p)| (id, p.total()))
    }
}

/// Derives potentials from contextual load and fault density.
pub struct PotentialFieldCalculator;

impl PotentialFieldCalculator {
    /// Compute a snapshot without touching the context.
    pub fn snapshot(ctx: &SimulationContext) -> FieldSnapshot {
        let contextual = ContextualLoadEstimator::estimate_all(ctx);
        let agents = Self::intra(ctx, &contextual);
        let groups = Self::inter(ctx);
        FieldSnapshot {
            contextual,
            agents,
            groups,
        }
    }

    /// Refresh every agent's overload-fault probability, then snapshot.
    pub fn refresh(ctx: &mut SimulationContext) -> FieldSnapshot {
        ctx.refresh_overload_faults();
        let snapshot = Self::snapshot(ctx);
        trace!(
            mean_group_potential = snapshot.mean_group_potential(),
            "Refreshed potential fields"
        );
        snapshot
    }

    /// Agent-level potentials.
    ///
    /// Attraction is `-a * (I - mean I)`. Repulsion is the sentinel for a
    /// faulty agent, otherwise `b * y / ro^2` with `ro` the summed inverse
    /// edge weight to faulty same-group neighbors, or 0 without any.
    pub fn intra(
        ctx: &SimulationContext,
        contextual: &HashMap<AgentId, f64>,
    ) -> HashMap<AgentId, PotentialField> {
        let w = ctx.config.weights;
        let field = ctx.config.field;
        // sum in agent order; map iteration order differs between runs
        let mean = if contextual.is_empty() {
            0.0
        } else {
            ctx.agents()
                .iter()
                .filter_map(|a| contextual.get(&a.id))
                .sum::<f64>()
                / contextual.len() as f64
        };

        ctx.agents()
            .iter()
            .map(|agent| {
                let load = contextual.get(&agent.id).copied().unwrap_or(0.0);
                let attractive = -w.a * (load - mean);

                let repulsive = if agent.functional_fault {
                    field.sentinel
                } else {
                    let ro: f64 = ctx
                        .same_group_neighbors(agent.id)
                        .iter()
                        .filter(|n| ctx.is_faulty(n.id))
                        .map(|n| 1.0 / n.weight)
                        .sum();
                    if ro > 0.0 {
                        w.b * field.agent_repulsion * (1.0 / ro) * (1.0 / ro)
                    } else {
                        0.0
                    }
                };

                (
                    agent.id,
                    PotentialField {
                        attractive,
                        repulsive,
                    },
                )
            })
            .collect()
    }

    /// Group-level potentials.
    ///
    /// Attraction is `a * xn * group_load`; repulsion is
    /// `b * yn * faulty / healthy`, or the sentinel when nobody is healthy.
    pub fn inter(ctx: &SimulationContext) -> BTreeMap<GroupId, PotentialField> {
        let w = ctx.config.weights;
        let field = ctx.config.field;
        ctx.groups()
            .map(|group| {
                let attractive = w.a * field.group_attraction * group.load;
                let faulty = group.members.iter().filter(|&&id| ctx.is_faulty(id)).count();
                let healthy = group.members.len() - faulty;
                let repulsive = if healthy == 0 {
                    field.sentinel
                } else {
                    w.b * field.group_repulsion * faulty as f64 / healthy as f64
                };
                (
                    group.id,
                    PotentialField {
                        attractive,
                        repulsive,
                    },
                )
            })
            .collect()
    }
}
