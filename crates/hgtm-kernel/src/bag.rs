//! Bag formation: greedy merging of faulty agents that migrate better together.
//!
//! Every faulty agent starts in its own bag. The bag holding the most tasks
//! is taken from the working queue and offered to every other queued bag; the
//! first merge whose benefit beats the two bags' separate benefits replaces
//! both. A bag that merges with nobody is final. Each step either removes a
//! bag from the queue or shrinks it by one, so formation ends after at most
//! `2 * faulty` steps.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::context::SimulationContext;
use crate::model::AgentId;
use crate::survivability::saturate;

/// Faulty agents migrating as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bag {
    pub members: Vec<AgentId>,
}

impl Bag {
    pub fn new(members: Vec<AgentId>) -> Self {
        Self { members }
    }

    /// Tasks held by all members.
    pub fn task_count(&self, ctx: &SimulationContext) -> usize {
        task_count(ctx, &self.members)
    }

    /// Summed member load.
    pub fn load(&self, ctx: &SimulationContext) -> f64 {
        load(ctx, &self.members)
    }
}

/// A final bag and the healthy agent its tasks should go to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BagAssignment {
    pub bag: Bag,
    pub target: AgentId,
    pub benefit: f64,
}

/// Output of bag formation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BagPlan {
    pub assignments: Vec<BagAssignment>,
    /// Final bags without any healthy same-group neighbor to migrate to
    pub unassigned: Vec<Bag>,
}

impl BagPlan {
    /// The target assigned to the bag containing `agent`.
    pub fn target_of(&self, agent: AgentId) -> Option<AgentId> {
        self.assignments
            .iter()
            .find(|a| a.bag.members.contains(&agent))
            .map(|a| a.target)
    }

    pub fn bag_count(&self) -> usize {
        self.assignments.len() + self.unassigned.len()
    }

    /// Targets whose own queue is short relative to their bag:
    /// `bag_tasks * (1 - interaction) * 2 > target_tasks`. These are kept out
    /// of the gradient walk so their capacity stays free for the bag.
    pub fn reserved_receivers(&self, ctx: &SimulationContext) -> HashSet<AgentId> {
        self.assignments
            .iter()
            .filter(|a| {
                let bag_tasks = a.bag.task_count(ctx) as f64;
                let target_tasks = ctx.agent(a.target).map(|t| t.tasks.len()).unwrap_or(0) as f64;
                let interaction = ctx
                    .group_of(a.target)
                    .map(|g| g.interaction_level)
                    .unwrap_or(0.0);
                bag_tasks * (1.0 - interaction) * 2.0 > target_tasks
            })
            .map(|a| a.target)
            .collect()
    }
}

/// Greedy bag merging over the current context.
pub struct BagFormation;

impl BagFormation {
    pub fn run(ctx: &SimulationContext) -> BagPlan {
        let mut queue: Vec<Queued> = ctx
            .faulty_agents()
            .into_iter()
            .enumerate()
            .map(|(seq, id)| Queued {
                tasks: task_count(ctx, &[id]),
                seq,
                members: vec![id],
            })
            .collect();
        let mut next_seq = queue.len();
        let mut finalized: Vec<Vec<AgentId>> = Vec::new();

        loop {
            queue.sort_by(|a, b| b.tasks.cmp(&a.tasks).then(a.seq.cmp(&b.seq)));
            if queue.is_empty() {
                break;
            }
            let m = queue.remove(0);
            let ben_m = Self::benefit_value(ctx, &m.members);

            let mut accepted = None;
            for (i, n) in queue.iter().enumerate() {
                let merged: Vec<AgentId> = n.members.iter().chain(&m.members).copied().collect();
                let ben_merged = Self::benefit_value(ctx, &merged);
                if ben_merged > Self::benefit_value(ctx, &n.members) + ben_m {
                    accepted = Some((i, merged));
                    break;
                }
            }

            match accepted {
                Some((i, members)) => {
                    let n = queue.remove(i);
                    debug!(bag = ?members, "Merged bags");
                    queue.push(Queued {
                        tasks: m.tasks + n.tasks,
                        seq: next_seq,
                        members,
                    });
                    next_seq += 1;
                }
                None => finalized.push(m.members),
            }
        }

        let mut plan = BagPlan::default();
        for members in finalized {
            match Self::best_target(ctx, &members) {
                Some((target, benefit)) => plan.assignments.push(BagAssignment {
                    bag: Bag::new(members),
                    target,
                    benefit,
                }),
                None => plan.unassigned.push(Bag::new(members)),
            }
        }

        info!(
            bags = plan.bag_count(),
            assigned = plan.assignments.len(),
            "Bag formation complete"
        );
        plan
    }

    /// The healthy same-group neighbor of any member with the highest
    /// benefit, first found on ties.
    pub fn best_target(ctx: &SimulationContext, members: &[AgentId]) -> Option<(AgentId, f64)> {
        let mut seen = HashSet::new();
        let mut best: Option<(AgentId, f64)> = None;
        for &member in members {
            for neighbor in ctx.same_group_neighbors(member) {
                if ctx.is_faulty(neighbor.id) || !seen.insert(neighbor.id) {
                    continue;
                }
                let benefit = Self::benefit(ctx, members, neighbor.id);
                if best.is_none_or(|(_, b)| benefit > b) {
                    best = Some((neighbor.id, benefit));
                }
            }
        }
        best
    }

    /// Benefit of moving the bag's work onto `target`:
    /// `b * completion - a * cost_increase`.
    ///
    /// Cost is the target's edge-weighted neighborhood queue averaged over
    /// its same-group neighbors, plus the bag load and the direct edges from
    /// members to the target, relative to the neighbors' summed load ratio.
    /// Completion is `1 - max(sig(bag_load) * interaction, 0.5)`.
    pub fn benefit(ctx: &SimulationContext, members: &[AgentId], target: AgentId) -> f64 {
        let w = ctx.config.weights;
        let interaction = ctx
            .group_of(target)
            .map(|g| g.interaction_level)
            .unwrap_or(0.0);

        let mut cost = 0.0;
        let mut ratio_sum = 0.0;
        let neighborhood = ctx.same_group_neighbors(target);
        for neighbor in &neighborhood {
            if let Some(agent) = ctx.agent(neighbor.id) {
                cost += neighbor.weight * agent.tasks.len() as f64;
                ratio_sum += agent.load_ratio();
            }
        }
        if !neighborhood.is_empty() {
            cost /= neighborhood.len() as f64;
        }

        let bag_load = load(ctx, members);
        cost += bag_load;
        cost += members
            .iter()
            .filter_map(|&m| ctx.topology.edge_weight(m, target))
            .sum::<f64>();

        let cost_increase = if ratio_sum > 0.0 { cost / ratio_sum } else { 0.0 };
        let completion = 1.0 - (saturate(bag_load) * interaction).max(0.5);
        w.b * completion - w.a * cost_increase
    }

    fn benefit_value(ctx: &SimulationContext, members: &[AgentId]) -> f64 {
        Self::best_target(ctx, members)
            .map(|(_, b)| b)
            .unwrap_or(f64::NEG_INFINITY)
    }
}

#[derive(Debug)]
struct Queued {
    tasks: usize,
    seq: usize,
    members: Vec<AgentId>,
}

fn task_count(ctx: &SimulationContext, members: &[AgentId]) -> usize {
    members
        .iter()
        .filter_map(|&id| ctx.agent(id))
        .map(|a| a.tasks.len())
        .sum()
}

fn load(ctx: &SimulationContext, members: &[AgentId]) -> f64 {
    members
        .iter()
        .filter_map(|&id| ctx.agent(id))
        .map(|a| a.load)
        .sum()
}
