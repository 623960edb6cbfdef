//! Two-level task migration driven by potential fields.
//!
//! Inter-group migration runs first: faulty agents of groups whose potential
//! sits above the network average send tasks to the leader of the lowest
//! potential group. Intra-group migration then drains every faulty agent by
//! gradient walks over same-group neighbors, and finally walks once from the
//! group leader. Tasks still stranded on faulty bag members go to their
//! bag's target.
//!
//! Every single transfer is followed by a global recomputation of contextual
//! loads and potentials, so each decision sees the latest state.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::bag::BagPlan;
use crate::context::SimulationContext;
use crate::error::Result;
use crate::model::{AgentId, GroupId, MigrationRecord, TaskId};
use crate::potential::{FieldSnapshot, PotentialFieldCalculator};
use crate::topology::Neighbor;

/// What the migration engine did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationOutcome {
    /// Completed transfers in execution order
    pub records: Vec<MigrationRecord>,
    /// Groups skipped because they have no leader
    pub leaderless_groups: Vec<GroupId>,
    /// Faulty agents left holding tasks no neighbor would take
    pub stalled_agents: Vec<AgentId>,
    pub inter_group: usize,
    pub intra_group: usize,
    pub settled: usize,
}

/// Executes migration against a context it borrows mutably for its lifetime.
pub struct TaskMigrationEngine<'a> {
    ctx: &'a mut SimulationContext,
    fields: FieldSnapshot,
    reserved: HashSet<AgentId>,
    records: Vec<MigrationRecord>,
    leaderless: BTreeSet<GroupId>,
    stalled: Vec<AgentId>,
}

impl<'a> TaskMigrationEngine<'a> {
    /// Prepare an engine. Receivers reserved by `plan` are kept out of the
    /// gradient walk.
    pub fn new(ctx: &'a mut SimulationContext, plan: &BagPlan) -> Self {
        let reserved = plan.reserved_receivers(ctx);
        let fields = PotentialFieldCalculator::refresh(ctx);
        Self {
            ctx,
            fields,
            reserved,
            records: Vec::new(),
            leaderless: BTreeSet::new(),
            stalled: Vec::new(),
        }
    }

    /// Run both phases and bag settlement.
    pub fn run(mut self, plan: &BagPlan) -> Result<MigrationOutcome> {
        let inter_group = self.inter_group()?;

        let mut intra_group = 0;
        for group in self.faulty_groups() {
            intra_group += self.intra_group(group)?;
        }

        let settled = self.settle_bags(plan)?;

        let stalled: Vec<AgentId> = self
            .stalled
            .iter()
            .copied()
            .filter(|&agent| self.task_count(agent) > 0)
            .collect();
        for &agent in &stalled {
            warn!(agent, tasks = self.task_count(agent), "Faulty agent still holds tasks");
        }

        info!(
            inter_group,
            intra_group,
            settled,
            leaderless = self.leaderless.len(),
            stalled = stalled.len(),
            "Task migration complete"
        );

        Ok(MigrationOutcome {
            records: self.records,
            leaderless_groups: self.leaderless.into_iter().collect(),
            stalled_agents: stalled,
            inter_group,
            intra_group,
            settled,
        })
    }

    /// Current potentials.
    pub fn fields(&self) -> &FieldSnapshot {
        &self.fields
    }

    pub fn records(&self) -> &[MigrationRecord] {
        &self.records
    }

    /// Move tasks of faulty agents in above-average groups to the leader of
    /// the lowest-potential group, while that group stays below the average
    /// taken at the start of the phase. Returns the number of transfers.
    pub fn inter_group(&mut self) -> Result<usize> {
        let average = self.fields.mean_group_potential();
        let start = self.records.len();

        for group in self.faulty_groups() {
            if self.leader_of(group).is_none() {
                self.mark_leaderless(group);
                continue;
            }
            for agent in self.faulty_members(group) {
                if self.fields.group_potential(group) <= average {
                    continue;
                }
                let Some((target_group, target)) = self.lowest_group_leader(group) else {
                    continue;
                };
                let tasks = self.ctx.agent(agent).map(|a| a.tasks.clone()).unwrap_or_default();
                for task in tasks {
                    if self.fields.group_potential(target_group) >= average {
                        break;
                    }
                    self.migrate(task, agent, target)?;
                }
            }
        }

        let moved = self.records.len() - start;
        debug!(moved, average, "Inter-group phase complete");
        Ok(moved)
    }

    /// Drain every faulty member of `group`, then walk from its leader.
    /// Leaderless groups are skipped. Returns the number of transfers.
    pub fn intra_group(&mut self, group: GroupId) -> Result<usize> {
        let Some(leader) = self.leader_of(group) else {
            self.mark_leaderless(group);
            return Ok(0);
        };
        let start = self.records.len();

        for agent in self.faulty_members(group) {
            self.drain(agent)?;
        }
        let mut visited = HashSet::new();
        self.walk(leader, &mut visited)?;

        let moved = self.records.len() - start;
        debug!(group, moved, "Intra-group phase complete");
        Ok(moved)
    }

    /// Give every task still held by a faulty bag member to the bag's target.
    pub fn settle_bags(&mut self, plan: &BagPlan) -> Result<usize> {
        let start = self.records.len();
        for assignment in &plan.assignments {
            let target = assignment.target;
            if self.ctx.is_faulty(target) {
                continue;
            }
            for &member in &assignment.bag.members {
                if member == target || !self.ctx.is_faulty(member) {
                    continue;
                }
                let Some(group) = self.ctx.agent(member).map(|a| a.group) else {
                    continue;
                };
                if self.leader_of(group).is_none() {
                    self.mark_leaderless(group);
                    continue;
                }
                let tasks = self.ctx.agent(member).map(|a| a.tasks.clone()).unwrap_or_default();
                for task in tasks {
                    self.migrate(task, member, target)?;
                }
            }
        }
        Ok(self.records.len() - start)
    }

    /// Repeat gradient walks from a faulty agent until it holds nothing or a
    /// walk moves nothing.
    fn drain(&mut self, agent: AgentId) -> Result<()> {
        loop {
            let before = self.task_count(agent);
            if before == 0 {
                return Ok(());
            }
            let mut visited = HashSet::new();
            self.walk(agent, &mut visited)?;
            if self.task_count(agent) >= before {
                debug!(agent, tasks = before, "Gradient walk stalled");
                self.stalled.push(agent);
                return Ok(());
            }
        }
    }

    /// Move the largest task of `agent` down the potential gradient, then
    /// continue from the receiver. Stops when the agent is empty, no eligible
    /// neighbor exists, the descent per unit weight is at most the threshold,
    /// or the receiver was already visited.
    fn walk(&mut self, agent: AgentId, visited: &mut HashSet<AgentId>) -> Result<()> {
        visited.insert(agent);
        loop {
            let Some(task) = self.ctx.largest_task(agent) else {
                return Ok(());
            };
            let Some(next) = self.best_neighbor(agent) else {
                return Ok(());
            };
            let descent = (self.fields.agent_potential(agent)
                - self.fields.agent_potential(next.id))
                / next.weight;
            if descent <= self.ctx.config.gradient_threshold {
                return Ok(());
            }

            self.migrate(task, agent, next.id)?;
            if visited.contains(&next.id) {
                return Ok(());
            }
            self.walk(next.id, visited)?;
        }
    }

    /// Same-group, healthy, unreserved neighbor maximizing
    /// `(potential(neighbor) - potential(agent)) / weight`; first wins ties.
    fn best_neighbor(&self, agent: AgentId) -> Option<Neighbor> {
        let own = self.fields.agent_potential(agent);
        let mut best: Option<(Neighbor, f64)> = None;
        for neighbor in self.ctx.same_group_neighbors(agent) {
            if self.ctx.is_faulty(neighbor.id) || self.reserved.contains(&neighbor.id) {
                continue;
            }
            let gradient = (self.fields.agent_potential(neighbor.id) - own) / neighbor.weight;
            if best.is_none_or(|(_, g)| gradient > g) {
                best = Some((neighbor, gradient));
            }
        }
        best.map(|(n, _)| n)
    }

    /// Group other than `source` with the lowest potential and a healthy leader.
    fn lowest_group_leader(&self, source: GroupId) -> Option<(GroupId, AgentId)> {
        let mut best: Option<(GroupId, AgentId, f64)> = None;
        for (id, potential) in self.fields.group_potentials() {
            if id == source {
                continue;
            }
            let Some(leader) = self.leader_of(id) else {
                continue;
            };
            if best.is_none_or(|(_, _, p)| potential < p) {
                best = Some((id, leader, potential));
            }
        }
        best.map(|(id, leader, _)| (id, leader))
    }

    fn migrate(&mut self, task: TaskId, from: AgentId, to: AgentId) -> Result<()> {
        let record = self.ctx.transfer_task(task, from, to)?;
        trace!(task, from, to, "Migrated task");
        self.records.push(record);
        self.fields = PotentialFieldCalculator::refresh(self.ctx);
        Ok(())
    }

    /// The healthy leader of `group`, if any.
    fn leader_of(&self, group: GroupId) -> Option<AgentId> {
        self.ctx
            .group(group)
            .and_then(|g| g.leader)
            .filter(|&leader| !self.ctx.is_faulty(leader))
    }

    fn mark_leaderless(&mut self, group: GroupId) {
        if self.leaderless.insert(group) {
            warn!(group, "Group has no healthy leader; skipping its migration");
        }
    }

    /// Groups holding at least one faulty agent, by id.
    fn faulty_groups(&self) -> Vec<GroupId> {
        self.ctx
            .groups()
            .filter(|g| g.members.iter().any(|&id| self.ctx.is_faulty(id)))
            .map(|g| g.id)
            .collect()
    }

    fn faulty_members(&self, group: GroupId) -> Vec<AgentId> {
        self.ctx
            .group(group)
            .map(|g| {
                g.members
                    .iter()
                    .copied()
                    .filter(|&id| self.ctx.is_faulty(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn task_count(&self, agent: AgentId) -> usize {
        self.ctx.agent(agent).map(|a| a.tasks.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::BagFormation;
    use crate::fixtures::{context, mark_faulty};

    fn run(ctx: &mut SimulationContext) -> MigrationOutcome {
        ctx.refresh_overload_faults();
        let plan = BagFormation::run(ctx);
        TaskMigrationEngine::new(ctx, &plan).run(&plan).unwrap()
    }

    #[test]
    fn test_faulty_leaf_drains_to_neighbor() {
        let mut ctx = context(
            &[(1, 10.0, 0), (2, 10.0, 0), (3, 10.0, 0)],
            &[(3, 4.0), (3, 2.0), (2, 0.5), (2, 0.5), (2, 0.5), (2, 0.5), (2, 0.5)],
            &[(1, 2, 1.0), (2, 3, 1.0)],
        );
        ctx.group_mut(0).unwrap().leader = Some(1);
        mark_faulty(&mut ctx, 3);

        let outcome = run(&mut ctx);
        assert!(ctx.agent(3).unwrap().tasks.is_empty());
        assert_eq!(outcome.records.first().map(|r| r.from), Some(3));
        assert!(outcome.records.iter().all(|r| r.to != 3));
        assert!(outcome.stalled_agents.is_empty());
        assert_eq!(ctx.total_load(), 8.5);
        assert!(ctx.check_consistency().is_ok());
    }

    #[test]
    fn test_leaderless_group_is_skipped() {
        let mut ctx = context(&[(1, 10.0, 0), (2, 10.0, 0)], &[(1, 3.0)], &[(1, 2, 1.0)]);
        mark_faulty(&mut ctx, 1);

        let outcome = run(&mut ctx);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.leaderless_groups, vec![0]);
        assert_eq!(ctx.agent(1).unwrap().tasks.len(), 1);
    }

    #[test]
    fn test_isolated_faulty_agent_stalls() {
        let mut ctx = context(&[(1, 10.0, 0), (2, 10.0, 0)], &[(2, 3.0)], &[]);
        ctx.group_mut(0).unwrap().leader = Some(1);
        mark_faulty(&mut ctx, 2);

        let outcome = run(&mut ctx);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.stalled_agents, vec![2]);
    }

    #[test]
    fn test_walk_stays_inside_group() {
        let mut ctx = context(
            &[(1, 10.0, 0), (2, 10.0, 0), (3, 10.0, 1)],
            &[(2, 5.0), (1, 1.0), (1, 1.0), (1, 1.0)],
            &[(1, 2, 1.0), (2, 3, 0.5)],
        );
        ctx.group_mut(0).unwrap().leader = Some(1);
        ctx.group_mut(1).unwrap().leader = Some(3);
        mark_faulty(&mut ctx, 2);

        let plan = BagFormation::run(&ctx);
        let mut engine = TaskMigrationEngine::new(&mut ctx, &plan);
        engine.intra_group(0).unwrap();
        assert_eq!(engine.records(), &[MigrationRecord { task: 1, from: 2, to: 1 }]);
    }

    #[test]
    fn test_walk_terminates_on_cycle() {
        let mut edges = Vec::new();
        for a in 1..=6 {
            edges.push((a, a % 6 + 1, 1.0));
        }
        let holdings: Vec<_> = (0..12).map(|i| (i % 6 + 1, 1.0 + i as f64)).collect();
        let agents: Vec<_> = (1..=6).map(|id| (id, 10.0, 0)).collect();
        let mut ctx = context(&agents, &holdings, &edges);
        ctx.group_mut(0).unwrap().leader = Some(1);
        mark_faulty(&mut ctx, 3);
        mark_faulty(&mut ctx, 4);

        let outcome = run(&mut ctx);
        assert!(ctx.agent(3).unwrap().tasks.is_empty());
        assert!(ctx.agent(4).unwrap().tasks.is_empty());
        assert!(outcome.records.len() <= 12 * 6);
        assert!(ctx.check_consistency().is_ok());
    }
}
