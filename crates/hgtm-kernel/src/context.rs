//! The simulation context: agent, group and task registries plus the topology.
//!
//! Every pipeline stage receives the context by reference. It is the only
//! owner of mutable simulation state, so independent simulations never share
//! anything. Snapshot with `clone()` to compare states before and after a stage.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::config::MigrationConfig;
use crate::error::{KernelError, Result};
use crate::model::{Agent, AgentId, Group, GroupId, MigrationRecord, Task, TaskId};
use crate::survivability::SurvivabilityModel;
use crate::topology::{Neighbor, NetworkTopology};

/// Tolerance for load bookkeeping checks.
const LOAD_EPSILON: f64 = 1e-6;

/// Mutable state of one simulation run.
#[derive(Debug, Clone)]
pub struct SimulationContext {
    pub config: MigrationConfig,
    pub topology: NetworkTopology,
    agents: Vec<Agent>,
    agent_index: HashMap<AgentId, usize>,
    groups: BTreeMap<GroupId, Group>,
    tasks: HashMap<TaskId, Task>,
    task_order: Vec<TaskId>,
    owners: HashMap<TaskId, AgentId>,
    /// Tasks not yet owned by anyone, in input order
    pending: Vec<TaskId>,
}

impl SimulationContext {
    /// Build a context from raw parts.
    ///
    /// Agents keep the tasks they already list; loads, group membership,
    /// group loads and group capacities (excluding faulty members) are
    /// derived. Every edge endpoint must be a registered agent, every listed
    /// task must exist, and no task may be listed twice.
    pub fn from_parts(
        config: MigrationConfig,
        tasks: Vec<Task>,
        agents: Vec<Agent>,
        mut topology: NetworkTopology,
    ) -> Result<Self> {
        config.validate()?;

        let mut ctx = Self {
            config,
            topology: NetworkTopology::new(),
            agents: Vec::with_capacity(agents.len()),
            agent_index: HashMap::new(),
            groups: BTreeMap::new(),
            tasks: HashMap::new(),
            task_order: Vec::new(),
            owners: HashMap::new(),
            pending: Vec::new(),
        };

        for task in tasks {
            if ctx.tasks.contains_key(&task.id) {
                return Err(KernelError::DuplicateTask(task.id));
            }
            ctx.task_order.push(task.id);
            ctx.tasks.insert(task.id, task);
        }

        for mut agent in agents {
            if ctx.agent_index.contains_key(&agent.id) {
                return Err(KernelError::DuplicateAgent(agent.id));
            }
            let mut load = 0.0;
            for &task in &agent.tasks {
                let size = ctx
                    .tasks
                    .get(&task)
                    .map(|t| t.size)
                    .ok_or(KernelError::UnknownTask {
                        agent: agent.id,
                        task,
                    })?;
                if let Some(&owner) = ctx.owners.get(&task) {
                    return Err(KernelError::TaskAlreadyOwned {
                        task,
                        owner,
                        claimant: agent.id,
                    });
                }
                ctx.owners.insert(task, agent.id);
                load += size;
            }
            agent.load = load;
            if !agent.has_capacity() {
                warn!(agent = agent.id, "Agent has no capacity");
            }

            let group = ctx
                .groups
                .entry(agent.group)
                .or_insert_with(|| Group::new(agent.group));
            group.members.push(agent.id);
            group.load += load;
            if !agent.functional_fault {
                group.capacity += agent.capacity;
            }

            ctx.agent_index.insert(agent.id, ctx.agents.len());
            ctx.agents.push(agent);
        }

        for (from, to, _) in topology.edges() {
            for endpoint in [from, to] {
                if !ctx.agent_index.contains_key(&endpoint) {
                    return Err(KernelError::UnknownEdgeEndpoint {
                        from,
                        to,
                        missing: endpoint,
                    });
                }
            }
        }
        for agent in &ctx.agents {
            topology.add_agent(agent.id);
        }
        ctx.topology = topology;

        ctx.pending = ctx
            .task_order
            .iter()
            .copied()
            .filter(|id| !ctx.owners.contains_key(id))
            .collect();

        Ok(ctx)
    }

    /// Agents in registration order.
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.agents.iter().map(|a| a.id).collect()
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agent_index.get(&id).map(|&i| &self.agents[i])
    }

    pub fn agent_mut(&mut self, id: AgentId) -> Option<&mut Agent> {
        self.agent_index.get(&id).map(|&i| &mut self.agents[i])
    }

    /// Like [`agent`](Self::agent) but unknown ids are an error.
    pub fn require_agent(&self, id: AgentId) -> Result<&Agent> {
        self.agent(id).ok_or(KernelError::UnknownAgent(id))
    }

    /// Groups ordered by id.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn group_ids(&self) -> Vec<GroupId> {
        self.groups.keys().copied().collect()
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    pub fn group_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.groups.get_mut(&id)
    }

    /// The group `agent` belongs to.
    pub fn group_of(&self, agent: AgentId) -> Option<&Group> {
        self.agent(agent).and_then(|a| self.groups.get(&a.group))
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    /// Tasks in input order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.task_order.iter().filter_map(|id| self.tasks.get(id))
    }

    pub fn task_size(&self, id: TaskId) -> f64 {
        self.tasks.get(&id).map(|t| t.size).unwrap_or(0.0)
    }

    pub fn owner_of(&self, task: TaskId) -> Option<AgentId> {
        self.owners.get(&task).copied()
    }

    /// Tasks no agent owns yet.
    pub fn pending_tasks(&self) -> &[TaskId] {
        &self.pending
    }

    /// Summed load over all agents.
    pub fn total_load(&self) -> f64 {
        self.agents.iter().map(|a| a.load).sum()
    }

    pub fn is_faulty(&self, agent: AgentId) -> bool {
        self.agent(agent).is_some_and(|a| a.functional_fault)
    }

    /// Agents carrying a functional fault, in registration order.
    pub fn faulty_agents(&self) -> Vec<AgentId> {
        self.agents
            .iter()
            .filter(|a| a.functional_fault)
            .map(|a| a.id)
            .collect()
    }

    pub fn survivability(&self) -> SurvivabilityModel {
        SurvivabilityModel::new(self.config.survivability)
    }

    /// Individual survivability of `agent` under its current and its group's load.
    pub fn individual_survivability(&self, agent: AgentId) -> f64 {
        let Some(a) = self.agent(agent) else {
            return 0.0;
        };
        let (group_load, size) = self
            .groups
            .get(&a.group)
            .map(|g| (g.load, g.members.len()))
            .unwrap_or((0.0, 0));
        self.survivability().individual(a.load, group_load, size)
    }

    /// Set every agent's overload-fault probability to `1 - survivability`.
    pub fn refresh_overload_faults(&mut self) {
        let updates: Vec<f64> = self
            .agents
            .iter()
            .map(|a| 1.0 - self.individual_survivability(a.id))
            .collect();
        for (agent, fault) in self.agents.iter_mut().zip(updates) {
            agent.overload_fault = fault;
        }
    }

    /// Neighbors of `agent` that share its group.
    pub fn same_group_neighbors(&self, agent: AgentId) -> Vec<Neighbor> {
        let Some(group) = self.agent(agent).map(|a| a.group) else {
            return Vec::new();
        };
        self.topology
            .neighbors(agent)
            .into_iter()
            .filter(|n| n.id != agent && self.agent(n.id).is_some_and(|a| a.group == group))
            .collect()
    }

    /// The largest task held by `agent`; the earliest wins ties.
    pub fn largest_task(&self, agent: AgentId) -> Option<TaskId> {
        let a = self.agent(agent)?;
        let mut best: Option<(TaskId, f64)> = None;
        for &task in &a.tasks {
            let size = self.task_size(task);
            if best.is_none_or(|(_, s)| size > s) {
                best = Some((task, size));
            }
        }
        best.map(|(task, _)| task)
    }

    /// Give an unowned task to `agent`, updating agent and group load.
    pub fn assign_task(&mut self, task: TaskId, agent: AgentId) -> Result<()> {
        let size = self
            .tasks
            .get(&task)
            .map(|t| t.size)
            .ok_or(KernelError::UnknownTask { agent, task })?;
        if let Some(&owner) = self.owners.get(&task) {
            return Err(KernelError::TaskAlreadyOwned {
                task,
                owner,
                claimant: agent,
            });
        }
        let a = self.agent_mut(agent).ok_or(KernelError::UnknownAgent(agent))?;
        a.tasks.push(task);
        a.load += size;
        let group = a.group;
        if let Some(g) = self.groups.get_mut(&group) {
            g.load += size;
        }
        self.owners.insert(task, agent);
        self.pending.retain(|&t| t != task);
        Ok(())
    }

    /// Move `task` from `from` to `to` atomically.
    ///
    /// Both task lists and loads change together; group loads change only
    /// when the endpoints sit in different groups.
    pub fn transfer_task(
        &mut self,
        task: TaskId,
        from: AgentId,
        to: AgentId,
    ) -> Result<MigrationRecord> {
        let size = self
            .tasks
            .get(&task)
            .map(|t| t.size)
            .ok_or(KernelError::UnknownTask { agent: from, task })?;
        let to_group = self.require_agent(to)?.group;
        let source = self.agent_mut(from).ok_or(KernelError::UnknownAgent(from))?;
        let Some(pos) = source.tasks.iter().position(|&t| t == task) else {
            return Err(KernelError::TaskNotOwned { task, agent: from });
        };
        source.tasks.remove(pos);
        source.load -= size;
        let from_group = source.group;

        if let Some(dest) = self.agent_mut(to) {
            dest.tasks.push(task);
            dest.load += size;
        }

        if from_group != to_group {
            if let Some(g) = self.groups.get_mut(&from_group) {
                g.load -= size;
            }
            if let Some(g) = self.groups.get_mut(&to_group) {
                g.load += size;
            }
        }

        self.owners.insert(task, to);
        Ok(MigrationRecord { task, from, to })
    }

    /// Check that every owned task sits in exactly one task list and that
    /// agent and group loads match their tasks.
    pub fn check_consistency(&self) -> std::result::Result<(), String> {
        let mut seen: HashMap<TaskId, AgentId> = HashMap::new();
        for agent in &self.agents {
            let mut load = 0.0;
            for &task in &agent.tasks {
                if let Some(other) = seen.insert(task, agent.id) {
                    return Err(format!(
                        "task {task} held by both agent {other} and agent {}",
                        agent.id
                    ));
                }
                if self.owners.get(&task) != Some(&agent.id) {
                    return Err(format!("task {task} owner index disagrees with agent {}", agent.id));
                }
                load += self.task_size(task);
            }
            if (load - agent.load).abs() > LOAD_EPSILON {
                return Err(format!(
                    "agent {} load {} differs from task sum {load}",
                    agent.id, agent.load
                ));
            }
        }
        if seen.len() != self.owners.len() {
            return Err("owner index lists tasks held by no agent".into());
        }
        for group in self.groups.values() {
            let load: f64 = group
                .members
                .iter()
                .filter_map(|&id| self.agent(id))
                .map(|a| a.load)
                .sum();
            if (load - group.load).abs() > LOAD_EPSILON {
                return Err(format!(
                    "group {} load {} differs from member sum {load}",
                    group.id, group.load
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_with(id: AgentId, group: GroupId, tasks: Vec<TaskId>) -> Agent {
        let mut agent = Agent::new(id, 10.0, group);
        agent.tasks = tasks;
        agent
    }

    fn two_group_context() -> SimulationContext {
        let tasks = vec![
            Task::pre_assigned(1, 4.0),
            Task::pre_assigned(2, 6.0),
            Task::pre_assigned(3, 1.0),
            Task::new(4, 2.0, 7),
        ];
        let agents = vec![
            agent_with(10, 0, vec![1, 2]),
            agent_with(11, 0, vec![]),
            agent_with(20, 1, vec![3]),
        ];
        let topology = NetworkTopology::from_edges([(10, 11, 1.0), (11, 20, 2.0)]).unwrap();
        SimulationContext::from_parts(MigrationConfig::default(), tasks, agents, topology).unwrap()
    }

    #[test]
    fn test_from_parts_derives_loads() {
        let ctx = two_group_context();
        assert_eq!(ctx.agent(10).unwrap().load, 10.0);
        assert_eq!(ctx.group(0).unwrap().load, 10.0);
        assert_eq!(ctx.group(0).unwrap().capacity, 20.0);
        assert_eq!(ctx.group(1).unwrap().members, vec![20]);
        assert_eq!(ctx.pending_tasks(), &[4]);
        assert!(ctx.check_consistency().is_ok());
    }

    #[test]
    fn test_unknown_task_is_rejected() {
        let err = SimulationContext::from_parts(
            MigrationConfig::default(),
            vec![],
            vec![agent_with(1, 0, vec![99])],
            NetworkTopology::new(),
        )
        .unwrap_err();
        assert_eq!(err, KernelError::UnknownTask { agent: 1, task: 99 });
    }

    #[test]
    fn test_unknown_edge_endpoint_is_rejected() {
        let topology = NetworkTopology::from_edges([(1, 2, 1.0)]).unwrap();
        let err = SimulationContext::from_parts(
            MigrationConfig::default(),
            vec![],
            vec![agent_with(1, 0, vec![])],
            topology,
        )
        .unwrap_err();
        assert!(matches!(err, KernelError::UnknownEdgeEndpoint { missing: 2, .. }));
    }

    #[test]
    fn test_shared_task_is_rejected() {
        let err = SimulationContext::from_parts(
            MigrationConfig::default(),
            vec![Task::pre_assigned(1, 1.0)],
            vec![agent_with(1, 0, vec![1]), agent_with(2, 0, vec![1])],
            NetworkTopology::new(),
        )
        .unwrap_err();
        assert!(matches!(err, KernelError::TaskAlreadyOwned { task: 1, owner: 1, claimant: 2 }));
    }

    #[test]
    fn test_transfer_within_group_keeps_group_load() {
        let mut ctx = two_group_context();
        let record = ctx.transfer_task(2, 10, 11).unwrap();
        assert_eq!(record, MigrationRecord { task: 2, from: 10, to: 11 });
        assert_eq!(ctx.agent(10).unwrap().load, 4.0);
        assert_eq!(ctx.agent(11).unwrap().load, 6.0);
        assert_eq!(ctx.group(0).unwrap().load, 10.0);
        assert_eq!(ctx.owner_of(2), Some(11));
        assert!(ctx.check_consistency().is_ok());
    }

    #[test]
    fn test_transfer_across_groups_moves_group_load() {
        let mut ctx = two_group_context();
        let before = ctx.total_load();
        ctx.transfer_task(1, 10, 20).unwrap();
        assert_eq!(ctx.group(0).unwrap().load, 6.0);
        assert_eq!(ctx.group(1).unwrap().load, 5.0);
        assert_eq!(ctx.total_load(), before);
        assert!(ctx.check_consistency().is_ok());
    }

    #[test]
    fn test_transfer_requires_ownership() {
        let mut ctx = two_group_context();
        let err = ctx.transfer_task(3, 10, 11).unwrap_err();
        assert_eq!(err, KernelError::TaskNotOwned { task: 3, agent: 10 });
        assert!(ctx.check_consistency().is_ok());
    }

    #[test]
    fn test_largest_task_prefers_first_on_ties() {
        let tasks = vec![
            Task::pre_assigned(1, 5.0),
            Task::pre_assigned(2, 5.0),
            Task::pre_assigned(3, 2.0),
        ];
        let ctx = SimulationContext::from_parts(
            MigrationConfig::default(),
            tasks,
            vec![agent_with(1, 0, vec![3, 1, 2])],
            NetworkTopology::new(),
        )
        .unwrap();
        assert_eq!(ctx.largest_task(1), Some(1));
    }

    #[test]
    fn test_same_group_neighbors_skip_other_groups() {
        let ctx = two_group_context();
        let ids: Vec<AgentId> = ctx.same_group_neighbors(11).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![10]);
    }
}
