//! Small hand-built contexts shared by unit tests.

use crate::config::MigrationConfig;
use crate::context::SimulationContext;
use crate::model::{Agent, AgentId, GroupId, Task, TaskId};
use crate::topology::NetworkTopology;

/// Build a context from `(id, capacity, group)` agents, `(owner, size)`
/// holdings (task ids are assigned from 1 in order) and weighted edges.
pub fn context(
    agents: &[(AgentId, f64, GroupId)],
    holdings: &[(AgentId, f64)],
    edges: &[(AgentId, AgentId, f64)],
) -> SimulationContext {
    context_with(MigrationConfig::default(), agents, holdings, edges)
}

pub fn context_with(
    config: MigrationConfig,
    agents: &[(AgentId, f64, GroupId)],
    holdings: &[(AgentId, f64)],
    edges: &[(AgentId, AgentId, f64)],
) -> SimulationContext {
    let mut tasks = Vec::new();
    let mut built: Vec<Agent> = agents
        .iter()
        .map(|&(id, capacity, group)| Agent::new(id, capacity, group))
        .collect();
    for (i, &(owner, size)) in holdings.iter().enumerate() {
        let task = (i + 1) as TaskId;
        tasks.push(Task::pre_assigned(task, size));
        built
            .iter_mut()
            .find(|a| a.id == owner)
            .expect("holding names a listed agent")
            .tasks
            .push(task);
    }
    let mut topology = NetworkTopology::from_edges(edges.iter().copied()).expect("valid edges");
    for &(id, _, _) in agents {
        topology.add_agent(id);
    }
    SimulationContext::from_parts(config, tasks, built, topology).expect("consistent fixture")
}

/// Flag `agent` as functionally faulty and drop its capacity from its group.
pub fn mark_faulty(ctx: &mut SimulationContext, agent: AgentId) {
    let a = ctx.agent_mut(agent).expect("known agent");
    a.functional_fault = true;
    let (group, capacity) = (a.group, a.capacity);
    ctx.group_mut(group).expect("known group").capacity -= capacity;
}
