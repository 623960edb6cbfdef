//! Initialization: registries, initial greedy assignment and fault injection.
//!
//! All randomness is drawn from a `ChaCha8Rng` seeded from the configuration,
//! so two runs over the same scenario start from identical states.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::config::MigrationConfig;
use crate::context::SimulationContext;
use crate::error::Result;
use crate::model::{AgentId, TaskId};
use crate::scenario::{AgentSpec, Scenario};

/// Builds the initial simulation state from a scenario.
#[derive(Debug, Clone)]
pub struct Initializer {
    config: MigrationConfig,
}

impl Initializer {
    pub fn new(config: MigrationConfig) -> Self {
        Self { config }
    }

    /// Validate the scenario, assign pre-assigned tasks, draw interaction
    /// levels and inject faults.
    pub fn run(&self, scenario: Scenario) -> Result<SimulationContext> {
        let topology = scenario.topology()?;
        let agents = scenario
            .agents
            .into_iter()
            .map(AgentSpec::into_agent)
            .collect();
        let mut ctx =
            SimulationContext::from_parts(self.config.clone(), scenario.tasks, agents, topology)?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let assigned = assign_initial_tasks(&mut ctx)?;
        assign_interaction_levels(&mut ctx, &mut rng);
        let faulty = inject_faults(&mut ctx);

        info!(
            agents = ctx.agents().len(),
            groups = ctx.group_ids().len(),
            assigned,
            faulty = faulty.len(),
            pending = ctx.pending_tasks().len(),
            "Initialized simulation"
        );
        Ok(ctx)
    }
}

/// Assign every unowned pre-assigned task, largest first.
///
/// Agents are seeded one task each in descending capacity order; after that
/// each task goes to the agent with the lowest load/capacity ratio, earliest
/// pushed first on ties. Agents without capacity never receive work.
/// Returns the number of tasks assigned.
pub fn assign_initial_tasks(ctx: &mut SimulationContext) -> Result<usize> {
    let mut queue: Vec<(TaskId, f64)> = ctx
        .pending_tasks()
        .iter()
        .filter_map(|&id| ctx.task(id))
        .filter(|t| t.is_pre_assigned())
        .map(|t| (t.id, t.size))
        .collect();
    queue.sort_by(|a, b| b.1.total_cmp(&a.1));
    let mut queue = queue.into_iter().map(|(id, _)| id);

    let mut eligible: Vec<(AgentId, f64)> = ctx
        .agents()
        .iter()
        .filter(|a| {
            if !a.has_capacity() {
                warn!(agent = a.id, "Skipping zero-capacity agent in initial assignment");
            }
            a.has_capacity()
        })
        .map(|a| (a.id, a.capacity))
        .collect();
    eligible.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut heap = BinaryHeap::new();
    let mut seq = 0usize;
    let mut assigned = 0usize;

    for (agent, _) in eligible {
        if let Some(task) = queue.next() {
            ctx.assign_task(task, agent)?;
            assigned += 1;
        }
        heap.push(LoadEntry::new(ctx, agent, seq));
        seq += 1;
    }

    for task in queue.by_ref() {
        let Some(entry) = heap.pop() else {
            warn!(task, "No agent can take pre-assigned task");
            continue;
        };
        ctx.assign_task(task, entry.agent)?;
        assigned += 1;
        heap.push(LoadEntry::new(ctx, entry.agent, seq));
        seq += 1;
    }

    debug!(assigned, "Initial assignment complete");
    Ok(assigned)
}

/// Draw each group's interaction level: 0.1 or 0.2 with equal odds.
pub fn assign_interaction_levels(ctx: &mut SimulationContext, rng: &mut impl Rng) {
    for id in ctx.group_ids() {
        let level = if rng.random_bool(0.5) { 0.2 } else { 0.1 };
        if let Some(group) = ctx.group_mut(id) {
            group.interaction_level = level;
        }
    }
}

/// Mark agents on a fixed stride as functionally faulty and refresh every
/// agent's overload-fault probability.
///
/// With `n` agents, `max(1, floor(n * fault_fraction))` faults are spread with
/// stride `n / fault_count`; the agent at position `i` fails when
/// `i mod stride == 1 mod stride`, stopping once `fault_count` agents are
/// marked. A faulty agent's capacity leaves its group.
/// Returns the faulty agents.
pub fn inject_faults(ctx: &mut SimulationContext) -> Vec<AgentId> {
    let ids = ctx.agent_ids();
    let n = ids.len();
    if n == 0 {
        return Vec::new();
    }
    let fault_count = ((n as f64 * ctx.config.fault_fraction) as usize).max(1);
    let stride = (n / fault_count).max(1);

    let mut faulty = Vec::new();
    for (i, &id) in ids.iter().enumerate() {
        if faulty.len() == fault_count {
            break;
        }
        if i % stride != 1 % stride {
            continue;
        }
        let Some(agent) = ctx.agent_mut(id) else {
            continue;
        };
        if agent.functional_fault {
            continue;
        }
        agent.functional_fault = true;
        let (group, capacity) = (agent.group, agent.capacity);
        if let Some(g) = ctx.group_mut(group) {
            g.capacity -= capacity;
        }
        faulty.push(id);
    }

    ctx.refresh_overload_faults();
    debug!(?faulty, stride, "Injected functional faults");
    faulty
}

/// Min-heap entry keyed by load ratio, then push order.
#[derive(Debug, Clone, Copy)]
struct LoadEntry {
    ratio: f64,
    seq: usize,
    agent: AgentId,
}

impl LoadEntry {
    fn new(ctx: &SimulationContext, agent: AgentId, seq: usize) -> Self {
        let ratio = ctx.agent(agent).map(|a| a.load_ratio()).unwrap_or(f64::INFINITY);
        Self { ratio, seq, agent }
    }
}

impl PartialEq for LoadEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LoadEntry {}

impl PartialOrd for LoadEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LoadEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .ratio
            .total_cmp(&self.ratio)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
