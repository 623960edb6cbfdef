//! Core entities: agents, tasks, groups and migration records.

use serde::{Deserialize, Serialize};

/// Stable identifier of an agent.
pub type AgentId = u32;

/// Identifier of a group (a fixed partition of agents).
pub type GroupId = u32;

/// Identifier of a task.
pub type TaskId = u32;

/// A unit of work. Immutable apart from which agent owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Size in load units (positive)
    pub size: f64,
    /// Arrival time; `-1` marks a task assigned at initialization
    pub arrival_time: i64,
}

impl Task {
    /// Arrival time reserved for tasks assigned before the run starts.
    pub const PRE_ASSIGNED: i64 = -1;

    pub fn new(id: TaskId, size: f64, arrival_time: i64) -> Self {
        Self {
            id,
            size,
            arrival_time,
        }
    }

    /// A task that takes part in the initial assignment.
    pub fn pre_assigned(id: TaskId, size: f64) -> Self {
        Self::new(id, size, Self::PRE_ASSIGNED)
    }

    pub fn is_pre_assigned(&self) -> bool {
        self.arrival_time == Self::PRE_ASSIGNED
    }
}

/// A work-performing entity.
///
/// `load` always equals the summed size of `tasks` between migrations; only
/// the context mutates either, and always both together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub capacity: f64,
    pub load: f64,
    pub group: GroupId,
    /// Owned tasks in arrival order
    pub tasks: Vec<TaskId>,
    /// Non-operational; every task must leave this agent
    pub functional_fault: bool,
    /// Probability of failing from overload, in [0, 1]
    pub overload_fault: f64,
}

impl Agent {
    pub fn new(id: AgentId, capacity: f64, group: GroupId) -> Self {
        Self {
            id,
            capacity,
            load: 0.0,
            group,
            tasks: Vec::new(),
            functional_fault: false,
            overload_fault: 0.0,
        }
    }

    /// Load relative to capacity.
    ///
    /// A zero-capacity agent reports 0 while idle and infinity once loaded.
    pub fn load_ratio(&self) -> f64 {
        if self.capacity > 0.0 {
            self.load / self.capacity
        } else if self.load > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.capacity > 0.0
    }

    /// Probability this agent keeps working: `(1 - functional) * (1 - overload)`.
    pub fn survival(&self) -> f64 {
        let functional = if self.functional_fault { 1.0 } else { 0.0 };
        (1.0 - functional) * (1.0 - self.overload_fault)
    }
}

/// A partition of agents with one leader and a few standby leaders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    /// Member ids in registration order
    pub members: Vec<AgentId>,
    /// Summed capacity of members not known to be faulty
    pub capacity: f64,
    pub load: f64,
    pub leader: Option<AgentId>,
    /// Standby leaders, best first
    pub backups: Vec<AgentId>,
    /// Cross-group sensitivity in [0, 1]
    pub interaction_level: f64,
}

impl Group {
    pub fn new(id: GroupId) -> Self {
        Self {
            id,
            members: Vec::new(),
            capacity: 0.0,
            load: 0.0,
            leader: None,
            backups: Vec::new(),
            interaction_level: 0.0,
        }
    }

    pub fn contains(&self, agent: AgentId) -> bool {
        self.members.contains(&agent)
    }
}

/// One completed task transfer. Append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub task: TaskId,
    pub from: AgentId,
    pub to: AgentId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_ratio_handles_zero_capacity() {
        let mut agent = Agent::new(1, 0.0, 0);
        assert_eq!(agent.load_ratio(), 0.0);
        agent.load = 3.0;
        assert!(agent.load_ratio().is_infinite());

        let mut agent = Agent::new(2, 10.0, 0);
        agent.load = 4.0;
        assert!((agent.load_ratio() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_faulty_agent_has_zero_survival() {
        let mut agent = Agent::new(1, 10.0, 0);
        agent.overload_fault = 0.25;
        assert!((agent.survival() - 0.75).abs() < 1e-12);
        agent.functional_fault = true;
        assert_eq!(agent.survival(), 0.0);
    }

    #[test]
    fn test_pre_assigned_marker() {
        assert!(Task::pre_assigned(1, 2.0).is_pre_assigned());
        assert!(!Task::new(2, 2.0, 5).is_pre_assigned());
    }
}
