//! Serializable input contract: tasks, agents and weighted edges.

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::model::{Agent, AgentId, GroupId, Task, TaskId};
use crate::topology::NetworkTopology;

/// An agent as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: AgentId,
    pub capacity: f64,
    pub group: GroupId,
    /// Tasks this agent already holds
    #[serde(default)]
    pub tasks: Vec<TaskId>,
}

/// A weighted undirected edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from: AgentId,
    pub to: AgentId,
    pub weight: f64,
}

/// Everything the kernel consumes for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub tasks: Vec<Task>,
    pub agents: Vec<AgentSpec>,
    pub edges: Vec<EdgeSpec>,
}

impl AgentSpec {
    pub fn new(id: AgentId, capacity: f64, group: GroupId) -> Self {
        Self {
            id,
            capacity,
            group,
            tasks: Vec::new(),
        }
    }

    pub fn into_agent(self) -> Agent {
        let mut agent = Agent::new(self.id, self.capacity, self.group);
        agent.tasks = self.tasks;
        agent
    }
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| KernelError::MalformedScenario(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        // plain structs with numeric fields; serialization cannot fail
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Build the topology, registering every agent even when isolated.
    pub fn topology(&self) -> Result<NetworkTopology> {
        let mut topology = NetworkTopology::new();
        for agent in &self.agents {
            topology.add_agent(agent.id);
        }
        for edge in &self.edges {
            for endpoint in [edge.from, edge.to] {
                if !self.agents.iter().any(|a| a.id == endpoint) {
                    return Err(KernelError::UnknownEdgeEndpoint {
                        from: edge.from,
                        to: edge.to,
                        missing: endpoint,
                    });
                }
            }
            topology.add_edge(edge.from, edge.to, edge.weight)?;
        }
        Ok(topology)
    }

    /// Total size of all tasks.
    pub fn total_task_size(&self) -> f64 {
        self.tasks.iter().map(|t| t.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_roundtrip_keeps_owned_tasks() {
        let json = r#"{
            "tasks": [{ "id": 1, "size": 3.0, "arrival_time": -1 }],
            "agents": [{ "id": 7, "capacity": 10.0, "group": 0, "tasks": [1] },
                       { "id": 8, "capacity": 10.0, "group": 0 }],
            "edges": [{ "from": 7, "to": 8, "weight": 1.5 }]
        }"#;
        let scenario = Scenario::from_json(json).unwrap();
        assert_eq!(scenario.agents[0].tasks, vec![1]);
        assert!(scenario.agents[1].tasks.is_empty());
        assert_eq!(Scenario::from_json(&scenario.to_json()).unwrap(), scenario);
    }

    #[test]
    fn test_topology_rejects_unknown_endpoint() {
        let scenario = Scenario {
            tasks: vec![],
            agents: vec![AgentSpec::new(1, 10.0, 0)],
            edges: vec![EdgeSpec {
                from: 1,
                to: 3,
                weight: 1.0,
            }],
        };
        let err = scenario.topology().unwrap_err();
        assert_eq!(
            err,
            KernelError::UnknownEdgeEndpoint {
                from: 1,
                to: 3,
                missing: 3
            }
        );
    }
}
