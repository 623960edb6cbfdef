//! Error types for the migration kernel.
//!
//! Only input inconsistencies and misconfiguration are errors. Disconnected
//! agents, leaderless groups and zero-capacity agents are recovered in place
//! and surface through logs and the run outcome instead.

use thiserror::Error;

use crate::model::{AgentId, TaskId};

/// Result alias used throughout the kernel.
pub type Result<T> = std::result::Result<T, KernelError>;

/// Errors raised by the kernel.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KernelError {
    /// An operation referenced an agent that is not registered.
    #[error("unknown agent {0}")]
    UnknownAgent(AgentId),

    /// An agent referenced a task absent from the master task list.
    #[error("agent {agent} references unknown task {task}")]
    UnknownTask { agent: AgentId, task: TaskId },

    /// A topology edge names an agent that is not registered.
    #[error("edge ({from}, {to}) references unknown agent {missing}")]
    UnknownEdgeEndpoint {
        from: AgentId,
        to: AgentId,
        missing: AgentId,
    },

    #[error("agent {0} is registered twice")]
    DuplicateAgent(AgentId),

    #[error("task {0} is registered twice")]
    DuplicateTask(TaskId),

    /// A task was claimed by a second agent.
    #[error("task {task} is owned by agent {owner} and cannot also be owned by agent {claimant}")]
    TaskAlreadyOwned {
        task: TaskId,
        owner: AgentId,
        claimant: AgentId,
    },

    /// A transfer named a source agent that does not hold the task.
    #[error("task {task} is not owned by agent {agent}")]
    TaskNotOwned { task: TaskId, agent: AgentId },

    #[error("edge ({from}, {to}) has invalid weight {weight}")]
    InvalidEdgeWeight { from: AgentId, to: AgentId, weight: f64 },

    #[error("malformed scenario: {0}")]
    MalformedScenario(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl KernelError {
    /// True for errors describing inconsistent input data rather than configuration.
    pub fn is_input_inconsistency(&self) -> bool {
        !matches!(self, KernelError::InvalidConfig(_))
    }
}
