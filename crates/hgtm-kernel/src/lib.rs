//! HGTM Kernel: Hierarchical Group Task Migration
//!
//! This crate simulates fault-tolerant task migration across agents that are
//! partitioned into groups and connected by a weighted communication graph.
//! Each group elects a leader by centrality and survivability and keeps a few
//! standbys. When agents fail, their tasks move first between groups (toward
//! the leader of the least loaded group) and then within groups by following
//! the descent of a potential field built from contextual load and fault
//! density.
//!
//! The whole pipeline is single-threaded and deterministic for a given seed.

pub mod bag;
pub mod config;
pub mod context;
pub mod contextual;
pub mod error;
pub mod evaluator;
pub mod initializer;
pub mod kernel;
pub mod leadership;
pub mod migration;
pub mod model;
pub mod potential;
pub mod scenario;
pub mod survivability;
pub mod topology;

#[cfg(test)]
mod fixtures;

pub use bag::{Bag, BagAssignment, BagFormation, BagPlan};
pub use config::{CostWeights, FieldConfig, MigrationConfig, PathPenalties, SurvivabilityConfig};
pub use context::SimulationContext;
pub use contextual::ContextualLoadEstimator;
pub use error::{KernelError, Result};
pub use evaluator::{Evaluator, ExperimentResult, ScenarioStats};
pub use initializer::Initializer;
pub use kernel::{run_scenario, Simulation, SimulationOutcome};
pub use leadership::{
    BackupLeaderSelector, FailoverEvent, LeaderElection, LeaderFailover, LeaderScoring,
};
pub use migration::{MigrationOutcome, TaskMigrationEngine};
pub use model::{Agent, AgentId, Group, GroupId, MigrationRecord, Task, TaskId};
pub use potential::{FieldSnapshot, PotentialField, PotentialFieldCalculator};
pub use scenario::{AgentSpec, EdgeSpec, Scenario};
pub use survivability::{saturate, SurvivabilityModel};
pub use topology::{Neighbor, NetworkTopology};
