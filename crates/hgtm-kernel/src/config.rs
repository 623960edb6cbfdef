//! Configuration types for the kernel.

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::leadership::LeaderScoring;

/// Top-level migration configuration.
///
/// This defines the cost/survivability trade-off, the leadership structure,
/// and every constant used by the potential-field and evaluation formulas.
/// Loaded from JSON at runtime; missing fields fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Cost vs. survivability weights
    pub weights: CostWeights,

    /// Number of standby leaders kept per group
    pub backup_count: usize,

    /// Fraction of agents given a functional fault at initialization
    pub fault_fraction: f64,

    /// Seed for every random draw made by the kernel
    pub seed: u64,

    /// How centrality and survivability combine during leader election
    pub leader_scoring: LeaderScoring,

    /// Weight of the synthetic edges linking group leaders
    pub leader_link_weight: f64,

    /// Minimum potential descent per unit edge weight for the gradient walk
    pub gradient_threshold: f64,

    /// Contextual loads beyond this magnitude are reset to 1.0
    pub contextual_load_limit: f64,

    /// Survivability curve constants
    pub survivability: SurvivabilityConfig,

    /// Potential-field constants
    pub field: FieldConfig,

    /// Substitutes for missing shortest paths
    pub penalties: PathPenalties,
}

/// Weights `a` (cost) and `b` (survivability). Typically `a + b = 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    pub a: f64,
    pub b: f64,
}

/// Constants of the survivability curves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurvivabilityConfig {
    /// Agent load that maps to the midpoint of the individual curve
    pub load_scale: f64,
    /// Per-member group load that maps to the midpoint of the group curve
    pub group_load_scale: f64,
    /// Lower bound of individual survivability
    pub individual_floor: f64,
    /// Lower bound of group survivability
    pub group_floor: f64,
}

/// Constants of the attractive/repulsive potentials.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    /// Agent-level repulsion gain (`y`)
    pub agent_repulsion: f64,
    /// Group-level attraction gain (`xn`)
    pub group_attraction: f64,
    /// Group-level repulsion gain (`yn`)
    pub group_repulsion: f64,
    /// Finite stand-in for an infinite repulsive potential
    pub sentinel: f64,
}

/// Penalties used when two agents are not connected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathPenalties {
    /// Cost charged for a migration record with no path
    pub migration_cost: f64,
    /// Distance assumed between a leader and an unreachable standby
    pub backup_distance: f64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            weights: CostWeights::default(),
            backup_count: 2,
            fault_fraction: 0.3,
            seed: 42,
            leader_scoring: LeaderScoring::default(),
            leader_link_weight: 1.0,
            gradient_threshold: 0.02,
            contextual_load_limit: 1000.0,
            survivability: SurvivabilityConfig::default(),
            field: FieldConfig::default(),
            penalties: PathPenalties::default(),
        }
    }
}

impl Default for CostWeights {
    fn default() -> Self {
        Self { a: 0.1, b: 0.9 }
    }
}

impl Default for SurvivabilityConfig {
    fn default() -> Self {
        Self {
            load_scale: 60.0,
            group_load_scale: 200.0,
            individual_floor: 0.3,
            group_floor: 0.6,
        }
    }
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            agent_repulsion: 0.005,
            group_attraction: 0.1,
            group_repulsion: 0.3,
            sentinel: 1.0e15,
        }
    }
}

impl Default for PathPenalties {
    fn default() -> Self {
        Self {
            migration_cost: 10.0,
            backup_distance: 100_000.0,
        }
    }
}

impl MigrationConfig {
    /// Parse a configuration from JSON, then validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| KernelError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the formulas cannot work with.
    pub fn validate(&self) -> Result<()> {
        let finite = [
            ("weights.a", self.weights.a),
            ("weights.b", self.weights.b),
            ("gradient_threshold", self.gradient_threshold),
            ("contextual_load_limit", self.contextual_load_limit),
            ("field.agent_repulsion", self.field.agent_repulsion),
            ("field.group_attraction", self.field.group_attraction),
            ("field.group_repulsion", self.field.group_repulsion),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(KernelError::InvalidConfig(format!("{name} must be finite")));
            }
        }

        if !(self.fault_fraction > 0.0 && self.fault_fraction < 1.0) {
            return Err(KernelError::InvalidConfig(format!(
                "fault_fraction must lie in (0, 1), got {}",
                self.fault_fraction
            )));
        }
        if !(self.leader_link_weight.is_finite() && self.leader_link_weight > 0.0) {
            return Err(KernelError::InvalidConfig(
                "leader_link_weight must be positive".into(),
            ));
        }
        if self.gradient_threshold < 0.0 {
            return Err(KernelError::InvalidConfig(
                "gradient_threshold must not be negative".into(),
            ));
        }
        if self.contextual_load_limit <= 0.0 {
            return Err(KernelError::InvalidConfig(
                "contextual_load_limit must be positive".into(),
            ));
        }
        if !(self.field.sentinel.is_finite() && self.field.sentinel > 0.0) {
            return Err(KernelError::InvalidConfig(
                "field.sentinel must be a positive finite value".into(),
            ));
        }
        let s = &self.survivability;
        if s.load_scale <= 0.0 || s.group_load_scale <= 0.0 {
            return Err(KernelError::InvalidConfig(
                "survivability scales must be positive".into(),
            ));
        }
        Ok(())
    }
}
