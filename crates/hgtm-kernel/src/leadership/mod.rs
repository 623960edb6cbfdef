//! Group leadership: election, standby selection and failover.
//!
//! Leaders anchor the hierarchy. Inter-group migration targets leaders, and
//! the contextual load charges every agent its distance to its leader.

use std::collections::HashMap;

use crate::context::SimulationContext;
use crate::model::{AgentId, GroupId};

pub mod backup;
pub mod election;
pub mod failover;

pub use backup::BackupLeaderSelector;
pub use election::{LeaderElection, LeaderScoring};
pub use failover::{FailoverEvent, LeaderFailover};

/// Weighted betweenness centrality over a group's induced subgraph.
pub fn group_centrality(ctx: &SimulationContext, group: GroupId) -> HashMap<AgentId, f64> {
    let Some(group) = ctx.group(group) else {
        return HashMap::new();
    };
    ctx.topology
        .induced_subgraph(&group.members)
        .betweenness_centrality()
}

/// Importance of a standby candidate: `(centrality + 1) / (1 - survivability)`.
///
/// A fully survivable agent would divide by zero; the denominator is floored
/// at machine epsilon instead.
pub fn importance(centrality: f64, survivability: f64) -> f64 {
    (centrality + 1.0) / (1.0 - survivability).max(f64::EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_importance_grows_with_survivability() {
        assert!(importance(0.0, 0.9) > importance(0.0, 0.5));
        assert!(importance(0.5, 0.5) > importance(0.0, 0.5));
        assert!(importance(0.0, 1.0).is_finite());
    }
}
