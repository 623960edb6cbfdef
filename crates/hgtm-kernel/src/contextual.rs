//! Contextual load: local overload blended with the neighborhood's overload
//! and the communication cost of reaching the group leader.

use std::collections::HashMap;

use crate::context::SimulationContext;
use crate::model::AgentId;

/// Share of the neighborhood term in the contextual load.
const NEIGHBORHOOD_WEIGHT: f64 = 0.1;

/// Computes contextual loads from the current context.
pub struct ContextualLoadEstimator;

impl ContextualLoadEstimator {
    /// Local term `a * load/capacity - b * survivability`.
    pub fn local(ctx: &SimulationContext, agent: AgentId) -> f64 {
        let Some(a) = ctx.agent(agent) else {
            return 0.0;
        };
        let w = ctx.config.weights;
        w.a * a.load_ratio() - w.b * ctx.individual_survivability(agent)
    }

    /// Contextual load of a single agent.
    pub fn estimate(ctx: &SimulationContext, agent: AgentId) -> f64 {
        let leader_distance = ctx
            .group_of(agent)
            .and_then(|g| g.leader)
            .and_then(|leader| ctx.topology.shortest_path_length(leader, agent))
            .unwrap_or(0.0);
        Self::combine(ctx, agent, leader_distance)
    }

    /// Contextual loads of every agent, with one shortest-path pass per leader.
    pub fn estimate_all(ctx: &SimulationContext) -> HashMap<AgentId, f64> {
        let leader_distances: HashMap<AgentId, HashMap<AgentId, f64>> = ctx
            .groups()
            .filter_map(|g| g.leader)
            .map(|leader| (leader, ctx.topology.distances_from(leader)))
            .collect();

        ctx.agents()
            .iter()
            .map(|a| {
                let distance = ctx
                    .group(a.group)
                    .and_then(|g| g.leader)
                    .and_then(|leader| leader_distances.get(&leader))
                    .and_then(|d| d.get(&a.id))
                    .copied()
                    .unwrap_or(0.0);
                (a.id, Self::combine(ctx, a.id, distance))
            })
            .collect()
    }

    /// `f + 0.1 * (domain_f / (degree + 2) + (edge_cost + leader_distance) / (degree + 1))`
    /// where the domain covers same-group neighbors only and the degree counts
    /// every edge. Non-finite results and magnitudes above the configured
    /// limit are reset to 1.0.
    fn combine(ctx: &SimulationContext, agent: AgentId, leader_distance: f64) -> f64 {
        let f = Self::local(ctx, agent);

        let mut domain_f = 0.0;
        let mut cost = 0.0;
        for neighbor in ctx.same_group_neighbors(agent) {
            domain_f += Self::local(ctx, neighbor.id);
            cost += neighbor.weight;
        }
        cost += leader_distance;

        let size = (ctx.topology.degree(agent) + 1) as f64;
        let domain = size + 1.0;
        let value = f + NEIGHBORHOOD_WEIGHT * (domain_f / domain + cost / size);
        clamp(value, ctx.config.contextual_load_limit)
    }
}

/// Reset non-finite values and values outside `[-limit, limit]` to 1.0.
pub fn clamp(value: f64, limit: f64) -> f64 {
    if !value.is_finite() || value.abs() > limit {
        1.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::context;

    #[test]
    fn test_clamp_boundary() {
        assert_eq!(clamp(1000.0, 1000.0), 1000.0);
        assert_eq!(clamp(-1000.0, 1000.0), -1000.0);
        assert_eq!(clamp(1000.5, 1000.0), 1.0);
        assert_eq!(clamp(-2000.0, 1000.0), 1.0);
        assert_eq!(clamp(f64::NAN, 1000.0), 1.0);
        assert_eq!(clamp(f64::INFINITY, 1000.0), 1.0);
    }

    #[test]
    fn test_isolated_idle_agent() {
        let ctx = context(&[(1, 10.0, 0)], &[], &[]);
        // 0.1 * 0 - 0.9 * 1.0, nothing around it
        assert!((ContextualLoadEstimator::estimate(&ctx, 1) + 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_hand_computed_pair() {
        let mut ctx = context(
            &[(1, 10.0, 0), (2, 10.0, 0), (3, 10.0, 1)],
            &[(1, 6.0)],
            &[(1, 2, 2.0), (1, 3, 5.0)],
        );
        ctx.group_mut(0).unwrap().leader = Some(2);

        let f1 = ContextualLoadEstimator::local(&ctx, 1);
        let f2 = ContextualLoadEstimator::local(&ctx, 2);
        // degree 2 (the cross-group edge counts), one same-group neighbor,
        // leader 2 at distance 2
        let expected = f1 + 0.1 * (f2 / 4.0 + (2.0 + 2.0) / 3.0);
        assert!((ContextualLoadEstimator::estimate(&ctx, 1) - expected).abs() < 1e-12);

        let all = ContextualLoadEstimator::estimate_all(&ctx);
        assert!((all[&1] - expected).abs() < 1e-12);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_loaded_zero_capacity_agent_is_clamped() {
        let ctx = context(&[(1, 0.0, 0), (2, 10.0, 0)], &[(1, 3.0)], &[(1, 2, 1.0)]);
        assert_eq!(ContextualLoadEstimator::estimate(&ctx, 1), 1.0);
    }
}
