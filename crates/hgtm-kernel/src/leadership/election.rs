//! Leader election by centrality and survivability.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::group_centrality;
use crate::config::CostWeights;
use crate::context::SimulationContext;
use crate::error::Result;
use crate::model::{AgentId, GroupId};

/// How betweenness centrality and survivability combine into a leader score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderScoring {
    /// `a * centrality + b * survivability`
    #[default]
    Additive,
    /// `a * centrality * b * survivability`
    Multiplicative,
}

impl LeaderScoring {
    pub fn score(self, weights: CostWeights, centrality: f64, survivability: f64) -> f64 {
        match self {
            Self::Additive => weights.a * centrality + weights.b * survivability,
            Self::Multiplicative => weights.a * centrality * weights.b * survivability,
        }
    }
}

/// Elects one leader per group and links the leaders into a clique.
pub struct LeaderElection;

impl LeaderElection {
    /// Elect a leader for every group that has none, then add the leader
    /// clique. Returns the number of leaders elected.
    pub fn run(ctx: &mut SimulationContext) -> Result<usize> {
        let mut elected = 0;
        for id in ctx.group_ids() {
            if ctx.group(id).is_some_and(|g| g.leader.is_some()) {
                continue;
            }
            let leader = Self::elect(ctx, id);
            if let Some(group) = ctx.group_mut(id) {
                group.leader = leader;
            }
            if let Some(leader) = leader {
                debug!(group = id, leader, "Elected leader");
                elected += 1;
            }
        }

        let links = Self::link_leaders(ctx)?;
        info!(elected, links, "Leader election complete");
        Ok(elected)
    }

    /// Best-scoring member of `group`, first in member order on ties.
    ///
    /// Faulty members stand like any other; a faulty winner is replaced
    /// later by [`LeaderFailover`](super::LeaderFailover).
    pub fn elect(ctx: &SimulationContext, group: GroupId) -> Option<AgentId> {
        let members = &ctx.group(group)?.members;
        let centrality = group_centrality(ctx, group);

        let scoring = ctx.config.leader_scoring;
        let mut best: Option<(AgentId, f64)> = None;
        for &id in members {
            let bc = centrality.get(&id).copied().unwrap_or(0.0);
            let score = scoring.score(ctx.config.weights, bc, ctx.individual_survivability(id));
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((id, score));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Connect every pair of leaders not already adjacent. Returns the
    /// number of edges added.
    pub fn link_leaders(ctx: &mut SimulationContext) -> Result<usize> {
        let leaders: Vec<AgentId> = ctx.groups().filter_map(|g| g.leader).collect();
        let weight = ctx.config.leader_link_weight;
        let mut added = 0;
        for (i, &a) in leaders.iter().enumerate() {
            for &b in &leaders[i + 1..] {
                if ctx.topology.add_edge(a, b, weight)? {
                    added += 1;
                }
            }
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MigrationConfig;
    use crate::fixtures::{context, context_with, mark_faulty};

    #[test]
    fn test_scoring_variants() {
        let w = CostWeights { a: 0.5, b: 0.5 };
        assert!((LeaderScoring::Additive.score(w, 0.4, 0.8) - 0.6).abs() < 1e-12);
        assert!((LeaderScoring::Multiplicative.score(w, 0.4, 0.8) - 0.08).abs() < 1e-12);
    }

    #[test]
    fn test_star_center_wins() {
        let ctx = context(
            &[(1, 10.0, 0), (2, 10.0, 0), (3, 10.0, 0), (4, 10.0, 0)],
            &[],
            &[(2, 1, 1.0), (3, 1, 1.0), (4, 1, 1.0)],
        );
        assert_eq!(LeaderElection::elect(&ctx, 0), Some(1));
    }

    #[test]
    fn test_ties_go_to_first_member() {
        let ctx = context(&[(5, 10.0, 0), (6, 10.0, 0)], &[], &[(5, 6, 1.0)]);
        assert_eq!(LeaderElection::elect(&ctx, 0), Some(5));
    }

    #[test]
    fn test_faulty_central_member_still_wins() {
        let mut ctx = context(
            &[(1, 10.0, 0), (2, 10.0, 0), (3, 10.0, 0)],
            &[],
            &[(1, 2, 1.0), (1, 3, 1.0)],
        );
        mark_faulty(&mut ctx, 1);
        assert_eq!(LeaderElection::elect(&ctx, 0), Some(1));

        mark_faulty(&mut ctx, 2);
        mark_faulty(&mut ctx, 3);
        assert_eq!(LeaderElection::elect(&ctx, 0), Some(1));
    }

    #[test]
    fn test_multiplicative_prefers_central_member() {
        let config = MigrationConfig {
            leader_scoring: LeaderScoring::Multiplicative,
            ..MigrationConfig::default()
        };
        let ctx = context_with(
            config,
            &[(1, 10.0, 0), (2, 10.0, 0), (3, 10.0, 0)],
            &[],
            &[(1, 2, 1.0), (2, 3, 1.0)],
        );
        assert_eq!(LeaderElection::elect(&ctx, 0), Some(2));
    }

    #[test]
    fn test_run_links_leaders() {
        let mut ctx = context(
            &[(1, 10.0, 0), (2, 10.0, 0), (3, 10.0, 1), (4, 10.0, 2)],
            &[],
            &[(1, 2, 1.0)],
        );
        assert_eq!(LeaderElection::run(&mut ctx).unwrap(), 3);
        let leaders: Vec<AgentId> = ctx.groups().filter_map(|g| g.leader).collect();
        assert_eq!(leaders, vec![1, 3, 4]);
        assert_eq!(ctx.topology.edge_weight(1, 3), Some(1.0));
        assert_eq!(ctx.topology.edge_weight(3, 4), Some(1.0));
        assert_eq!(ctx.topology.edge_weight(1, 4), Some(1.0));

        // a second run elects nobody and adds nothing
        assert_eq!(LeaderElection::run(&mut ctx).unwrap(), 0);
        assert_eq!(ctx.topology.edge_count(), 4);
    }
}
