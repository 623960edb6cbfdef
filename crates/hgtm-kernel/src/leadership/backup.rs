//! Standby leader selection.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::{debug, info};

use super::{group_centrality, importance};
use crate::context::SimulationContext;
use crate::model::{AgentId, GroupId};

/// Keeps the `backup_count` most important members of each group on standby.
pub struct BackupLeaderSelector;

impl BackupLeaderSelector {
    /// Select standbys for every group. Returns the total number selected.
    pub fn run(ctx: &mut SimulationContext) -> usize {
        let mut total = 0;
        for id in ctx.group_ids() {
            let backups = Self::select(ctx, id);
            debug!(group = id, ?backups, "Selected backup leaders");
            total += backups.len();
            if let Some(group) = ctx.group_mut(id) {
                group.backups = backups;
            }
        }
        info!(total, "Backup leader selection complete");
        total
    }

    /// The top-`backup_count` members of `group` by [`score`](Self::score),
    /// best first. The leader and faulty members are never selected.
    pub fn select(ctx: &SimulationContext, group: GroupId) -> Vec<AgentId> {
        let capacity = ctx.config.backup_count;
        let Some(g) = ctx.group(group) else {
            return Vec::new();
        };
        if capacity == 0 {
            return Vec::new();
        }

        let centrality = group_centrality(ctx, group);
        let distances = g
            .leader
            .map(|leader| ctx.topology.distances_from(leader))
            .unwrap_or_default();
        let penalty = ctx.config.penalties.backup_distance;

        let mut heap: BinaryHeap<Standby> = BinaryHeap::with_capacity(capacity + 1);
        for (seq, &id) in g.members.iter().enumerate() {
            if Some(id) == g.leader {
                continue;
            }
            let Some(agent) = ctx.agent(id) else {
                continue;
            };
            if agent.functional_fault {
                continue;
            }
            let bc = centrality.get(&id).copied().unwrap_or(0.0);
            let distance = distances.get(&id).copied().unwrap_or(penalty);
            let score = importance(bc, agent.survival()) * distance;

            let candidate = Standby { score, seq, agent: id };
            if heap.len() < capacity {
                heap.push(candidate);
            } else if heap.peek().is_some_and(|min| score > min.score) {
                heap.pop();
                heap.push(candidate);
            }
        }

        let mut selected = heap.into_vec();
        selected.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.seq.cmp(&b.seq)));
        selected.into_iter().map(|s| s.agent).collect()
    }

    /// Importance of `agent` as a standby for its group's current leader,
    /// or negative infinity when it is faulty.
    pub fn score(ctx: &SimulationContext, agent: AgentId) -> f64 {
        let Some(a) = ctx.agent(agent) else {
            return f64::NEG_INFINITY;
        };
        if a.functional_fault {
            return f64::NEG_INFINITY;
        }
        let bc = group_centrality(ctx, a.group)
            .get(&agent)
            .copied()
            .unwrap_or(0.0);
        let distance = ctx
            .group(a.group)
            .and_then(|g| g.leader)
            .and_then(|leader| ctx.topology.shortest_path_length(leader, agent))
            .unwrap_or(ctx.config.penalties.backup_distance);
        importance(bc, a.survival()) * distance
    }
}

/// Heap entry; the top of the heap is the weakest standby (lowest score,
/// latest member on ties).
#[derive(Debug, Clone, Copy)]
struct Standby {
    score: f64,
    seq: usize,
    agent: AgentId,
}

impl PartialEq for Standby {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Standby {}

impl PartialOrd for Standby {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Standby {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MigrationConfig;
    use crate::fixtures::{context, context_with, mark_faulty};

    /// Path 1-2-3-4-5 with the leader at one end.
    fn path_group() -> SimulationContext {
        let mut ctx = context(
            &[
                (1, 10.0, 0),
                (2, 10.0, 0),
                (3, 10.0, 0),
                (4, 10.0, 0),
                (5, 10.0, 0),
            ],
            &[(2, 5.0), (3, 5.0), (4, 5.0), (5, 5.0)],
            &[(1, 2, 1.0), (2, 3, 1.0), (3, 4, 1.0), (4, 5, 1.0)],
        );
        ctx.group_mut(0).unwrap().leader = Some(1);
        for id in 1..=5 {
            let fault = 1.0 - ctx.individual_survivability(id);
            ctx.agent_mut(id).unwrap().overload_fault = fault;
        }
        ctx
    }

    #[test]
    fn test_keeps_top_two_best_first() {
        let ctx = path_group();
        let scores: Vec<f64> = (2..=5).map(|id| BackupLeaderSelector::score(&ctx, id)).collect();
        let backups = BackupLeaderSelector::select(&ctx, 0);
        assert_eq!(backups.len(), 2);
        assert!(!backups.contains(&1));

        let mut ranked: Vec<(AgentId, f64)> = (2..=5).zip(scores).collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        assert_eq!(backups, vec![ranked[0].0, ranked[1].0]);
    }

    #[test]
    fn test_faulty_members_never_selected() {
        let mut ctx = path_group();
        mark_faulty(&mut ctx, 3);
        mark_faulty(&mut ctx, 4);
        assert_eq!(BackupLeaderSelector::score(&ctx, 3), f64::NEG_INFINITY);
        let backups = BackupLeaderSelector::select(&ctx, 0);
        assert!(!backups.contains(&3) && !backups.contains(&4));
        assert_eq!(backups.len(), 2);
    }

    #[test]
    fn test_unreachable_member_gets_distance_penalty() {
        let mut ctx = context(
            &[(1, 10.0, 0), (2, 10.0, 0), (3, 10.0, 0)],
            &[(2, 10.0), (3, 10.0)],
            &[(1, 2, 1.0)],
        );
        ctx.group_mut(0).unwrap().leader = Some(1);
        for id in [2, 3] {
            let fault = 1.0 - ctx.individual_survivability(id);
            ctx.agent_mut(id).unwrap().overload_fault = fault;
        }
        assert!(BackupLeaderSelector::score(&ctx, 3) > BackupLeaderSelector::score(&ctx, 2));
        assert_eq!(BackupLeaderSelector::select(&ctx, 0), vec![3, 2]);
    }

    #[test]
    fn test_zero_backup_count_selects_nobody() {
        let config = MigrationConfig {
            backup_count: 0,
            ..MigrationConfig::default()
        };
        let mut ctx = context_with(config, &[(1, 10.0, 0), (2, 10.0, 0)], &[], &[(1, 2, 1.0)]);
        ctx.group_mut(0).unwrap().leader = Some(1);
        assert_eq!(BackupLeaderSelector::run(&mut ctx), 0);
        assert!(ctx.group(0).unwrap().backups.is_empty());
    }
}
