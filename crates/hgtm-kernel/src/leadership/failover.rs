//! Promotion of a standby when a group's leader is faulty.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{group_centrality, importance};
use crate::context::SimulationContext;
use crate::error::Result;
use crate::model::{AgentId, GroupId};

/// One leader replacement, or a group left without a leader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverEvent {
    pub group: GroupId,
    pub previous: AgentId,
    /// `None` when no healthy standby was available
    pub promoted: Option<AgentId>,
}

/// Replaces faulty leaders with their best standby.
pub struct LeaderFailover;

impl LeaderFailover {
    /// Run failover for every group whose leader is faulty.
    pub fn run(ctx: &mut SimulationContext) -> Result<Vec<FailoverEvent>> {
        let mut events = Vec::new();
        for id in ctx.group_ids() {
            let Some(leader) = ctx.group(id).and_then(|g| g.leader) else {
                continue;
            };
            if !ctx.is_faulty(leader) {
                continue;
            }
            events.push(Self::replace(ctx, id, leader)?);
        }
        info!(replaced = events.len(), "Leader failover complete");
        Ok(events)
    }

    fn replace(ctx: &mut SimulationContext, group: GroupId, previous: AgentId) -> Result<FailoverEvent> {
        let backups: Vec<AgentId> = ctx
            .group(group)
            .map(|g| g.backups.clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|&id| !ctx.is_faulty(id))
            .collect();

        let centrality = group_centrality(ctx, group);
        let mut best: Option<(AgentId, f64)> = None;
        for &id in &backups {
            let survival = ctx.agent(id).map(|a| a.survival()).unwrap_or(0.0);
            let score = importance(centrality.get(&id).copied().unwrap_or(0.0), survival);
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((id, score));
            }
        }
        let promoted = best.map(|(id, _)| id);

        if let Some(g) = ctx.group_mut(group) {
            g.leader = promoted;
            g.backups = backups.into_iter().filter(|&id| Some(id) != promoted).collect();
        }

        match promoted {
            Some(leader) => {
                Self::link_into_clique(ctx, leader)?;
                info!(group, previous, leader, "Promoted backup leader");
            }
            None => warn!(group, previous, "Faulty leader has no healthy backup; group is leaderless"),
        }

        Ok(FailoverEvent {
            group,
            previous,
            promoted,
        })
    }

    /// Connect a newly promoted leader to every other group's leader.
    fn link_into_clique(ctx: &mut SimulationContext, leader: AgentId) -> Result<()> {
        let others: Vec<AgentId> = ctx
            .groups()
            .filter_map(|g| g.leader)
            .filter(|&other| other != leader)
            .collect();
        let weight = ctx.config.leader_link_weight;
        for other in others {
            ctx.topology.add_edge(leader, other, weight)?;
        }
        Ok(())
    }
}
