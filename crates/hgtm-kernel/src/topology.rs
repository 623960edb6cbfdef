//! Weighted undirected communication graph between agents.
//!
//! Edge weights are communication/migration costs. Neighbor iteration follows
//! edge insertion order so every consumer sees the same, reproducible order.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use petgraph::algo::dijkstra;
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use crate::error::{KernelError, Result};
use crate::model::AgentId;

/// An edge as seen from one endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: AgentId,
    pub weight: f64,
}

/// Weighted undirected graph keyed by agent id.
#[derive(Debug, Clone, Default)]
pub struct NetworkTopology {
    graph: UnGraph<AgentId, f64>,
    nodes: HashMap<AgentId, NodeIndex>,
}

impl NetworkTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a topology from `(from, to, weight)` triples.
    pub fn from_edges(edges: impl IntoIterator<Item = (AgentId, AgentId, f64)>) -> Result<Self> {
        let mut topology = Self::new();
        for (from, to, weight) in edges {
            topology.add_edge(from, to, weight)?;
        }
        Ok(topology)
    }

    /// Register an agent as a vertex. Idempotent.
    pub fn add_agent(&mut self, id: AgentId) -> NodeIndex {
        if let Some(&node) = self.nodes.get(&id) {
            return node;
        }
        let node = self.graph.add_node(id);
        self.nodes.insert(id, node);
        node
    }

    /// Add an edge, registering missing endpoints.
    ///
    /// Returns `false` when the edge already existed (its weight is kept) or
    /// is a self loop.
    pub fn add_edge(&mut self, from: AgentId, to: AgentId, weight: f64) -> Result<bool> {
        if !(weight.is_finite() && weight > 0.0) {
            return Err(KernelError::InvalidEdgeWeight { from, to, weight });
        }
        let a = self.add_agent(from);
        let b = self.add_agent(to);
        if a == b || self.graph.find_edge(a, b).is_some() {
            return Ok(false);
        }
        self.graph.add_edge(a, b, weight);
        Ok(true)
    }

    pub fn contains(&self, id: AgentId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Agent ids in registration order.
    pub fn agents(&self) -> Vec<AgentId> {
        self.graph.node_indices().map(|n| self.graph[n]).collect()
    }

    /// All edges as `(from, to, weight)` in insertion order.
    pub fn edges(&self) -> Vec<(AgentId, AgentId, f64)> {
        self.graph
            .edge_references()
            .map(|e| (self.graph[e.source()], self.graph[e.target()], *e.weight()))
            .collect()
    }

    pub fn agent_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn has_edge(&self, a: AgentId, b: AgentId) -> bool {
        self.edge_weight(a, b).is_some()
    }

    pub fn edge_weight(&self, a: AgentId, b: AgentId) -> Option<f64> {
        let (&na, &nb) = (self.nodes.get(&a)?, self.nodes.get(&b)?);
        self.graph.find_edge(na, nb).map(|e| self.graph[e])
    }

    /// Neighbors of `id` in edge insertion order. Unknown agents have none.
    pub fn neighbors(&self, id: AgentId) -> Vec<Neighbor> {
        let Some(&node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let mut edges: Vec<(EdgeIndex, Neighbor)> = self
            .graph
            .edges(node)
            .map(|e| {
                let other = if e.source() == node { e.target() } else { e.source() };
                (
                    e.id(),
                    Neighbor {
                        id: self.graph[other],
                        weight: *e.weight(),
                    },
                )
            })
            .collect();
        edges.sort_by_key(|(idx, _)| idx.index());
        edges.into_iter().map(|(_, n)| n).collect()
    }

    pub fn degree(&self, id: AgentId) -> usize {
        self.nodes
            .get(&id)
            .map(|&n| self.graph.edges(n).count())
            .unwrap_or(0)
    }

    /// Weighted shortest-path length, `None` when no path exists.
    pub fn shortest_path_length(&self, from: AgentId, to: AgentId) -> Option<f64> {
        if from == to {
            return self.contains(from).then_some(0.0);
        }
        let (&start, &goal) = (self.nodes.get(&from)?, self.nodes.get(&to)?);
        let distances = dijkstra(&self.graph, start, Some(goal), |e| *e.weight());
        distances.get(&goal).copied()
    }

    /// Weighted shortest-path lengths from `from` to every reachable agent.
    pub fn distances_from(&self, from: AgentId) -> HashMap<AgentId, f64> {
        let Some(&start) = self.nodes.get(&from) else {
            return HashMap::new();
        };
        dijkstra(&self.graph, start, None, |e| *e.weight())
            .into_iter()
            .map(|(node, dist)| (self.graph[node], dist))
            .collect()
    }

    /// Subgraph induced by `members`: those vertices and only the edges
    /// joining two of them. Vertices keep the order given.
    pub fn induced_subgraph(&self, members: &[AgentId]) -> NetworkTopology {
        let keep: HashSet<AgentId> = members.iter().copied().collect();
        let mut sub = NetworkTopology::new();
        for &id in members {
            sub.add_agent(id);
        }
        for (from, to, weight) in self.edges() {
            if keep.contains(&from) && keep.contains(&to) {
                // weights were validated on insertion
                let _ = sub.add_edge(from, to, weight);
            }
        }
        sub
    }

    /// Normalized weighted betweenness centrality (Brandes).
    ///
    /// For `n > 2` vertices the raw pair counts are scaled by
    /// `1 / ((n - 1)(n - 2))`; smaller graphs are all zero.
    pub fn betweenness_centrality(&self) -> HashMap<AgentId, f64> {
        let n = self.graph.node_count();
        let mut centrality = vec![0.0_f64; n];

        for source in self.graph.node_indices() {
            let (order, preds, sigma) = self.shortest_path_dag(source);

            let mut delta = vec![0.0_f64; n];
            for &w in order.iter().rev() {
                let coeff = (1.0 + delta[w]) / sigma[w];
                for &v in &preds[w] {
                    delta[v] += sigma[v] * coeff;
                }
                if w != source.index() {
                    centrality[w] += delta[w];
                }
            }
        }

        if n > 2 {
            let scale = 1.0 / ((n - 1) as f64 * (n - 2) as f64);
            for value in &mut centrality {
                *value *= scale;
            }
        }

        self.graph
            .node_indices()
            .map(|node| (self.graph[node], centrality[node.index()]))
            .collect()
    }

    /// Single-source Dijkstra recording settle order, shortest-path
    /// predecessors and path counts.
    fn shortest_path_dag(&self, source: NodeIndex) -> (Vec<usize>, Vec<Vec<usize>>, Vec<f64>) {
        let n = self.graph.node_count();
        let mut order = Vec::with_capacity(n);
        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0_f64; n];
        let mut settled = vec![false; n];
        let mut seen: Vec<Option<f64>> = vec![None; n];
        let mut heap = BinaryHeap::new();
        let mut seq = 0usize;

        sigma[source.index()] = 1.0;
        seen[source.index()] = Some(0.0);
        heap.push(Frontier {
            dist: 0.0,
            seq,
            node: source.index(),
            pred: source.index(),
        });

        while let Some(Frontier {
            dist, node, pred, ..
        }) = heap.pop()
        {
            if settled[node] {
                continue;
            }
            if node != source.index() {
                sigma[node] += sigma[pred];
            }
            settled[node] = true;
            order.push(node);

            for edge in self.graph.edges(NodeIndex::new(node)) {
                let other = if edge.source().index() == node {
                    edge.target().index()
                } else {
                    edge.source().index()
                };
                let candidate = dist + *edge.weight();
                match seen[other] {
                    Some(best) if settled[other] || candidate > best => {}
                    Some(best) if candidate == best => {
                        sigma[other] += sigma[node];
                        preds[other].push(node);
                    }
                    _ => {
                        seen[other] = Some(candidate);
                        seq += 1;
                        heap.push(Frontier {
                            dist: candidate,
                            seq,
                            node: other,
                            pred: node,
                        });
                        sigma[other] = 0.0;
                        preds[other] = vec![node];
                    }
                }
            }
        }

        (order, preds, sigma)
    }
}

/// Min-heap entry for Dijkstra: smallest distance first, then insertion order.
#[derive(Debug, Clone, Copy)]
struct Frontier {
    dist: f64,
    seq: usize,
    node: usize,
    pred: usize,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_graph() -> NetworkTopology {
        NetworkTopology::from_edges([(1, 2, 1.0), (2, 3, 1.0), (3, 4, 1.0)]).unwrap()
    }

    #[test]
    fn test_add_edge_rejects_bad_weights() {
        let mut topology = NetworkTopology::new();
        assert!(topology.add_edge(1, 2, 0.0).is_err());
        assert!(topology.add_edge(1, 2, f64::NAN).is_err());
        assert!(topology.add_edge(1, 2, 2.5).unwrap());
        // duplicate keeps the original weight
        assert!(!topology.add_edge(2, 1, 7.0).unwrap());
        assert_eq!(topology.edge_weight(1, 2), Some(2.5));
    }

    #[test]
    fn test_neighbors_follow_insertion_order() {
        let topology =
            NetworkTopology::from_edges([(5, 1, 1.0), (5, 9, 2.0), (3, 5, 3.0)]).unwrap();
        let ids: Vec<AgentId> = topology.neighbors(5).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![1, 9, 3]);
        assert_eq!(topology.degree(5), 3);
        assert!(topology.neighbors(42).is_empty());
    }

    #[test]
    fn test_shortest_path_prefers_lighter_route() {
        let topology =
            NetworkTopology::from_edges([(1, 2, 1.0), (2, 3, 1.0), (1, 3, 5.0)]).unwrap();
        assert_eq!(topology.shortest_path_length(1, 3), Some(2.0));
        assert_eq!(topology.shortest_path_length(3, 3), Some(0.0));
    }

    #[test]
    fn test_shortest_path_none_when_disconnected() {
        let mut topology = path_graph();
        topology.add_agent(10);
        assert_eq!(topology.shortest_path_length(1, 10), None);
        assert_eq!(topology.shortest_path_length(1, 99), None);
        assert!(!topology.distances_from(1).contains_key(&10));
    }

    #[test]
    fn test_betweenness_on_path() {
        let bc = path_graph().betweenness_centrality();
        // inner vertices each sit on 2 of the 3 pairs that exclude them
        assert!((bc[&2] - 2.0 / 3.0).abs() < 1e-12);
        assert!((bc[&3] - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(bc[&1], 0.0);
        assert_eq!(bc[&4], 0.0);
    }

    #[test]
    fn test_betweenness_on_star() {
        let topology =
            NetworkTopology::from_edges([(0, 1, 1.0), (0, 2, 2.0), (0, 3, 3.0)]).unwrap();
        let bc = topology.betweenness_centrality();
        assert!((bc[&0] - 1.0).abs() < 1e-12);
        assert_eq!(bc[&1], 0.0);
    }

    #[test]
    fn test_betweenness_splits_equal_paths() {
        // square: 1-2-4 and 1-3-4 are equally short
        let topology = NetworkTopology::from_edges([
            (1, 2, 1.0),
            (2, 4, 1.0),
            (1, 3, 1.0),
            (3, 4, 1.0),
        ])
        .unwrap();
        let bc = topology.betweenness_centrality();
        // each vertex carries half of one pair out of three
        for id in [1, 2, 3, 4] {
            assert!((bc[&id] - 1.0 / 6.0).abs() < 1e-12, "vertex {id}: {}", bc[&id]);
        }
    }

    #[test]
    fn test_betweenness_respects_weights() {
        // the heavy direct edge is bypassed through 2
        let topology =
            NetworkTopology::from_edges([(1, 2, 1.0), (2, 3, 1.0), (1, 3, 10.0)]).unwrap();
        let bc = topology.betweenness_centrality();
        assert!((bc[&2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_induced_subgraph_drops_outside_edges() {
        let topology =
            NetworkTopology::from_edges([(1, 2, 1.0), (2, 3, 4.0), (3, 4, 1.0)]).unwrap();
        let sub = topology.induced_subgraph(&[1, 2, 4]);
        assert_eq!(sub.agent_count(), 3);
        assert_eq!(sub.edge_count(), 1);
        assert!(sub.has_edge(1, 2));
        assert!(sub.neighbors(4).is_empty());
    }
}
