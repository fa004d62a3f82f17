use crate::core::node::NodeId;
use crate::error::EngineError;
use crate::graph::topology::Topology;
use petgraph::algo::toposort;
use petgraph::Direction;
use std::collections::HashMap;

/// Rank added per incoming edge on top of the parent's own rank.
pub const RANK_STEP: u64 = 2;

/// Compute the rank of every node.
///
/// `rank(n) = Σ (rank(p) + 2)` over the incoming edges `p -> n`. Sources
/// rank 0 and every node ranks strictly above each of its funders, so
/// ascending rank is a topological order of the funding graph.
///
/// Nodes are visited once in topological order and each parent's rank is
/// read from the memo, which keeps the computation linear in the number of
/// edges even when many paths share a prefix. Sums saturate at `u64::MAX`.
pub fn compute_ranks(topology: &Topology) -> Result<HashMap<NodeId, u64>, EngineError> {
    let graph = topology.graph_map();
    let order = toposort(&graph, None)
        .map_err(|cycle| EngineError::RankCycle(NodeId::new(cycle.node_id())))?;

    let mut memo: HashMap<&str, u64> = HashMap::with_capacity(order.len());
    for id in order {
        let rank = graph
            .neighbors_directed(id, Direction::Incoming)
            .map(|parent| {
                memo.get(parent)
                    .copied()
                    .unwrap_or(0)
                    .saturating_add(RANK_STEP)
            })
            .fold(0u64, u64::saturating_add);
        memo.insert(id, rank);
    }

    Ok(memo
        .into_iter()
        .map(|(id, rank)| (NodeId::new(id), rank))
        .collect())
}

/// Node ids sorted by ascending rank, ties broken by id.
pub fn processing_order(ranks: &HashMap<NodeId, u64>) -> Vec<NodeId> {
    let mut order: Vec<(&NodeId, u64)> = ranks.iter().map(|(id, r)| (id, *r)).collect();
    order.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    order.into_iter().map(|(id, _)| id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::edge::Edge;
    use crate::core::node::Node;
    use rust_decimal_macros::dec;

    /// Straight recursive definition, without memoisation.
    fn naive_rank(topology: &Topology, id: &NodeId) -> u64 {
        topology
            .parents(id)
            .into_iter()
            .map(|p| naive_rank(topology, p) + RANK_STEP)
            .sum()
    }

    fn node(topology: &mut Topology, name: &str) -> NodeId {
        topology
            .add_node(Node::policy(name, dec!(0)).with_id(NodeId::new(name)))
            .unwrap()
    }

    fn link(topology: &mut Topology, lower: &NodeId, higher: &NodeId) {
        topology
            .add_edge(Edge::new(lower.clone(), higher.clone(), dec!(1)))
            .unwrap();
    }

    #[test]
    fn test_chain_ranks() {
        let mut topology = Topology::new();
        let a = node(&mut topology, "a");
        let b = node(&mut topology, "b");
        let c = node(&mut topology, "c");
        link(&mut topology, &a, &b);
        link(&mut topology, &b, &c);

        let ranks = compute_ranks(&topology).unwrap();
        assert_eq!(ranks[&a], 0);
        assert_eq!(ranks[&b], 2);
        assert_eq!(ranks[&c], 4);
    }

    #[test]
    fn test_diamond_counts_every_path() {
        // a -> b, a -> c, b -> d, c -> d
        let mut topology = Topology::new();
        let a = node(&mut topology, "a");
        let b = node(&mut topology, "b");
        let c = node(&mut topology, "c");
        let d = node(&mut topology, "d");
        link(&mut topology, &a, &b);
        link(&mut topology, &a, &c);
        link(&mut topology, &b, &d);
        link(&mut topology, &c, &d);

        let ranks = compute_ranks(&topology).unwrap();
        assert_eq!(ranks[&d], 8);
        for id in [&a, &b, &c, &d] {
            assert_eq!(ranks[id], naive_rank(&topology, id));
        }
    }

    #[test]
    fn test_memoised_matches_naive_on_layered_graph() {
        let mut topology = Topology::new();
        let layers: Vec<Vec<NodeId>> = (0..4)
            .map(|l| (0..3).map(|i| node(&mut topology, &format!("n{}{}", l, i))).collect())
            .collect();
        for pair in layers.windows(2) {
            for lower in &pair[0] {
                for higher in &pair[1] {
                    link(&mut topology, lower, higher);
                }
            }
        }

        let ranks = compute_ranks(&topology).unwrap();
        for layer in &layers {
            for id in layer {
                assert_eq!(ranks[id], naive_rank(&topology, id));
            }
        }
    }

    #[test]
    fn test_processing_order_breaks_ties_by_id() {
        let mut ranks = HashMap::new();
        ranks.insert(NodeId::new("z"), 0);
        ranks.insert(NodeId::new("a"), 0);
        ranks.insert(NodeId::new("m"), 2);
        let order = processing_order(&ranks);
        assert_eq!(
            order,
            vec![NodeId::new("a"), NodeId::new("z"), NodeId::new("m")]
        );
    }
}
