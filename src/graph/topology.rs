use crate::core::edge::{Edge, EdgeId};
use crate::core::node::{Node, NodeId, NodeKind};
use crate::error::EngineError;
use crate::graph::rank;
use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// The node and edge sets of the funding network, with adjacency indices
/// in both directions and a dirty bit for lazy re-ranking.
///
/// Edges never hold references to nodes; navigation goes through the
/// `outgoing` (funder -> edges) and `incoming` (recipient -> edges) indices,
/// which are maintained alongside the edge set.
///
/// Every topology mutation sets the dirty bit. [`Topology::rerank`] clears it.
///
/// # Examples
///
/// ```
/// use funding_network::core::edge::Edge;
/// use funding_network::core::node::Node;
/// use funding_network::graph::topology::Topology;
/// use rust_decimal_macros::dec;
///
/// let mut topology = Topology::new();
/// let policy = topology.add_node(Node::policy("Arms Embargo", dec!(0.1))).unwrap();
/// let goal = topology.add_node(Node::goal("World Peace", dec!(0.2))).unwrap();
/// topology.add_edge(Edge::new(policy.clone(), goal.clone(), dec!(0.5))).unwrap();
///
/// assert_eq!(topology.children(&policy), vec![&goal]);
/// assert!(topology.is_dirty());
/// ```
#[derive(Debug, Default)]
pub struct Topology {
    nodes: HashMap<NodeId, Node>,
    edges: HashMap<EdgeId, Edge>,
    outgoing: HashMap<NodeId, Vec<EdgeId>>,
    incoming: HashMap<NodeId, Vec<EdgeId>>,
    /// Node ids in ascending (rank, id) order as of the last rerank.
    order: Vec<NodeId>,
    dirty: bool,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Nodes ---

    pub fn add_node(&mut self, node: Node) -> Result<NodeId, EngineError> {
        let id = node.id().clone();
        if self.nodes.contains_key(&id) {
            return Err(EngineError::DuplicateNode(id));
        }
        self.outgoing.insert(id.clone(), Vec::new());
        self.incoming.insert(id.clone(), Vec::new());
        self.nodes.insert(id.clone(), node);
        self.dirty = true;
        Ok(id)
    }

    /// Remove a node together with every edge touching it.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<Node, EngineError> {
        if !self.nodes.contains_key(id) {
            return Err(EngineError::NodeNotFound(id.clone()));
        }
        let touching: Vec<EdgeId> = self
            .outgoing
            .get(id)
            .into_iter()
            .chain(self.incoming.get(id))
            .flatten()
            .cloned()
            .collect();
        for edge_id in touching {
            self.remove_edge(&edge_id)?;
        }
        self.outgoing.remove(id);
        self.incoming.remove(id);
        self.order.retain(|n| n != id);
        self.dirty = true;
        self.nodes
            .remove(id)
            .ok_or_else(|| EngineError::NodeNotFound(id.clone()))
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values()
    }

    /// Nodes of one variant, sorted by name.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self.nodes.values().filter(|n| n.kind() == kind).collect();
        nodes.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(b.id())));
        nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // --- Edges ---

    /// Check that an edge `lower -> higher` may be added.
    pub fn check_new_edge(&self, lower: &NodeId, higher: &NodeId) -> Result<(), EngineError> {
        for id in [lower, higher] {
            if !self.nodes.contains_key(id) {
                return Err(EngineError::NodeNotFound(id.clone()));
            }
        }
        if self.find_edge(lower, higher).is_some() {
            return Err(EngineError::DuplicateEdge {
                lower: lower.clone(),
                higher: higher.clone(),
            });
        }
        if self.would_create_cycle(lower, higher) {
            return Err(EngineError::CycleDetected {
                lower: lower.clone(),
                higher: higher.clone(),
            });
        }
        Ok(())
    }

    pub fn add_edge(&mut self, edge: Edge) -> Result<EdgeId, EngineError> {
        if self.edges.contains_key(edge.id()) {
            return Err(EngineError::DuplicateEdgeId(edge.id().clone()));
        }
        self.check_new_edge(edge.lower(), edge.higher())?;

        let id = edge.id().clone();
        self.outgoing
            .entry(edge.lower().clone())
            .or_default()
            .push(id.clone());
        self.incoming
            .entry(edge.higher().clone())
            .or_default()
            .push(id.clone());
        self.edges.insert(id.clone(), edge);
        self.dirty = true;
        Ok(id)
    }

    pub fn remove_edge(&mut self, id: &EdgeId) -> Result<Edge, EngineError> {
        let edge = self
            .edges
            .remove(id)
            .ok_or_else(|| EngineError::EdgeNotFound(id.clone()))?;
        if let Some(out) = self.outgoing.get_mut(edge.lower()) {
            out.retain(|e| e != id);
        }
        if let Some(inc) = self.incoming.get_mut(edge.higher()) {
            inc.retain(|e| e != id);
        }
        self.dirty = true;
        Ok(edge)
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    /// Weight changes do not alter the topology; the dirty bit is left alone.
    pub(crate) fn edge_mut(&mut self, id: &EdgeId) -> Option<&mut Edge> {
        self.edges.get_mut(id)
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.values()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// The edge from `lower` to `higher`, if any.
    pub fn find_edge(&self, lower: &NodeId, higher: &NodeId) -> Option<&Edge> {
        self.outgoing_edges(lower).find(|e| e.higher() == higher)
    }

    /// Edges funded by `id`, in creation order.
    pub fn outgoing_edges<'a>(&'a self, id: &NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|e| self.edges.get(e))
    }

    /// Edges funding `id`, in creation order.
    pub fn incoming_edges<'a>(&'a self, id: &NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|e| self.edges.get(e))
    }

    /// Nodes reachable through one outgoing edge.
    pub fn children(&self, id: &NodeId) -> Vec<&NodeId> {
        self.outgoing_edges(id).map(|e| e.higher()).collect()
    }

    /// Nodes reaching `id` through one incoming edge.
    pub fn parents(&self, id: &NodeId) -> Vec<&NodeId> {
        self.incoming_edges(id).map(|e| e.lower()).collect()
    }

    /// Sum of the positive outgoing weights: the declared demand on the node's wallet.
    pub fn total_outgoing_weight(&self, id: &NodeId) -> Decimal {
        self.outgoing_edges(id)
            .map(|e| e.weight())
            .filter(|w| *w > Decimal::ZERO)
            .sum()
    }

    /// Would adding `lower -> higher` close a cycle?
    pub fn would_create_cycle(&self, lower: &NodeId, higher: &NodeId) -> bool {
        if lower == higher {
            return true;
        }
        if !self.contains_node(lower) || !self.contains_node(higher) {
            return false;
        }
        let graph = self.graph_map();
        has_path_connecting(&graph, higher.as_str(), lower.as_str(), None)
    }

    /// A petgraph view of the current topology, keyed by node id.
    pub(crate) fn graph_map(&self) -> DiGraphMap<&str, ()> {
        let mut graph = DiGraphMap::with_capacity(self.nodes.len(), self.edges.len());
        for id in self.nodes.keys() {
            graph.add_node(id.as_str());
        }
        for edge in self.edges.values() {
            graph.add_edge(edge.lower().as_str(), edge.higher().as_str(), ());
        }
        graph
    }

    // --- Ranking ---

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Node ids in processing order as of the last rerank.
    pub fn ranked_order(&self) -> &[NodeId] {
        &self.order
    }

    /// Recompute every node's rank and the processing order, clearing the dirty bit.
    pub fn rerank(&mut self) -> Result<(), EngineError> {
        let ranks = rank::compute_ranks(self)?;
        for (id, value) in &ranks {
            if let Some(node) = self.nodes.get_mut(id) {
                node.set_rank(*value);
            }
        }
        self.order = rank::processing_order(&ranks);
        self.dirty = false;
        Ok(())
    }

    /// Drop every node and edge.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.outgoing.clear();
        self.incoming.clear();
        self.order.clear();
        self.dirty = true;
    }
}
