//! Import and update of whole networks from a JSON definition.
//!
//! A definition lists goals and policies with caller-chosen ids. Each node
//! carries its outgoing `connections`. Import and update validate the whole
//! definition before touching the network, so a rejected definition leaves
//! nothing behind.

use crate::core::edge::{Edge, EdgeId};
use crate::core::node::{Node, NodeId, NodeKind};
use crate::error::EngineError;
use crate::graph::topology::Topology;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub id: EdgeId,
    pub from_id: NodeId,
    pub to_id: NodeId,
    pub weight: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: NodeId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<i64>,
    pub leakage: Decimal,
    #[serde(default)]
    pub max_amount: Decimal,
    #[serde(default)]
    pub activation_amount: Decimal,
    #[serde(default)]
    pub connections: Vec<EdgeDefinition>,
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, leakage: Decimal) -> Self {
        Self {
            id: NodeId::new(id),
            name: name.into(),
            short_name: None,
            group: None,
            leakage,
            max_amount: Decimal::ZERO,
            activation_amount: Decimal::ZERO,
            connections: Vec::new(),
        }
    }

    /// Add an outgoing connection to `to_id`.
    pub fn connect(mut self, id: impl Into<String>, to_id: impl Into<String>, weight: Decimal) -> Self {
        self.connections.push(EdgeDefinition {
            id: EdgeId::new(id),
            from_id: self.id.clone(),
            to_id: NodeId::new(to_id),
            weight,
        });
        self
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.leakage < Decimal::ZERO || self.leakage > Decimal::ONE {
            return Err(invalid(format!(
                "node {} has leakage {} outside [0, 1]",
                self.id, self.leakage
            )));
        }
        if self.max_amount < Decimal::ZERO || self.activation_amount < Decimal::ZERO {
            return Err(invalid(format!(
                "node {} has a negative max or activation amount",
                self.id
            )));
        }
        Ok(())
    }

    fn apply_to(&self, node: &mut Node) {
        node.set_name(self.name.clone());
        if self.short_name.is_some() {
            node.set_short_name(self.short_name.clone());
        }
        if self.group.is_some() {
            node.set_group(self.group);
        }
        node.set_leak(self.leakage);
        node.set_max_level(Some(self.max_amount));
        node.set_activation(self.activation_amount);
    }
}

/// The goals and policies of a network, each with its outgoing connections.
///
/// # Examples
///
/// ```
/// use funding_network::game::network_def::NetworkDefinition;
///
/// let json = r#"{
///     "goals": [{"id": "g1", "name": "World Peace", "leakage": "0.1",
///                "max_amount": "100", "activation_amount": "0"}],
///     "policies": [{"id": "p1", "name": "Arms Embargo", "leakage": "0.1",
///                   "max_amount": "100", "activation_amount": "0",
///                   "connections": [{"id": "l1", "from_id": "p1", "to_id": "g1", "weight": "2"}]}]
/// }"#;
/// let network = NetworkDefinition::from_json(json).unwrap();
/// assert_eq!(network.connections().count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkDefinition {
    #[serde(default)]
    pub goals: Vec<NodeDefinition>,
    #[serde(default)]
    pub policies: Vec<NodeDefinition>,
}

impl NetworkDefinition {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    fn nodes(&self) -> impl Iterator<Item = (NodeKind, &NodeDefinition)> + '_ {
        self.goals
            .iter()
            .map(|g| (NodeKind::Goal, g))
            .chain(self.policies.iter().map(|p| (NodeKind::Policy, p)))
    }

    pub fn connections(&self) -> impl Iterator<Item = &EdgeDefinition> + '_ {
        self.goals
            .iter()
            .chain(self.policies.iter())
            .flat_map(|n| n.connections.iter())
    }
}

fn invalid(message: String) -> EngineError {
    EngineError::Validation(message)
}

/// Add every node and connection of `definition` to the topology.
pub(crate) fn import(topology: &mut Topology, definition: &NetworkDefinition) -> Result<(), EngineError> {
    let mut node_ids: HashSet<&NodeId> = HashSet::new();
    for (_, node) in definition.nodes() {
        node.validate()?;
        if topology.contains_node(&node.id) || !node_ids.insert(&node.id) {
            return Err(invalid(format!("node id {} is used more than once", node.id)));
        }
    }

    let known = |id: &NodeId| node_ids.contains(id) || topology.contains_node(id);
    let mut edge_ids: HashSet<&EdgeId> = HashSet::new();
    let mut pairs: HashSet<(&NodeId, &NodeId)> = HashSet::new();
    for conn in definition.connections() {
        for end in [&conn.from_id, &conn.to_id] {
            if !known(end) {
                return Err(invalid(format!(
                    "connection {} refers to unknown node {}",
                    conn.id, end
                )));
            }
        }
        if topology.edge(&conn.id).is_some() || !edge_ids.insert(&conn.id) {
            return Err(invalid(format!("link id {} is used more than once", conn.id)));
        }
        if topology.find_edge(&conn.from_id, &conn.to_id).is_some()
            || !pairs.insert((&conn.from_id, &conn.to_id))
        {
            return Err(invalid(format!(
                "more than one link from {} to {}",
                conn.from_id, conn.to_id
            )));
        }
    }

    let mut graph: DiGraphMap<&str, ()> = topology.graph_map();
    for id in &node_ids {
        graph.add_node(id.as_str());
    }
    for conn in definition.connections() {
        graph.add_edge(conn.from_id.as_str(), conn.to_id.as_str(), ());
    }
    if let Err(cycle) = toposort(&graph, None) {
        return Err(invalid(format!(
            "connections form a cycle through node {}",
            cycle.node_id()
        )));
    }

    for (kind, def) in definition.nodes() {
        let mut node = match kind {
            NodeKind::Goal => Node::goal(def.name.clone(), def.leakage),
            _ => Node::policy(def.name.clone(), def.leakage),
        }
        .with_id(def.id.clone());
        def.apply_to(&mut node);
        topology.add_node(node)?;
    }
    for conn in definition.connections() {
        topology.add_edge(Edge::with_id(
            conn.id.clone(),
            conn.from_id.clone(),
            conn.to_id.clone(),
            conn.weight,
        ))?;
    }
    topology.rerank()
}

/// Update fields of existing nodes and weights of existing links.
pub(crate) fn update(topology: &mut Topology, definition: &NetworkDefinition) -> Result<(), EngineError> {
    for (_, def) in definition.nodes() {
        def.validate()?;
        if !topology.contains_node(&def.id) {
            return Err(invalid(format!(
                "node id {} name {} not found in network",
                def.id, def.name
            )));
        }
    }
    for conn in definition.connections() {
        if topology.edge(&conn.id).is_none() {
            return Err(invalid(format!("link id {} not found in network", conn.id)));
        }
    }

    for (_, def) in definition.nodes() {
        if let Some(node) = topology.node_mut(&def.id) {
            def.apply_to(node);
        }
    }
    for conn in definition.connections() {
        if let Some(edge) = topology.edge_mut(&conn.id) {
            edge.set_weight(conn.weight);
        }
    }
    topology.mark_dirty();
    topology.rerank()
}

/// Export the goals and policies of the topology as a definition.
pub(crate) fn export(topology: &Topology) -> NetworkDefinition {
    let describe = |node: &Node| {
        let mut connections: Vec<EdgeDefinition> = topology
            .outgoing_edges(node.id())
            .map(|e| EdgeDefinition {
                id: e.id().clone(),
                from_id: e.lower().clone(),
                to_id: e.higher().clone(),
                weight: e.weight(),
            })
            .collect();
        connections.sort_by(|a, b| a.id.cmp(&b.id));
        NodeDefinition {
            id: node.id().clone(),
            name: node.name().to_string(),
            short_name: node.short_name().map(str::to_string),
            group: node.group(),
            leakage: node.leak(),
            max_amount: node.max_level().unwrap_or(Decimal::ZERO),
            activation_amount: node.activation(),
            connections,
        }
    };
    NetworkDefinition {
        goals: topology.nodes_of_kind(NodeKind::Goal).into_iter().map(describe).collect(),
        policies: topology.nodes_of_kind(NodeKind::Policy).into_iter().map(describe).collect(),
    }
}

/// Remove every goal, policy and edge. Players stay, with their goal unset.
pub(crate) fn clear_network(topology: &mut Topology) -> Result<(), EngineError> {
    let edges: Vec<EdgeId> = topology.edges().map(|e| e.id().clone()).collect();
    for id in edges {
        topology.remove_edge(&id)?;
    }
    let nodes: Vec<NodeId> = topology
        .nodes()
        .filter(|n| n.kind() != NodeKind::Player)
        .map(|n| n.id().clone())
        .collect();
    for id in nodes {
        topology.remove_node(&id)?;
    }
    let players: Vec<NodeId> = topology.nodes().map(|n| n.id().clone()).collect();
    for id in players {
        if let Some(state) = topology.node_mut(&id).and_then(Node::player_mut) {
            state.goal = None;
        }
    }
    Ok(())
}

/// Remove every player and its edges, then empty every remaining wallet.
pub(crate) fn clear_players(topology: &mut Topology) -> Result<(), EngineError> {
    let players: Vec<NodeId> = topology
        .nodes()
        .filter(|n| n.kind() == NodeKind::Player)
        .map(|n| n.id().clone())
        .collect();
    for id in players {
        topology.remove_node(&id)?;
    }
    for node in topology.nodes() {
        node.wallet().lock().clear();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::PlayerState;
    use rust_decimal_macros::dec;

    fn sample() -> NetworkDefinition {
        NetworkDefinition {
            goals: vec![NodeDefinition::new("g1", "World Peace", dec!(0.1))],
            policies: vec![
                NodeDefinition::new("p1", "Arms Embargo", dec!(0.2)).connect("l1", "p2", dec!(3)),
                NodeDefinition::new("p2", "Aid", dec!(0.2)).connect("l2", "g1", dec!(1)),
            ],
        }
    }

    #[test]
    fn test_import_ranks_network() {
        let mut topology = Topology::new();
        import(&mut topology, &sample()).unwrap();

        assert_eq!(topology.node_count(), 3);
        assert_eq!(topology.edge_count(), 2);
        assert!(!topology.is_dirty());
        assert_eq!(topology.node(&NodeId::new("g1")).unwrap().rank(), 4);
        assert_eq!(
            topology.edge(&EdgeId::new("l1")).unwrap().weight(),
            dec!(3)
        );
    }

    #[test]
    fn test_import_unknown_endpoint_is_all_or_nothing() {
        let mut definition = sample();
        definition.policies[1] = definition.policies[1].clone().connect("l3", "nowhere", dec!(1));
        let mut topology = Topology::new();

        let err = import(&mut topology, &definition).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(topology.node_count(), 0);
    }

    #[test]
    fn test_import_rejects_cycle() {
        let mut definition = sample();
        definition.goals[0] = definition.goals[0].clone().connect("l3", "p1", dec!(1));
        let mut topology = Topology::new();
        assert!(matches!(
            import(&mut topology, &definition),
            Err(EngineError::Validation(_))
        ));
        assert_eq!(topology.edge_count(), 0);
    }

    #[test]
    fn test_import_rejects_duplicate_ids() {
        let mut topology = Topology::new();
        import(&mut topology, &sample()).unwrap();
        assert!(import(&mut topology, &sample()).is_err());
        assert_eq!(topology.node_count(), 3);
    }

    #[test]
    fn test_update_changes_fields_and_weights() {
        let mut topology = Topology::new();
        import(&mut topology, &sample()).unwrap();

        let mut definition = sample();
        definition.policies[0].leakage = dec!(0.5);
        definition.policies[0].activation_amount = dec!(2);
        definition.policies[0].connections[0].weight = dec!(9);
        update(&mut topology, &definition).unwrap();

        let p1 = topology.node(&NodeId::new("p1")).unwrap();
        assert_eq!(p1.leak(), dec!(0.5));
        assert_eq!(p1.activation(), dec!(2));
        assert_eq!(topology.edge(&EdgeId::new("l1")).unwrap().weight(), dec!(9));
    }

    #[test]
    fn test_update_unknown_link_changes_nothing() {
        let mut topology = Topology::new();
        import(&mut topology, &sample()).unwrap();

        let mut definition = sample();
        definition.policies[0].leakage = dec!(0.9);
        definition.policies[1].connections[0].id = EdgeId::new("missing");
        assert!(matches!(
            update(&mut topology, &definition),
            Err(EngineError::Validation(_))
        ));
        assert_eq!(topology.node(&NodeId::new("p1")).unwrap().leak(), dec!(0.2));
    }

    #[test]
    fn test_export_round_trips_through_import() {
        let mut topology = Topology::new();
        import(&mut topology, &sample()).unwrap();
        let exported = export(&topology);

        let mut copy = Topology::new();
        import(&mut copy, &exported).unwrap();
        assert_eq!(copy.node_count(), 3);
        assert_eq!(copy.edge_count(), 2);
    }

    #[test]
    fn test_clear_network_keeps_players() {
        let mut topology = Topology::new();
        import(&mut topology, &sample()).unwrap();
        let mut state = PlayerState::new(dec!(100), dec!(100));
        state.goal = Some(NodeId::new("g1"));
        let player = topology.add_node(Node::new_player("Matt", state)).unwrap();
        topology
            .add_edge(Edge::new(player.clone(), NodeId::new("p1"), dec!(10)))
            .unwrap();

        clear_network(&mut topology).unwrap();
        assert_eq!(topology.node_count(), 1);
        assert_eq!(topology.edge_count(), 0);
        assert_eq!(topology.node(&player).unwrap().player().unwrap().goal, None);
    }

    #[test]
    fn test_clear_players_empties_wallets() {
        let mut topology = Topology::new();
        import(&mut topology, &sample()).unwrap();
        let player = topology
            .add_node(Node::new_player("Matt", PlayerState::new(dec!(100), dec!(100))))
            .unwrap();
        topology
            .add_edge(Edge::new(player, NodeId::new("p1"), dec!(10)))
            .unwrap();
        topology
            .node(&NodeId::new("p1"))
            .unwrap()
            .wallet()
            .lock()
            .deposit(NodeId::new("p1"), dec!(50))
            .unwrap();

        clear_players(&mut topology).unwrap();
        assert_eq!(topology.node_count(), 3);
        assert_eq!(topology.edge_count(), 2);
        assert_eq!(topology.node(&NodeId::new("p1")).unwrap().balance(), Decimal::ZERO);
    }
}
