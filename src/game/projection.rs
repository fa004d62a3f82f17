//! Read-only views of the network for rendering by an outer layer.

use crate::core::edge::{Edge, EdgeId};
use crate::core::node::{Node, NodeId, NodeKind};
use crate::core::table::TableId;
use crate::engine::player_ref;
use crate::engine::propagate::FlowCalculator;
use crate::error::EngineError;
use crate::graph::topology::Topology;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeView {
    pub id: EdgeId,
    pub from_id: NodeId,
    pub to_id: NodeId,
    pub weight: Decimal,
}

impl From<&Edge> for EdgeView {
    fn from(edge: &Edge) -> Self {
        Self {
            id: edge.id().clone(),
            from_id: edge.lower().clone(),
            to_id: edge.higher().clone(),
            weight: edge.weight(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub id: NodeId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<i64>,
    pub kind: NodeKind,
    pub leakage: Decimal,
    pub max_amount: Decimal,
    pub activation_amount: Decimal,
    /// Current inflow.
    pub active_level: Decimal,
    pub active: bool,
    /// Inflow as a percentage of the activation threshold, capped at 100.
    pub active_percent: f64,
    pub balance: Decimal,
    pub rank: u64,
    pub connections: Vec<EdgeView>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkView {
    pub goals: Vec<NodeView>,
    pub policies: Vec<NodeView>,
}

/// The part of the network a player's money can reach.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerNetworkView {
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub id: NodeId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: NodeId,
    pub name: String,
    pub balance: Decimal,
    pub max_outflow: Decimal,
    pub goal: Option<NamedRef>,
    pub goal_contribution: Decimal,
    pub goal_total: Decimal,
    pub policies: Vec<NamedRef>,
    pub table: Option<TableId>,
}

/// One row of the league table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueEntry {
    pub id: NodeId,
    pub name: String,
    pub goal_id: Option<NodeId>,
    pub goal: Option<String>,
    pub goal_contribution: Decimal,
    pub goal_total: Decimal,
}

pub fn active_percent(inflow: Decimal, activation: Decimal) -> f64 {
    if activation <= Decimal::ZERO {
        return 100.0;
    }
    let percent = inflow
        .checked_div(activation)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map_or(Decimal::ONE_HUNDRED, |p| p.min(Decimal::ONE_HUNDRED));
    percent.to_f64().unwrap_or(0.0)
}

fn node_view(topology: &Topology, flow: &mut FlowCalculator<'_>, node: &Node) -> NodeView {
    let inflow = flow.current_inflow(node.id());
    let mut connections: Vec<EdgeView> = topology
        .outgoing_edges(node.id())
        .map(EdgeView::from)
        .collect();
    connections.sort_by(|a, b| a.id.cmp(&b.id));
    NodeView {
        id: node.id().clone(),
        name: node.name().to_string(),
        short_name: node.short_name().map(str::to_string),
        group: node.group(),
        kind: node.kind(),
        leakage: node.leak(),
        max_amount: node.max_level().unwrap_or(Decimal::ZERO),
        activation_amount: node.activation(),
        active_level: inflow,
        active: inflow >= node.activation(),
        active_percent: active_percent(inflow, node.activation()),
        balance: node.balance(),
        rank: node.rank(),
        connections,
    }
}

fn sorted_by_name<'a>(mut nodes: Vec<&'a Node>) -> Vec<&'a Node> {
    nodes.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(b.id())));
    nodes
}

/// Every node reachable from `roots` along outgoing edges, roots included.
fn descendants<'a>(topology: &'a Topology, roots: Vec<&'a NodeId>) -> BTreeSet<&'a NodeId> {
    let mut seen: BTreeSet<&NodeId> = BTreeSet::new();
    let mut queue: VecDeque<&NodeId> = roots.into_iter().collect();
    while let Some(id) = queue.pop_front() {
        if seen.insert(id) {
            queue.extend(topology.children(id));
        }
    }
    seen
}

/// Policies the player funds at a positive rate.
fn funded_targets<'a>(topology: &'a Topology, player: &NodeId) -> Vec<&'a NodeId> {
    topology
        .outgoing_edges(player)
        .filter(|e| e.weight() > Decimal::ZERO)
        .map(Edge::higher)
        .collect()
}

/// Goals and policies with their outgoing edges, sorted by name.
///
/// With `players`, only the players' goals and whatever their funded
/// policies reach are included.
pub fn network_view(
    topology: &Topology,
    players: Option<&[NodeId]>,
) -> Result<NetworkView, EngineError> {
    let nodes: Vec<&Node> = match players {
        None => topology
            .nodes()
            .filter(|n| n.kind() != NodeKind::Player)
            .collect(),
        Some(players) => {
            let mut roots = Vec::new();
            for player in players {
                let state = player_ref(topology, player)?;
                roots.extend(state.goal.iter().filter(|g| topology.contains_node(g)));
                roots.extend(funded_targets(topology, player));
            }
            descendants(topology, roots)
                .into_iter()
                .filter_map(|id| topology.node(id))
                .filter(|n| n.kind() != NodeKind::Player)
                .collect()
        }
    };

    let mut flow = FlowCalculator::new(topology);
    let mut view = NetworkView::default();
    for node in sorted_by_name(nodes) {
        let rendered = node_view(topology, &mut flow, node);
        match node.kind() {
            NodeKind::Goal => view.goals.push(rendered),
            _ => view.policies.push(rendered),
        }
    }
    Ok(view)
}

/// The subgraph reached breadth-first from the player's actively funded
/// edges, plus the player and its goal.
pub fn player_network_view(
    topology: &Topology,
    player: &NodeId,
) -> Result<PlayerNetworkView, EngineError> {
    let state = player_ref(topology, player)?;

    let reached = descendants(topology, funded_targets(topology, player));
    let mut edges: BTreeMap<&EdgeId, &Edge> = topology
        .outgoing_edges(player)
        .filter(|e| e.weight() > Decimal::ZERO)
        .map(|e| (e.id(), e))
        .collect();
    for id in &reached {
        edges.extend(topology.outgoing_edges(id).map(|e| (e.id(), e)));
    }

    let mut ids = reached;
    ids.insert(player);
    if let Some(goal) = state.goal.as_ref().filter(|g| topology.contains_node(g)) {
        ids.insert(goal);
    }

    let mut flow = FlowCalculator::new(topology);
    let nodes = sorted_by_name(ids.into_iter().filter_map(|id| topology.node(id)).collect())
        .into_iter()
        .map(|n| node_view(topology, &mut flow, n))
        .collect();
    Ok(PlayerNetworkView {
        nodes,
        edges: edges.into_values().map(EdgeView::from).collect(),
    })
}

/// Amount in the player's goal wallet that came from the player.
pub fn goal_contribution(topology: &Topology, player: &NodeId) -> Result<Decimal, EngineError> {
    let state = player_ref(topology, player)?;
    Ok(state
        .goal
        .as_ref()
        .and_then(|g| topology.node(g))
        .map(|goal| goal.wallet_snapshot().owned_by(player))
        .unwrap_or(Decimal::ZERO))
}

pub fn player_view(topology: &Topology, player: &NodeId) -> Result<PlayerView, EngineError> {
    let state = player_ref(topology, player)?;
    let node = topology
        .node(player)
        .ok_or_else(|| EngineError::PlayerNotFound(player.clone()))?;
    let goal = state.goal.as_ref().and_then(|g| topology.node(g));
    let policies = sorted_by_name(
        topology
            .children(player)
            .into_iter()
            .filter_map(|id| topology.node(id))
            .collect(),
    )
    .into_iter()
    .map(|n| NamedRef {
        id: n.id().clone(),
        name: n.name().to_string(),
    })
    .collect();

    Ok(PlayerView {
        id: player.clone(),
        name: node.name().to_string(),
        balance: node.balance(),
        max_outflow: state.max_outflow,
        goal: goal.map(|g| NamedRef {
            id: g.id().clone(),
            name: g.name().to_string(),
        }),
        goal_contribution: goal_contribution(topology, player)?,
        goal_total: goal.map(Node::balance).unwrap_or(Decimal::ZERO),
        policies,
        table: state.table.clone(),
    })
}

/// Players ordered by how much of their own money sits in their goal.
pub fn league_table(topology: &Topology, max: usize) -> Vec<LeagueEntry> {
    let mut entries: Vec<LeagueEntry> = topology
        .nodes_of_kind(NodeKind::Player)
        .into_iter()
        .filter_map(|node| {
            let state = node.player()?;
            let goal = state.goal.as_ref().and_then(|g| topology.node(g));
            Some(LeagueEntry {
                id: node.id().clone(),
                name: node.name().to_string(),
                goal_id: goal.map(|g| g.id().clone()),
                goal: goal.map(|g| g.name().to_string()),
                goal_contribution: goal
                    .map(|g| g.wallet_snapshot().owned_by(node.id()))
                    .unwrap_or(Decimal::ZERO),
                goal_total: goal.map(Node::balance).unwrap_or(Decimal::ZERO),
            })
        })
        .collect();
    entries.sort_by(|a, b| b.goal_contribution.cmp(&a.goal_contribution));
    entries.truncate(max);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FundingNetwork;
    use approx::assert_relative_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn test_active_percent() {
        assert_relative_eq!(active_percent(dec!(5), dec!(10)), 50.0);
        assert_relative_eq!(active_percent(dec!(30), dec!(10)), 100.0);
        assert_relative_eq!(active_percent(dec!(0), dec!(0)), 100.0);
        assert_relative_eq!(active_percent(dec!(1), dec!(3)), 33.333333, epsilon = 1e-4);
    }

    #[test]
    fn test_active_percent_saturates_for_tiny_activation() {
        assert_relative_eq!(active_percent(dec!(100000), Decimal::new(1, 25)), 100.0);
    }

    #[test]
    fn test_network_view_with_tiny_activation() {
        let network = FundingNetwork::new();
        let policy = network.add_policy("Policy 1", dec!(0)).unwrap();
        let goal = network.add_goal("Goal 1", dec!(0)).unwrap();
        network.add_link(&policy, &goal, dec!(100000)).unwrap();
        network.set_balance(&policy, dec!(100000)).unwrap();
        network.set_activation(&goal, Decimal::new(1, 25)).unwrap();

        let view = network_view(&network.topology(), None).unwrap();
        let goal_view = view.goals.iter().find(|g| g.id == goal).unwrap();
        assert!(goal_view.active);
        assert_relative_eq!(goal_view.active_percent, 100.0);
    }

    #[test]
    fn test_edge_view_shape() {
        let edge = Edge::with_id(EdgeId::new("l1"), NodeId::new("a"), NodeId::new("b"), dec!(2));
        let json = serde_json::to_value(EdgeView::from(&edge)).unwrap();
        assert_eq!(json["from_id"], "a");
        assert_eq!(json["to_id"], "b");
        assert_eq!(json["weight"], "2");
    }
}
