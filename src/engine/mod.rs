//! The shared funding network: topology, wallets and the operations that
//! move money through them.
//!
//! All state sits behind one [`FundingNetwork`]. The topology is guarded
//! by a reader-writer lock and each wallet by its own mutex:
//!
//! * topology mutations (nodes, edges, funding, trades) take the write lock,
//!   so every multi-step operation is applied as a unit;
//! * tick passes take the upgradable read lock, so two ticks never overlap
//!   while player reads continue;
//! * direct transfers take the read lock and lock both wallets in ascending
//!   node id order.

pub mod funding;
pub mod leak;
pub mod propagate;
pub mod tick;
pub mod trade;

use crate::core::edge::{Edge, EdgeId};
use crate::core::node::{Node, NodeId, NodeKind, PlayerState};
use crate::core::table::TableId;
use crate::core::wallet::Wallet;
use crate::error::EngineError;
use crate::graph::topology::Topology;
use log::{debug, info};
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

pub use funding::{FundingEntry, FundingRequest};
pub use propagate::NodeFlow;
pub use tick::TickReport;
pub use trade::PolicyOffer;

#[derive(Debug, Default)]
pub struct FundingNetwork {
    topology: RwLock<Topology>,
    /// Checksums of offers that have already been bought, by seller.
    /// Cleared for a seller when its token rotates.
    redeemed_offers: Mutex<HashMap<NodeId, HashSet<String>>>,
}

impl FundingNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared read access to the topology.
    pub fn topology(&self) -> RwLockReadGuard<'_, Topology> {
        self.topology.read()
    }

    pub(crate) fn topology_mut(&self) -> RwLockWriteGuard<'_, Topology> {
        self.topology.write()
    }

    // --- Nodes ---

    /// Insert a node after checking its rates.
    pub fn add_node(&self, node: Node) -> Result<NodeId, EngineError> {
        validate_rates(node.leak(), node.activation())?;
        if let Some(state) = node.player() {
            for value in [state.max_outflow, state.budget] {
                if value < Decimal::ZERO {
                    return Err(EngineError::NegativeAmount(value));
                }
            }
        }
        let kind = node.kind();
        let id = self.topology.write().add_node(node)?;
        debug!("added {} {}", kind, id);
        Ok(id)
    }

    pub fn add_policy(&self, name: &str, leak: Decimal) -> Result<NodeId, EngineError> {
        self.add_node(Node::policy(name, leak))
    }

    pub fn add_goal(&self, name: &str, leak: Decimal) -> Result<NodeId, EngineError> {
        self.add_node(Node::goal(name, leak))
    }

    /// Add a player with an empty wallet.
    pub fn add_player(
        &self,
        name: &str,
        max_outflow: Decimal,
        budget: Decimal,
    ) -> Result<NodeId, EngineError> {
        self.add_node(Node::new_player(name, PlayerState::new(max_outflow, budget)))
    }

    /// Remove a node, its edges and its wallet.
    pub fn remove_node(&self, id: &NodeId) -> Result<(), EngineError> {
        self.topology.write().remove_node(id)?;
        info!("removed node {}", id);
        Ok(())
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.topology.read().contains_node(id)
    }

    pub fn node_kind(&self, id: &NodeId) -> Result<NodeKind, EngineError> {
        self.topology
            .read()
            .node(id)
            .map(Node::kind)
            .ok_or_else(|| EngineError::NodeNotFound(id.clone()))
    }

    /// Ids of all nodes of one kind, sorted by name.
    pub fn node_ids(&self, kind: NodeKind) -> Vec<NodeId> {
        self.topology
            .read()
            .nodes_of_kind(kind)
            .into_iter()
            .map(|n| n.id().clone())
            .collect()
    }

    pub fn set_leak(&self, id: &NodeId, leak: Decimal) -> Result<(), EngineError> {
        let mut topology = self.topology.write();
        let node = node_mut(&mut topology, id)?;
        validate_rates(leak, node.activation())?;
        node.set_leak(leak);
        Ok(())
    }

    pub fn set_activation(&self, id: &NodeId, activation: Decimal) -> Result<(), EngineError> {
        let mut topology = self.topology.write();
        let node = node_mut(&mut topology, id)?;
        validate_rates(node.leak(), activation)?;
        node.set_activation(activation);
        Ok(())
    }

    // --- Links ---

    /// Add an edge of any weight between two existing nodes.
    ///
    /// Negative weights are accepted here; they act as a tax on the
    /// recipient rather than as a funding rate.
    pub fn add_link(
        &self,
        lower: &NodeId,
        higher: &NodeId,
        weight: Decimal,
    ) -> Result<EdgeId, EngineError> {
        let id = self
            .topology
            .write()
            .add_edge(Edge::new(lower.clone(), higher.clone(), weight))?;
        debug!("linked {} -> {} at {}", lower, higher, weight);
        Ok(id)
    }

    pub fn remove_link(&self, id: &EdgeId) -> Result<Edge, EngineError> {
        self.topology.write().remove_edge(id)
    }

    pub fn link(&self, id: &EdgeId) -> Result<Edge, EngineError> {
        self.topology
            .read()
            .edge(id)
            .cloned()
            .ok_or_else(|| EngineError::EdgeNotFound(id.clone()))
    }

    pub fn set_link_weight(&self, id: &EdgeId, weight: Decimal) -> Result<(), EngineError> {
        let mut topology = self.topology.write();
        let edge = topology
            .edge_mut(id)
            .ok_or_else(|| EngineError::EdgeNotFound(id.clone()))?;
        edge.set_weight(weight);
        Ok(())
    }

    /// Every edge, sorted by id.
    pub fn links(&self) -> Vec<Edge> {
        let mut edges: Vec<Edge> = self.topology.read().edges().cloned().collect();
        edges.sort_by(|a, b| a.id().cmp(b.id()));
        edges
    }

    // --- Wallets ---

    pub fn balance(&self, id: &NodeId) -> Result<Decimal, EngineError> {
        let topology = self.topology.read();
        Ok(node_ref(&topology, id)?.balance())
    }

    /// The per-owner breakdown of the wallet held at `id`.
    pub fn wallet(&self, id: &NodeId) -> Result<Wallet, EngineError> {
        let topology = self.topology.read();
        Ok(node_ref(&topology, id)?.wallet_snapshot())
    }

    /// Replace the wallet at `id` with a single entry owned by the node itself.
    pub fn set_balance(&self, id: &NodeId, amount: Decimal) -> Result<(), EngineError> {
        if amount < Decimal::ZERO {
            return Err(EngineError::NegativeAmount(amount));
        }
        let topology = self.topology.read();
        let node = node_ref(&topology, id)?;
        node.wallet().lock().reset_to(id.clone(), amount);
        Ok(())
    }

    /// Move `amount` from the wallet at `from` to the wallet at `to`,
    /// keeping per-owner attribution.
    ///
    /// Fails with [`EngineError::InsufficientFunds`] without touching
    /// either wallet when `amount` exceeds the source balance.
    pub fn transfer(
        &self,
        from: &NodeId,
        to: &NodeId,
        amount: Decimal,
    ) -> Result<Decimal, EngineError> {
        if amount < Decimal::ZERO {
            return Err(EngineError::NegativeAmount(amount));
        }
        let topology = self.topology.read();
        let source = node_ref(&topology, from)?;
        let dest = node_ref(&topology, to)?;

        if from == to {
            let available = source.balance();
            if amount > available {
                return Err(EngineError::InsufficientFunds {
                    requested: amount,
                    available,
                });
            }
            return Ok(amount);
        }

        let (mut source_wallet, mut dest_wallet) = lock_pair(source, dest);
        let moved = source_wallet.transfer_to(&mut dest_wallet, amount)?;
        debug!("transferred {} from {} to {}", moved, from, to);
        Ok(moved)
    }

    /// Sum of every wallet in the network.
    pub fn total_balance(&self) -> Decimal {
        self.topology.read().nodes().map(Node::balance).sum()
    }

    // --- Players ---

    pub fn set_player_goal(&self, player: &NodeId, goal: &NodeId) -> Result<(), EngineError> {
        let mut topology = self.topology.write();
        match topology.node(goal).map(Node::kind) {
            Some(NodeKind::Goal) => {}
            _ => return Err(EngineError::GoalNotFound(goal.clone())),
        }
        player_mut(&mut topology, player)?.goal = Some(goal.clone());
        Ok(())
    }

    pub fn player_goal(&self, player: &NodeId) -> Result<Option<NodeId>, EngineError> {
        let topology = self.topology.read();
        Ok(player_ref(&topology, player)?.goal.clone())
    }

    pub fn set_player_table(
        &self,
        player: &NodeId,
        table: Option<TableId>,
    ) -> Result<(), EngineError> {
        let mut topology = self.topology.write();
        player_mut(&mut topology, player)?.table = table;
        Ok(())
    }

    pub fn player_table(&self, player: &NodeId) -> Result<Option<TableId>, EngineError> {
        let topology = self.topology.read();
        Ok(player_ref(&topology, player)?.table.clone())
    }

    /// Sum of every player's maximum outflow.
    pub fn total_player_inflow(&self) -> Decimal {
        total_player_inflow(&self.topology.read())
    }
}

fn validate_rates(leak: Decimal, activation: Decimal) -> Result<(), EngineError> {
    if leak < Decimal::ZERO || leak > Decimal::ONE {
        return Err(EngineError::InvalidLeakFraction(leak));
    }
    if activation < Decimal::ZERO {
        return Err(EngineError::NegativeAmount(activation));
    }
    Ok(())
}

pub(crate) fn total_player_inflow(topology: &Topology) -> Decimal {
    topology
        .nodes()
        .filter_map(Node::player)
        .map(|p| p.max_outflow)
        .sum()
}

pub(crate) fn node_ref<'a>(topology: &'a Topology, id: &NodeId) -> Result<&'a Node, EngineError> {
    topology
        .node(id)
        .ok_or_else(|| EngineError::NodeNotFound(id.clone()))
}

fn node_mut<'a>(topology: &'a mut Topology, id: &NodeId) -> Result<&'a mut Node, EngineError> {
    topology
        .node_mut(id)
        .ok_or_else(|| EngineError::NodeNotFound(id.clone()))
}

pub(crate) fn player_ref<'a>(
    topology: &'a Topology,
    id: &NodeId,
) -> Result<&'a PlayerState, EngineError> {
    topology
        .node(id)
        .and_then(Node::player)
        .ok_or_else(|| EngineError::PlayerNotFound(id.clone()))
}

pub(crate) fn player_mut<'a>(
    topology: &'a mut Topology,
    id: &NodeId,
) -> Result<&'a mut PlayerState, EngineError> {
    topology
        .node_mut(id)
        .and_then(Node::player_mut)
        .ok_or_else(|| EngineError::PlayerNotFound(id.clone()))
}

/// Lock two distinct wallets in ascending node id order.
///
/// The guards come back in argument order. `a` and `b` must be different nodes.
pub(crate) fn lock_pair<'a>(
    a: &'a Node,
    b: &'a Node,
) -> (MutexGuard<'a, Wallet>, MutexGuard<'a, Wallet>) {
    if a.id() <= b.id() {
        let first = a.wallet().lock();
        let second = b.wallet().lock();
        (first, second)
    } else {
        let second = b.wallet().lock();
        let first = a.wallet().lock();
        (first, second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_add_and_list_nodes() {
        let network = FundingNetwork::new();
        let p = network.add_policy("Arms Embargo", dec!(0.1)).unwrap();
        let g = network.add_goal("World Peace", dec!(0.2)).unwrap();
        let m = network.add_player("Matt", dec!(1000), dec!(5000)).unwrap();

        assert_eq!(network.node_ids(NodeKind::Policy), vec![p.clone()]);
        assert_eq!(network.node_kind(&g).unwrap(), NodeKind::Goal);
        assert_eq!(network.node_kind(&m).unwrap(), NodeKind::Player);
        assert!(network.contains_node(&p));
    }

    #[test]
    fn test_rejects_invalid_rates() {
        let network = FundingNetwork::new();
        assert_eq!(
            network.add_policy("Bad", dec!(1.5)),
            Err(EngineError::InvalidLeakFraction(dec!(1.5)))
        );
        let p = network.add_policy("Policy 1", dec!(0.1)).unwrap();
        assert!(network.set_activation(&p, dec!(-1)).is_err());
        assert!(network.add_player("Matt", dec!(-1), dec!(0)).is_err());
    }

    #[test]
    fn test_set_balance_replaces_wallet() {
        let network = FundingNetwork::new();
        let p = network.add_player("Matt", dec!(1000), dec!(5000)).unwrap();
        network.set_balance(&p, dec!(1000)).unwrap();
        assert_eq!(network.balance(&p).unwrap(), dec!(1000));
        network.set_balance(&p, dec!(40)).unwrap();
        let wallet = network.wallet(&p).unwrap();
        assert_eq!(wallet.len(), 1);
        assert_eq!(wallet.owned_by(&p), dec!(40));
    }

    #[test]
    fn test_transfer_keeps_attribution() {
        let network = FundingNetwork::new();
        let matt = network.add_player("Matt", dec!(1000), dec!(5000)).unwrap();
        let po1 = network.add_policy("Policy 1", dec!(0.1)).unwrap();
        network.set_balance(&matt, dec!(1000)).unwrap();

        network.transfer(&matt, &po1, dec!(60)).unwrap();
        assert_eq!(network.balance(&matt).unwrap(), dec!(940));
        assert_eq!(network.wallet(&po1).unwrap().owned_by(&matt), dec!(60));
    }

    #[test]
    fn test_transfer_insufficient_funds() {
        let network = FundingNetwork::new();
        let a = network.add_policy("A", dec!(0)).unwrap();
        let b = network.add_policy("B", dec!(0)).unwrap();
        network.set_balance(&a, dec!(100)).unwrap();

        let err = network.transfer(&a, &b, dec!(110)).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientFunds { .. }));
        assert_eq!(network.balance(&a).unwrap(), dec!(100));
        assert_eq!(network.balance(&b).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_transfer_to_self_is_noop() {
        let network = FundingNetwork::new();
        let a = network.add_policy("A", dec!(0)).unwrap();
        network.set_balance(&a, dec!(10)).unwrap();
        assert_eq!(network.transfer(&a, &a, dec!(5)).unwrap(), dec!(5));
        assert_eq!(network.balance(&a).unwrap(), dec!(10));
        assert!(network.transfer(&a, &a, dec!(11)).is_err());
    }

    #[test]
    fn test_player_goal_requires_goal_node() {
        let network = FundingNetwork::new();
        let matt = network.add_player("Matt", dec!(1000), dec!(5000)).unwrap();
        let policy = network.add_policy("Policy 1", dec!(0.1)).unwrap();
        let goal = network.add_goal("Goal 1", dec!(0.1)).unwrap();

        assert_eq!(
            network.set_player_goal(&matt, &policy),
            Err(EngineError::GoalNotFound(policy.clone()))
        );
        network.set_player_goal(&matt, &goal).unwrap();
        assert_eq!(network.player_goal(&matt).unwrap(), Some(goal));
        assert_eq!(
            network.player_goal(&policy),
            Err(EngineError::PlayerNotFound(policy))
        );
    }

    #[test]
    fn test_total_player_inflow() {
        let network = FundingNetwork::new();
        network.add_player("Matt", dec!(1000), dec!(0)).unwrap();
        network.add_player("Simon", dec!(250), dec!(0)).unwrap();
        network.add_policy("Policy 1", dec!(0)).unwrap();
        assert_eq!(network.total_player_inflow(), dec!(1250));
    }

    #[test]
    fn test_concurrent_opposite_transfers_do_not_deadlock() {
        let network = Arc::new(FundingNetwork::new());
        let a = network.add_policy("A", dec!(0)).unwrap();
        let b = network.add_policy("B", dec!(0)).unwrap();
        network.set_balance(&a, dec!(1000)).unwrap();
        network.set_balance(&b, dec!(1000)).unwrap();

        let handles: Vec<_> = [(a.clone(), b.clone()), (b.clone(), a.clone())]
            .into_iter()
            .map(|(from, to)| {
                let network = Arc::clone(&network);
                thread::spawn(move || {
                    for _ in 0..200 {
                        network.transfer(&from, &to, dec!(1)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(network.total_balance(), dec!(2000));
    }
}
