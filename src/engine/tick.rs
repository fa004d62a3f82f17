use crate::core::node::NodeId;
use crate::engine::leak::leak_node;
use crate::engine::propagate::{propagate_node, NodeFlow};
use crate::engine::{node_ref, total_player_inflow, FundingNetwork};
use crate::error::EngineError;
use crate::graph::topology::Topology;
use log::{debug, info};
use parking_lot::{RwLockUpgradableReadGuard, RwLockWriteGuard};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Summary of one simulation cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    /// Nodes in the order they were processed.
    pub processed: Vec<NodeId>,
    /// Total destroyed by leaking.
    pub leaked: Decimal,
    /// Total moved along edges.
    pub forwarded: Decimal,
    pub total_player_inflow: Decimal,
    pub flows: Vec<NodeFlow>,
}

impl FundingNetwork {
    /// Take the tick lock, re-ranking first if the topology changed.
    ///
    /// Only one upgradable guard exists at a time, so tick passes never
    /// overlap; plain readers still proceed alongside.
    fn ranked_topology(&self) -> Result<RwLockUpgradableReadGuard<'_, Topology>, EngineError> {
        let guard = self.topology.upgradable_read();
        if !guard.is_dirty() {
            return Ok(guard);
        }
        let mut write = RwLockUpgradableReadGuard::upgrade(guard);
        write.rerank()?;
        info!("ranked {} nodes", write.node_count());
        Ok(RwLockWriteGuard::downgrade_to_upgradable(write))
    }

    /// Recompute ranks now if the topology has changed since the last pass.
    pub fn rank_nodes(&self) -> Result<(), EngineError> {
        self.ranked_topology().map(drop)
    }

    /// Run one cycle: each node, in ascending rank order, leaks and then
    /// forwards its balance.
    ///
    /// Funds released upstream reach downstream nodes later in the same
    /// pass, since those rank higher. An error aborts the rest of the pass.
    pub fn tick(&self) -> Result<TickReport, EngineError> {
        let topology = self.ranked_topology()?;
        let total = total_player_inflow(&topology);
        let mut report = TickReport {
            total_player_inflow: total,
            ..TickReport::default()
        };

        for id in topology.ranked_order() {
            let node = node_ref(&topology, id)?;
            report.leaked += leak_node(&topology, node)?;
            let flow = propagate_node(&topology, id, total)?;
            report.forwarded += flow.forwarded;
            report.flows.push(flow);
            report.processed.push(id.clone());
        }

        info!(
            "tick processed {} nodes: leaked {}, forwarded {}",
            report.processed.len(),
            report.leaked,
            report.forwarded
        );
        Ok(report)
    }

    /// Leak every node once. Returns the total destroyed.
    pub fn do_leak(&self) -> Result<Decimal, EngineError> {
        let topology = self.ranked_topology()?;
        let mut leaked = Decimal::ZERO;
        for id in topology.ranked_order() {
            leaked += leak_node(&topology, node_ref(&topology, id)?)?;
        }
        debug!("leaked {}", leaked);
        Ok(leaked)
    }

    /// Propagate every node once, in rank order.
    pub fn do_propagate_funds(&self) -> Result<Vec<NodeFlow>, EngineError> {
        let topology = self.ranked_topology()?;
        let total = total_player_inflow(&topology);
        topology
            .ranked_order()
            .iter()
            .map(|id| propagate_node(&topology, id, total))
            .collect()
    }

    /// Reset every player's wallet to its budget.
    ///
    /// The budget replaces whatever the player held; unspent funds do not
    /// carry over.
    pub fn do_replenish_budget(&self) -> Result<usize, EngineError> {
        let topology = self.ranked_topology()?;
        let mut players = 0;
        for node in topology.nodes() {
            if let Some(state) = node.player() {
                node.wallet().lock().reset_to(node.id().clone(), state.budget);
                players += 1;
            }
        }
        info!("replenished {} player budgets", players);
        Ok(players)
    }

    /// Empty every wallet in the network.
    pub fn reset_wallets(&self) {
        let topology = self.topology.write();
        topology.nodes().for_each(|n| n.wallet().lock().clear());
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::FundingNetwork;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[test]
    fn test_tick_reranks_dirty_topology() {
        let network = FundingNetwork::new();
        let a = network.add_policy("A", dec!(0)).unwrap();
        let b = network.add_policy("B", dec!(0)).unwrap();
        network.add_link(&a, &b, dec!(1)).unwrap();
        assert!(network.topology().is_dirty());

        let report = network.tick().unwrap();
        assert!(!network.topology().is_dirty());
        assert_eq!(report.processed, vec![a, b.clone()]);
        assert_eq!(network.topology().node(&b).unwrap().rank(), 2);
    }

    #[test]
    fn test_tick_leaks_then_forwards() {
        let network = FundingNetwork::new();
        let a = network.add_policy("A", dec!(0.5)).unwrap();
        let b = network.add_goal("B", dec!(0)).unwrap();
        network.add_link(&a, &b, dec!(10)).unwrap();
        network.set_balance(&a, dec!(100)).unwrap();

        let report = network.tick().unwrap();
        assert_eq!(report.leaked, dec!(50));
        assert_eq!(report.forwarded, dec!(10));
        assert_eq!(network.balance(&a).unwrap(), dec!(40));
        assert_eq!(network.balance(&b).unwrap(), dec!(10));
    }

    #[test]
    fn test_replenish_replaces_balance() {
        let network = FundingNetwork::new();
        let matt = network.add_player("Matt", dec!(1000), dec!(1500)).unwrap();
        let policy = network.add_policy("Policy 1", dec!(1)).unwrap();
        network.set_balance(&matt, dec!(1500)).unwrap();
        network.transfer(&matt, &policy, dec!(100)).unwrap();

        assert_eq!(network.do_replenish_budget().unwrap(), 1);
        assert_eq!(network.balance(&matt).unwrap(), dec!(1500));
        assert_eq!(network.balance(&policy).unwrap(), dec!(100));
    }

    #[test]
    fn test_do_leak_covers_every_node() {
        let network = FundingNetwork::new();
        let n1 = network.add_policy("Policy 1", dec!(0.5)).unwrap();
        let n2 = network.add_policy("Policy 2", dec!(0.2)).unwrap();
        network.set_balance(&n1, dec!(100)).unwrap();
        network.set_balance(&n2, dec!(100)).unwrap();

        network.do_leak().unwrap();
        assert_eq!(network.balance(&n1).unwrap(), dec!(50));
        assert_eq!(network.balance(&n2).unwrap(), dec!(80));
        network.do_leak().unwrap();
        assert_eq!(network.balance(&n1).unwrap(), dec!(25));
        assert_eq!(network.balance(&n2).unwrap(), dec!(64));
    }

    #[test]
    fn test_reset_wallets() {
        let network = FundingNetwork::new();
        let n1 = network.add_policy("Policy 1", dec!(0.5)).unwrap();
        network.set_balance(&n1, dec!(100)).unwrap();
        network.reset_wallets();
        assert_eq!(network.balance(&n1).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_rank_nodes_on_empty_network() {
        let network = FundingNetwork::new();
        assert!(network.rank_nodes().is_ok());
    }
}
