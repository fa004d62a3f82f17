use crate::core::node::NodeId;
use crate::engine::{lock_pair, node_ref, FundingNetwork};
use crate::error::EngineError;
use crate::graph::topology::Topology;
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What one node did during a propagation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeFlow {
    pub node: NodeId,
    /// Current inflow when the node was processed.
    pub inflow: Decimal,
    /// `inflow` as a fraction of the total player inflow.
    pub inflow_share: Decimal,
    /// Amount forwarded to children.
    pub forwarded: Decimal,
}

/// Balance-bounded outflow and inflow for nodes of one topology.
///
/// Values are memoised, so a calculator describes the wallets as they
/// were when it first looked at them. Build a fresh one after moving money.
pub struct FlowCalculator<'a> {
    topology: &'a Topology,
    outflow: HashMap<NodeId, Decimal>,
}

impl<'a> FlowCalculator<'a> {
    pub fn new(topology: &'a Topology) -> Self {
        Self {
            topology,
            outflow: HashMap::new(),
        }
    }

    /// What the node would forward right now: nothing if it is empty or
    /// inactive, otherwise its declared positive weights bounded by its balance.
    pub fn current_outflow(&mut self, id: &NodeId) -> Decimal {
        if let Some(value) = self.outflow.get(id) {
            return *value;
        }
        let topology = self.topology;
        let value = match topology.node(id) {
            None => Decimal::ZERO,
            Some(node) => {
                let balance = node.balance();
                if balance.is_zero() || !self.is_active(id) {
                    Decimal::ZERO
                } else {
                    topology.total_outgoing_weight(id).min(balance)
                }
            }
        };
        self.outflow.insert(id.clone(), value);
        value
    }

    /// Sum of the current outflows of every funder.
    pub fn current_inflow(&mut self, id: &NodeId) -> Decimal {
        let topology = self.topology;
        topology
            .parents(id)
            .into_iter()
            .map(|parent| self.current_outflow(parent))
            .sum()
    }

    pub fn is_active(&mut self, id: &NodeId) -> bool {
        match self.topology.node(id) {
            Some(node) => {
                let activation = node.activation();
                self.current_inflow(id) >= activation
            }
            None => false,
        }
    }
}

/// Distribute one node's balance across its positive outgoing edges.
///
/// Skipped when the node is inactive, empty, or has no positive weights.
/// Otherwise every edge receives `weight * min(1, balance / total_weight)`,
/// so recipients are scaled down together when demand exceeds supply.
pub(crate) fn propagate_node(
    topology: &Topology,
    id: &NodeId,
    total_player_inflow: Decimal,
) -> Result<NodeFlow, EngineError> {
    let node = node_ref(topology, id)?;
    let mut flow = FlowCalculator::new(topology);
    let inflow = flow.current_inflow(id);
    // Saturates at one when the quotient is too large to represent.
    let inflow_share = if total_player_inflow > Decimal::ZERO {
        inflow
            .checked_div(total_player_inflow)
            .unwrap_or(Decimal::ONE)
    } else {
        Decimal::ZERO
    };
    let mut report = NodeFlow {
        node: id.clone(),
        inflow,
        inflow_share,
        forwarded: Decimal::ZERO,
    };

    let balance = node.balance();
    let total_weight = topology.total_outgoing_weight(id);
    if inflow < node.activation() || balance.is_zero() || total_weight.is_zero() {
        return Ok(report);
    }

    let factor = balance
        .checked_div(total_weight)
        .map_or(Decimal::ONE, |f| f.min(Decimal::ONE));
    for edge in topology
        .outgoing_edges(id)
        .filter(|e| e.weight() > Decimal::ZERO)
    {
        let child = node_ref(topology, edge.higher())?;
        let (mut source, mut dest) = lock_pair(node, child);
        let amount = (edge.weight() * factor).min(source.total());
        if amount > Decimal::ZERO {
            report.forwarded += source.transfer_to(&mut dest, amount)?;
        }
    }

    debug!(
        "{} forwarded {} of {} (inflow {})",
        id, report.forwarded, balance, inflow
    );
    Ok(report)
}

impl FundingNetwork {
    pub fn current_outflow(&self, id: &NodeId) -> Result<Decimal, EngineError> {
        let topology = self.topology();
        node_ref(&topology, id)?;
        Ok(FlowCalculator::new(&topology).current_outflow(id))
    }

    pub fn current_inflow(&self, id: &NodeId) -> Result<Decimal, EngineError> {
        let topology = self.topology();
        node_ref(&topology, id)?;
        Ok(FlowCalculator::new(&topology).current_inflow(id))
    }

    /// True when the node's current inflow meets its activation threshold.
    pub fn is_active(&self, id: &NodeId) -> Result<bool, EngineError> {
        let topology = self.topology();
        node_ref(&topology, id)?;
        Ok(FlowCalculator::new(&topology).is_active(id))
    }

    /// Propagate a single node outside of a tick.
    pub fn propagate(&self, id: &NodeId) -> Result<NodeFlow, EngineError> {
        let topology = self.topology();
        let total = super::total_player_inflow(&topology);
        propagate_node(&topology, id, total)
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::FundingNetwork;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[test]
    fn test_forwards_declared_weights_when_covered() {
        let network = FundingNetwork::new();
        let n1 = network.add_policy("Policy 1", dec!(0.5)).unwrap();
        let n2 = network.add_policy("Policy 2", dec!(0.5)).unwrap();
        let n3 = network.add_policy("Policy 3", dec!(0.5)).unwrap();
        network.add_link(&n1, &n2, dec!(15)).unwrap();
        network.add_link(&n1, &n3, dec!(30)).unwrap();
        network.set_balance(&n1, dec!(100)).unwrap();

        let flow = network.propagate(&n1).unwrap();
        assert_eq!(flow.forwarded, dec!(45));
        assert_eq!(network.balance(&n1).unwrap(), dec!(55));
        assert_eq!(network.balance(&n2).unwrap(), dec!(15));
        assert_eq!(network.balance(&n3).unwrap(), dec!(30));
    }

    #[test]
    fn test_scales_all_recipients_under_scarcity() {
        let network = FundingNetwork::new();
        let n1 = network.add_policy("Policy 1", dec!(0)).unwrap();
        let n2 = network.add_policy("Policy 2", dec!(0)).unwrap();
        let n3 = network.add_policy("Policy 3", dec!(0)).unwrap();
        network.add_link(&n1, &n2, dec!(100)).unwrap();
        network.add_link(&n1, &n3, dec!(300)).unwrap();
        network.set_balance(&n1, dec!(200)).unwrap();

        network.propagate(&n1).unwrap();
        assert_eq!(network.balance(&n1).unwrap(), Decimal::ZERO);
        assert_eq!(network.balance(&n2).unwrap(), dec!(50));
        assert_eq!(network.balance(&n3).unwrap(), dec!(150));
    }

    #[test]
    fn test_inflow_share_saturates_for_tiny_player_inflow() {
        let network = FundingNetwork::new();
        network.add_player("Matt", Decimal::new(1, 22), dec!(0)).unwrap();
        let policy = network.add_policy("Policy 1", dec!(0)).unwrap();
        let goal = network.add_goal("Goal 1", dec!(0)).unwrap();
        network.add_link(&policy, &goal, dec!(1000000000)).unwrap();
        network.set_balance(&policy, dec!(5000000000)).unwrap();

        let report = network.tick().unwrap();
        let goal_flow = report.flows.iter().find(|f| f.node == goal).unwrap();
        assert_eq!(goal_flow.inflow, dec!(1000000000));
        assert_eq!(goal_flow.inflow_share, Decimal::ONE);
        assert_eq!(network.balance(&goal).unwrap(), dec!(1000000000));
    }

    #[test]
    fn test_inactive_node_holds_funds() {
        let network = FundingNetwork::new();
        let n1 = network.add_policy("Policy 1", dec!(0)).unwrap();
        let n2 = network.add_policy("Policy 2", dec!(0)).unwrap();
        network.add_link(&n1, &n2, dec!(5)).unwrap();
        network.set_activation(&n1, dec!(2)).unwrap();
        network.set_balance(&n1, dec!(10)).unwrap();

        assert!(!network.is_active(&n1).unwrap());
        let flow = network.propagate(&n1).unwrap();
        assert_eq!(flow.forwarded, Decimal::ZERO);
        assert_eq!(network.balance(&n1).unwrap(), dec!(10));
    }

    #[test]
    fn test_negative_edges_carry_no_funds() {
        let network = FundingNetwork::new();
        let n1 = network.add_policy("Policy 1", dec!(0)).unwrap();
        let n2 = network.add_policy("Policy 2", dec!(0)).unwrap();
        network.add_link(&n1, &n2, dec!(-0.2)).unwrap();
        network.set_balance(&n1, dec!(10)).unwrap();

        assert_eq!(network.current_outflow(&n1).unwrap(), Decimal::ZERO);
        network.propagate(&n1).unwrap();
        assert_eq!(network.balance(&n2).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_outflow_bounded_by_balance() {
        let network = FundingNetwork::new();
        let n1 = network.add_policy("Policy 1", dec!(0)).unwrap();
        let n2 = network.add_policy("Policy 2", dec!(0)).unwrap();
        network.add_link(&n1, &n2, dec!(30)).unwrap();

        assert_eq!(network.current_outflow(&n1).unwrap(), Decimal::ZERO);
        network.set_balance(&n1, dec!(25)).unwrap();
        assert_eq!(network.current_outflow(&n1).unwrap(), dec!(25));
        assert_eq!(network.current_inflow(&n2).unwrap(), dec!(25));
        network.set_balance(&n1, dec!(100)).unwrap();
        assert_eq!(network.current_inflow(&n2).unwrap(), dec!(30));
    }
}
