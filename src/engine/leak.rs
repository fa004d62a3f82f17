use crate::core::node::{Node, NodeId};
use crate::engine::{node_ref, FundingNetwork};
use crate::error::EngineError;
use crate::graph::topology::Topology;
use rust_decimal::Decimal;

/// The decay rate applied to a node each cycle.
///
/// The node's own leak plus the magnitude of every negative-weight edge
/// feeding into it, capped at 1.
pub fn effective_leak(topology: &Topology, node: &Node) -> Decimal {
    let tax: Decimal = topology
        .incoming_edges(node.id())
        .map(|e| e.weight())
        .filter(|w| *w < Decimal::ZERO)
        .map(|w| w.abs())
        .sum();
    (node.leak() + tax).max(Decimal::ZERO).min(Decimal::ONE)
}

/// Apply one cycle of decay to a node's wallet, returning the amount destroyed.
pub(crate) fn leak_node(topology: &Topology, node: &Node) -> Result<Decimal, EngineError> {
    let rate = effective_leak(topology, node);
    Ok(node.wallet().lock().leak(rate)?)
}

impl FundingNetwork {
    pub fn effective_leak(&self, id: &NodeId) -> Result<Decimal, EngineError> {
        let topology = self.topology();
        Ok(effective_leak(&topology, node_ref(&topology, id)?))
    }

    /// Leak a single node outside of a tick.
    pub fn leak_node(&self, id: &NodeId) -> Result<Decimal, EngineError> {
        let topology = self.topology();
        leak_node(&topology, node_ref(&topology, id)?)
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::FundingNetwork;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[test]
    fn test_leak_compounds_per_cycle() {
        let network = FundingNetwork::new();
        let n1 = network.add_policy("Policy 1", dec!(0.2)).unwrap();
        network.set_balance(&n1, dec!(15)).unwrap();

        network.leak_node(&n1).unwrap();
        assert_eq!(network.balance(&n1).unwrap(), dec!(12));
        network.leak_node(&n1).unwrap();
        assert_eq!(network.balance(&n1).unwrap(), dec!(9.6));
    }

    #[test]
    fn test_leak_all_and_nothing() {
        let network = FundingNetwork::new();
        let keep = network.add_policy("Policy 1", dec!(0)).unwrap();
        let drain = network.add_policy("Policy 2", dec!(1)).unwrap();
        network.set_balance(&keep, dec!(100)).unwrap();
        network.set_balance(&drain, dec!(100)).unwrap();

        assert_eq!(network.leak_node(&keep).unwrap(), Decimal::ZERO);
        assert_eq!(network.leak_node(&drain).unwrap(), dec!(100));
        assert_eq!(network.balance(&keep).unwrap(), dec!(100));
        assert_eq!(network.balance(&drain).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_negative_edge_taxes_recipient() {
        let network = FundingNetwork::new();
        let policy = network.add_policy("Policy 1", dec!(0.1)).unwrap();
        let goal = network.add_goal("Goal 1", dec!(0.1)).unwrap();
        network.add_link(&policy, &goal, dec!(-0.3)).unwrap();

        assert_eq!(network.effective_leak(&goal).unwrap(), dec!(0.4));
        assert_eq!(network.effective_leak(&policy).unwrap(), dec!(0.1));

        network.set_balance(&goal, dec!(100)).unwrap();
        network.leak_node(&goal).unwrap();
        assert_eq!(network.balance(&goal).unwrap(), dec!(60));
    }

    #[test]
    fn test_effective_leak_is_capped() {
        let network = FundingNetwork::new();
        let a = network.add_policy("A", dec!(0)).unwrap();
        let b = network.add_policy("B", dec!(0)).unwrap();
        let goal = network.add_goal("Goal 1", dec!(0.5)).unwrap();
        network.add_link(&a, &goal, dec!(-0.4)).unwrap();
        network.add_link(&b, &goal, dec!(-0.4)).unwrap();
        assert_eq!(network.effective_leak(&goal).unwrap(), Decimal::ONE);
    }
}
