use crate::core::edge::{Edge, EdgeId};
use crate::core::node::NodeId;
use crate::engine::{player_ref, FundingNetwork};
use crate::error::EngineError;
use crate::graph::topology::Topology;
use log::{info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One destination in a player's funding list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingRequest {
    pub to_id: NodeId,
    pub amount: Decimal,
}

/// A player's funding edge as reported back to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingEntry {
    pub from_id: NodeId,
    pub to_id: NodeId,
    pub amount: Decimal,
}

fn check_capacity(
    topology: &Topology,
    player: &NodeId,
    projected: Decimal,
) -> Result<(), EngineError> {
    let max_outflow = player_ref(topology, player)?.max_outflow;
    if projected > max_outflow {
        warn!(
            "player {} would commit {} over a maximum outflow of {}",
            player, projected, max_outflow
        );
        return Err(EngineError::CapacityExceeded {
            player: player.clone(),
            projected,
            max_outflow,
        });
    }
    Ok(())
}

impl FundingNetwork {
    /// Set the rate at which `player` funds `target`, creating the edge if needed.
    ///
    /// The sum of the player's declared outgoing weights, with this edge at
    /// its new rate, must stay within the player's maximum outflow.
    pub fn fund(
        &self,
        player: &NodeId,
        target: &NodeId,
        rate: Decimal,
    ) -> Result<EdgeId, EngineError> {
        if rate < Decimal::ZERO {
            return Err(EngineError::NegativeAmount(rate));
        }
        let mut topology = self.topology_mut();
        player_ref(&topology, player)?;
        if !topology.contains_node(target) {
            return Err(EngineError::NodeNotFound(target.clone()));
        }

        let existing = topology
            .find_edge(player, target)
            .map(|e| (e.id().clone(), e.weight().max(Decimal::ZERO)));
        let committed = topology.total_outgoing_weight(player);
        let projected = match &existing {
            Some((_, weight)) => committed - *weight + rate,
            None => committed + rate,
        };
        check_capacity(&topology, player, projected)?;

        let id = match existing {
            Some((id, _)) => {
                if let Some(edge) = topology.edge_mut(&id) {
                    edge.set_weight(rate);
                }
                topology.mark_dirty();
                id
            }
            None => topology.add_edge(Edge::new(player.clone(), target.clone(), rate))?,
        };
        info!("player {} funds {} at {}", player, target, rate);
        Ok(id)
    }

    /// Replace every outgoing weight of `player` in one step.
    ///
    /// Destinations listed more than once take their last amount. Existing
    /// edges to destinations not listed are set to zero, not removed. Fails
    /// without changing anything if the new total exceeds the player's
    /// maximum outflow, an amount is negative, or a destination is unknown.
    pub fn set_funding(
        &self,
        player: &NodeId,
        requests: &[FundingRequest],
    ) -> Result<(), EngineError> {
        let mut wanted: BTreeMap<&NodeId, Decimal> = BTreeMap::new();
        for request in requests {
            if request.amount < Decimal::ZERO {
                return Err(EngineError::NegativeAmount(request.amount));
            }
            wanted.insert(&request.to_id, request.amount);
        }

        let mut topology = self.topology_mut();
        player_ref(&topology, player)?;

        let projected: Decimal = wanted.values().copied().sum();
        check_capacity(&topology, player, projected)?;

        let mut updates: Vec<(EdgeId, Decimal)> = Vec::new();
        let mut creations: Vec<Edge> = Vec::new();
        for (target, amount) in &wanted {
            match topology.find_edge(player, target) {
                Some(edge) => updates.push((edge.id().clone(), *amount)),
                None => {
                    topology.check_new_edge(player, target)?;
                    creations.push(Edge::new(player.clone(), (*target).clone(), *amount));
                }
            }
        }
        // Negative links on the player are not part of its funding list.
        for edge in topology.outgoing_edges(player) {
            if edge.weight() > Decimal::ZERO && !wanted.contains_key(edge.higher()) {
                updates.push((edge.id().clone(), Decimal::ZERO));
            }
        }

        for (id, amount) in updates {
            if let Some(edge) = topology.edge_mut(&id) {
                edge.set_weight(amount);
            }
        }
        for edge in creations {
            topology.add_edge(edge)?;
        }
        topology.mark_dirty();
        info!("player {} set funding for {} destinations", player, wanted.len());
        Ok(())
    }

    /// The player's outgoing edges as `{from_id, to_id, amount}`, sorted by destination.
    pub fn get_funding(&self, player: &NodeId) -> Result<Vec<FundingEntry>, EngineError> {
        let topology = self.topology();
        player_ref(&topology, player)?;
        let mut entries: Vec<FundingEntry> = topology
            .outgoing_edges(player)
            .map(|e| FundingEntry {
                from_id: player.clone(),
                to_id: e.higher().clone(),
                amount: e.weight(),
            })
            .collect();
        entries.sort_by(|a, b| a.to_id.cmp(&b.to_id));
        Ok(entries)
    }
}
