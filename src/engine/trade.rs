//! Checksum-authorised policy trades between players.
//!
//! An offer is stateless: it carries the seller, policy, price and a random
//! nonce, plus a SHA-256 checksum binding all four to the seller's secret
//! token. Buying recomputes the checksum with the seller's current token,
//! so an altered offer fails, and every redeemed checksum is remembered,
//! so each offer can be bought once. Rotating the seller's token voids
//! every offer it has outstanding.

use crate::core::edge::Edge;
use crate::core::node::{Node, NodeId, NodeKind};
use crate::engine::{lock_pair, node_ref, player_mut, player_ref, FundingNetwork};
use crate::error::EngineError;
use crate::graph::topology::Topology;
use log::{info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const OFFER_DOMAIN: &[u8] = b"FUNDING_NETWORK_POLICY_OFFER_V1";

/// A signed listing of one policy at a fixed price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyOffer {
    pub seller_id: NodeId,
    pub policy_id: NodeId,
    pub price: Decimal,
    pub nonce: String,
    pub checksum: String,
}

/// Canonical packing of a price: hex of the normalised decimal's binary
/// form, so `20` and `20.00` sign identically.
pub fn pack_price(price: Decimal) -> String {
    hex::encode(price.normalize().serialize())
}

/// Domain-separated SHA-256 over length-prefixed offer fields.
pub fn offer_checksum(
    seller: &NodeId,
    policy: &NodeId,
    price: Decimal,
    nonce: &str,
    token: &str,
) -> String {
    let packed = pack_price(price);
    let mut hasher = Sha256::new();
    hasher.update(OFFER_DOMAIN);
    for field in [seller.as_str(), policy.as_str(), packed.as_str(), nonce, token] {
        hasher.update((field.len() as u32).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn policy_ref<'a>(topology: &'a Topology, id: &NodeId) -> Result<&'a Node, EngineError> {
    topology
        .node(id)
        .filter(|n| n.kind() == NodeKind::Policy)
        .ok_or_else(|| EngineError::PolicyNotFound(id.clone()))
}

impl FundingNetwork {
    /// List a policy the seller owns for `price`.
    pub fn offer_policy(
        &self,
        seller: &NodeId,
        policy: &NodeId,
        price: Decimal,
    ) -> Result<PolicyOffer, EngineError> {
        if price < Decimal::ZERO {
            return Err(EngineError::NegativeAmount(price));
        }
        let topology = self.topology();
        let token = player_ref(&topology, seller)?.token();
        policy_ref(&topology, policy)?;
        if topology.find_edge(seller, policy).is_none() {
            return Err(EngineError::NotOwner {
                seller: seller.clone(),
                policy: policy.clone(),
            });
        }

        let nonce = Uuid::new_v4().to_string();
        let checksum = offer_checksum(seller, policy, price, &nonce, token);
        info!("{} offered {} for {}", seller, policy, price);
        Ok(PolicyOffer {
            seller_id: seller.clone(),
            policy_id: policy.clone(),
            price,
            nonce,
            checksum,
        })
    }

    /// Buy the policy in `offer`.
    ///
    /// Checks run in order: checksum, replay, buyer funds, duplicate
    /// ownership, seller ownership. On success the price moves from the
    /// buyer's wallet to the seller's and the buyer gets a zero-rate edge
    /// to the policy. Either all of that happens or none of it.
    pub fn buy_policy(&self, buyer: &NodeId, offer: &PolicyOffer) -> Result<(), EngineError> {
        let mut topology = self.topology_mut();
        let seller = &offer.seller_id;
        let policy = &offer.policy_id;

        player_ref(&topology, buyer)?;
        let token = player_ref(&topology, seller)?.token();
        policy_ref(&topology, policy)?;

        let expected = offer_checksum(seller, policy, offer.price, &offer.nonce, token);
        if expected != offer.checksum {
            warn!("rejected offer of {} by {}: checksum mismatch", policy, seller);
            return Err(EngineError::ChecksumMismatch {
                seller: seller.clone(),
                policy: policy.clone(),
            });
        }
        let mut redeemed = self.redeemed_offers.lock();
        if redeemed
            .get(seller)
            .map_or(false, |checksums| checksums.contains(&offer.checksum))
        {
            warn!("rejected offer of {} by {}: already redeemed", policy, seller);
            return Err(EngineError::OfferReplayed(offer.checksum.clone()));
        }

        if offer.price < Decimal::ZERO {
            return Err(EngineError::NegativeAmount(offer.price));
        }
        let available = node_ref(&topology, buyer)?.balance();
        if available < offer.price {
            return Err(EngineError::InsufficientFunds {
                requested: offer.price,
                available,
            });
        }
        if topology.find_edge(buyer, policy).is_some() {
            return Err(EngineError::DuplicateOwnership {
                buyer: buyer.clone(),
                policy: policy.clone(),
            });
        }
        if topology.find_edge(seller, policy).is_none() {
            return Err(EngineError::NotOwner {
                seller: seller.clone(),
                policy: policy.clone(),
            });
        }

        let edge = topology.add_edge(Edge::new(buyer.clone(), policy.clone(), Decimal::ZERO))?;
        if let Err(err) = settle(&topology, buyer, seller, offer.price) {
            topology.remove_edge(&edge)?;
            return Err(err);
        }
        redeemed
            .entry(seller.clone())
            .or_default()
            .insert(offer.checksum.clone());
        info!("{} bought {} from {} for {}", buyer, policy, seller, offer.price);
        Ok(())
    }

    /// Issue a new secret token for `player`, voiding its outstanding offers.
    pub fn rotate_player_token(&self, player: &NodeId) -> Result<(), EngineError> {
        let mut topology = self.topology_mut();
        player_mut(&mut topology, player)?.rotate_token();
        self.redeemed_offers.lock().remove(player);
        info!("rotated token of {}", player);
        Ok(())
    }
}

/// Debit the buyer proportionally and credit the seller under its own id.
fn settle(
    topology: &Topology,
    buyer: &NodeId,
    seller: &NodeId,
    price: Decimal,
) -> Result<(), EngineError> {
    let buyer_node = node_ref(topology, buyer)?;
    let seller_node = node_ref(topology, seller)?;
    let (mut buyer_wallet, mut seller_wallet) = lock_pair(buyer_node, seller_node);
    let paid: Decimal = buyer_wallet.withdraw(price)?.values().sum();
    seller_wallet.deposit(seller.clone(), paid)?;
    Ok(())
}
