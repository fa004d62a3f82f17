//! Error taxonomy for engine operations.
//!
//! Every failure is returned synchronously to the caller, and no failing
//! operation leaves a partial mutation behind.

use crate::core::edge::EdgeId;
use crate::core::node::NodeId;
use crate::core::table::TableId;
use crate::core::wallet::WalletError;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A network definition or update refers to something that does not exist
    /// or carries an invalid field.
    #[error("invalid network definition: {0}")]
    Validation(String),

    #[error("node {0} not found")]
    NodeNotFound(NodeId),
    #[error("player {0} not found")]
    PlayerNotFound(NodeId),
    #[error("policy {0} not found")]
    PolicyNotFound(NodeId),
    #[error("goal {0} not found")]
    GoalNotFound(NodeId),
    #[error("edge {0} not found")]
    EdgeNotFound(EdgeId),
    #[error("table {0} not found")]
    TableNotFound(TableId),

    #[error("node {0} already exists")]
    DuplicateNode(NodeId),
    #[error("edge {0} already exists")]
    DuplicateEdgeId(EdgeId),
    #[error("an edge from {lower} to {higher} already exists")]
    DuplicateEdge { lower: NodeId, higher: NodeId },
    #[error("edge {lower} -> {higher} would introduce a cycle")]
    CycleDetected { lower: NodeId, higher: NodeId },
    #[error("cannot rank the network: cycle through node {0}")]
    RankCycle(NodeId),

    #[error("player {player} would commit {projected} against a maximum outflow of {max_outflow}")]
    CapacityExceeded {
        player: NodeId,
        projected: Decimal,
        max_outflow: Decimal,
    },
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },
    #[error("amount must not be negative, got {0}")]
    NegativeAmount(Decimal),
    #[error("leak rate must be within [0, 1], got {0}")]
    InvalidLeakFraction(Decimal),

    #[error("offer checksum does not match seller {seller} and policy {policy}")]
    ChecksumMismatch { seller: NodeId, policy: NodeId },
    #[error("offer {0} has already been redeemed")]
    OfferReplayed(String),
    #[error("player {buyer} already owns policy {policy}")]
    DuplicateOwnership { buyer: NodeId, policy: NodeId },
    #[error("player {seller} does not own policy {policy}")]
    NotOwner { seller: NodeId, policy: NodeId },
}

impl EngineError {
    /// True for failures of the trade authorization check.
    pub fn is_authorization_error(&self) -> bool {
        matches!(
            self,
            EngineError::ChecksumMismatch { .. } | EngineError::OfferReplayed(_)
        )
    }

    /// True for lookups of ids that do not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::NodeNotFound(_)
                | EngineError::PlayerNotFound(_)
                | EngineError::PolicyNotFound(_)
                | EngineError::GoalNotFound(_)
                | EngineError::EdgeNotFound(_)
                | EngineError::TableNotFound(_)
        )
    }
}

impl From<WalletError> for EngineError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::InsufficientFunds {
                requested,
                available,
            } => EngineError::InsufficientFunds {
                requested,
                available,
            },
            WalletError::InvalidLeakFraction(f) => EngineError::InvalidLeakFraction(f),
            WalletError::NegativeAmount(a) => EngineError::NegativeAmount(a),
        }
    }
}
