//! # funding-network
//!
//! Simulation engine for a multiplayer funding game.
//!
//! Players fund policies, policies feed other policies and goals, and every
//! node holds a wallet that remembers who each unit of money came from. A
//! tick walks the acyclic funding graph in rank order, leaking and
//! forwarding balances so money cascades from players down to goals.
//!
//! ## Architecture
//!
//! - **core**: Nodes, edges, tables and owner-tracked wallets
//! - **graph**: Acyclic topology store and rank computation
//! - **engine**: Leak, propagation, funding limits, policy trades and the tick loop
//! - **game**: Configuration, player setup, tables, projections and the season clock
//! - **simulation**: Random network generation for testing and benchmarks

pub mod core;
pub mod engine;
pub mod error;
pub mod game;
pub mod graph;
pub mod simulation;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::core::edge::{Edge, EdgeId};
    pub use crate::core::node::{Node, NodeId, NodeKind};
    pub use crate::core::table::TableId;
    pub use crate::core::wallet::Wallet;
    pub use crate::engine::{FundingNetwork, FundingRequest, PolicyOffer, TickReport};
    pub use crate::error::EngineError;
    pub use crate::game::config::GameConfig;
    pub use crate::game::network_def::{NetworkDefinition, NodeDefinition};
    pub use crate::game::Game;
}
