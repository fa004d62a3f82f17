use crate::core::table::TableId;
use crate::core::wallet::Wallet;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a node in the funding network.
///
/// Network definitions supply their own identifiers; nodes created at
/// runtime get a random UUID string.
///
/// # Examples
///
/// ```
/// use funding_network::core::node::NodeId;
///
/// let policy = NodeId::new("policy-arms-embargo");
/// let goal = NodeId::new("goal-world-peace");
/// assert_ne!(policy, goal);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Discriminant of [`NodeVariant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Policy,
    Goal,
    Player,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Policy => f.write_str("policy"),
            NodeKind::Goal => f.write_str("goal"),
            NodeKind::Player => f.write_str("player"),
        }
    }
}

/// State carried only by player nodes.
#[derive(Debug, Clone)]
pub struct PlayerState {
    /// Upper bound on the sum of the player's outgoing edge weights.
    pub max_outflow: Decimal,
    /// Amount the player's balance is reset to on every budget cycle.
    pub budget: Decimal,
    /// The goal this player is trying to fund.
    pub goal: Option<NodeId>,
    /// Table (group) membership.
    pub table: Option<TableId>,
    /// Secret bound into every offer the player signs.
    token: String,
}

impl PlayerState {
    pub fn new(max_outflow: Decimal, budget: Decimal) -> Self {
        Self {
            max_outflow,
            budget,
            goal: None,
            table: None,
            token: Uuid::new_v4().to_string(),
        }
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }

    pub(crate) fn rotate_token(&mut self) {
        self.token = Uuid::new_v4().to_string();
    }
}

/// Variant-specific payload of a node.
#[derive(Debug, Clone)]
pub enum NodeVariant {
    /// Intermediate routing node; tradable between players.
    Policy,
    /// Terminal node.
    Goal,
    /// Source node with an income stream.
    Player(PlayerState),
}

impl NodeVariant {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeVariant::Policy => NodeKind::Policy,
            NodeVariant::Goal => NodeKind::Goal,
            NodeVariant::Player(_) => NodeKind::Player,
        }
    }
}

/// A node in the funding network.
///
/// Shared fields (leak, activation, rank, wallet) are used by the leak and
/// propagation passes regardless of variant. Player-only state is reached
/// through [`Node::player`] after matching the variant.
///
/// The wallet sits behind its own mutex so that wallet mutations on
/// different nodes can proceed while the topology is only read-locked.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    name: String,
    short_name: Option<String>,
    group: Option<i64>,
    /// Fraction of the balance destroyed every cycle.
    leak: Decimal,
    /// Inflow required before the node forwards funds.
    activation: Decimal,
    max_level: Option<Decimal>,
    rank: u64,
    variant: NodeVariant,
    wallet: Mutex<Wallet>,
}

impl Node {
    fn with_variant(name: impl Into<String>, leak: Decimal, variant: NodeVariant) -> Self {
        Self {
            id: NodeId::generate(),
            name: name.into(),
            short_name: None,
            group: None,
            leak,
            activation: Decimal::ZERO,
            max_level: None,
            rank: 0,
            variant,
            wallet: Mutex::new(Wallet::new()),
        }
    }

    pub fn policy(name: impl Into<String>, leak: Decimal) -> Self {
        Self::with_variant(name, leak, NodeVariant::Policy)
    }

    pub fn goal(name: impl Into<String>, leak: Decimal) -> Self {
        Self::with_variant(name, leak, NodeVariant::Goal)
    }

    /// Players never leak.
    pub fn new_player(name: impl Into<String>, state: PlayerState) -> Self {
        Self::with_variant(name, Decimal::ZERO, NodeVariant::Player(state))
    }

    /// Replace the generated identifier (network definitions carry their own ids).
    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    pub fn with_activation(mut self, activation: Decimal) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_max_level(mut self, max_level: Decimal) -> Self {
        self.max_level = Some(max_level);
        self
    }

    // --- Accessors ---

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn short_name(&self) -> Option<&str> {
        self.short_name.as_deref()
    }

    pub fn group(&self) -> Option<i64> {
        self.group
    }

    pub fn leak(&self) -> Decimal {
        self.leak
    }

    pub fn activation(&self) -> Decimal {
        self.activation
    }

    pub fn max_level(&self) -> Option<Decimal> {
        self.max_level
    }

    pub fn rank(&self) -> u64 {
        self.rank
    }

    pub fn kind(&self) -> NodeKind {
        self.variant.kind()
    }

    pub fn variant(&self) -> &NodeVariant {
        &self.variant
    }

    pub fn player(&self) -> Option<&PlayerState> {
        match &self.variant {
            NodeVariant::Player(state) => Some(state),
            _ => None,
        }
    }

    pub(crate) fn player_mut(&mut self) -> Option<&mut PlayerState> {
        match &mut self.variant {
            NodeVariant::Player(state) => Some(state),
            _ => None,
        }
    }

    /// Current wallet total.
    pub fn balance(&self) -> Decimal {
        self.wallet.lock().total()
    }

    /// A copy of the wallet, decomposed by owner.
    pub fn wallet_snapshot(&self) -> Wallet {
        self.wallet.lock().clone()
    }

    pub(crate) fn wallet(&self) -> &Mutex<Wallet> {
        &self.wallet
    }

    // --- Mutators (callers hold the topology write lock) ---

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn set_short_name(&mut self, short_name: Option<String>) {
        self.short_name = short_name;
    }

    pub(crate) fn set_group(&mut self, group: Option<i64>) {
        self.group = group;
    }

    pub(crate) fn set_leak(&mut self, leak: Decimal) {
        self.leak = leak;
    }

    pub(crate) fn set_activation(&mut self, activation: Decimal) {
        self.activation = activation;
    }

    pub(crate) fn set_max_level(&mut self, max_level: Option<Decimal>) {
        self.max_level = max_level;
    }

    pub(crate) fn set_rank(&mut self, rank: u64) {
        self.rank = rank;
    }
}
