use crate::core::node::NodeId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EdgeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A directed funding relationship.
///
/// Money flows from `lower` (the funder) to `higher` (the recipient) at up
/// to `weight` per cycle. A zero-weight edge from a player to a policy
/// records ownership without active funding. Negative weights are allowed
/// on declared links and act as an extra leak on the recipient.
///
/// # Examples
///
/// ```
/// use funding_network::core::edge::Edge;
/// use funding_network::core::node::NodeId;
/// use rust_decimal_macros::dec;
///
/// let edge = Edge::new(NodeId::new("matt"), NodeId::new("arms-embargo"), dec!(50));
/// assert_eq!(edge.weight(), dec!(50));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    id: EdgeId,
    lower: NodeId,
    higher: NodeId,
    /// Declared funding rate per cycle.
    weight: Decimal,
    created_at: DateTime<Utc>,
}

impl Edge {
    pub fn new(lower: NodeId, higher: NodeId, weight: Decimal) -> Self {
        Self::with_id(EdgeId::generate(), lower, higher, weight)
    }

    /// Create an edge with a specific ID (network definitions carry their own).
    pub fn with_id(id: EdgeId, lower: NodeId, higher: NodeId, weight: Decimal) -> Self {
        Self {
            id,
            lower,
            higher,
            weight,
            created_at: Utc::now(),
        }
    }

    // --- Accessors ---

    pub fn id(&self) -> &EdgeId {
        &self.id
    }

    pub fn lower(&self) -> &NodeId {
        &self.lower
    }

    pub fn higher(&self) -> &NodeId {
        &self.higher
    }

    pub fn weight(&self) -> Decimal {
        self.weight
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn set_weight(&mut self, weight: Decimal) {
        self.weight = weight;
    }
}
