use crate::core::node::NodeId;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors arising from wallet operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WalletError {
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },
    #[error("leak fraction must be within [0, 1], got {0}")]
    InvalidLeakFraction(Decimal),
    #[error("amount must not be negative, got {0}")]
    NegativeAmount(Decimal),
}

/// Decimal places every wallet entry is kept to.
///
/// Amounts are truncated to this scale on the way in, so sums and
/// differences of entries never exceed `Decimal` precision and transfers
/// credit exactly what they debit.
pub const WALLET_SCALE: u32 = 12;

fn truncate(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(WALLET_SCALE, RoundingStrategy::ToZero)
}

/// The balance physically held at a node, decomposed by the owner on
/// whose behalf each part is held.
///
/// Money keeps its attribution as it moves: when a policy forwards funds
/// to a goal, each contributing player's share travels with it, so the
/// goal wallet can report how much of its balance came from each player.
///
/// Invariants: every entry is positive (zeroed entries are dropped), there
/// is one entry per owner, and `total()` is the sum of the entries.
///
/// # Examples
///
/// ```
/// use funding_network::core::node::NodeId;
/// use funding_network::core::wallet::Wallet;
/// use rust_decimal_macros::dec;
///
/// let mut wallet = Wallet::with_owner(NodeId::new("matt"), dec!(15));
/// wallet.leak(dec!(0.2)).unwrap();
/// assert_eq!(wallet.total(), dec!(12));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wallet {
    /// owner -> amount held on the owner's behalf
    entries: BTreeMap<NodeId, Decimal>,
}

impl Wallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A wallet holding `amount` on behalf of a single owner.
    pub fn with_owner(owner: NodeId, amount: Decimal) -> Self {
        let mut wallet = Self::new();
        let amount = truncate(amount);
        if amount > Decimal::ZERO {
            wallet.entries.insert(owner, amount);
        }
        wallet
    }

    /// Sum of all owner entries.
    pub fn total(&self) -> Decimal {
        self.entries.values().sum()
    }

    /// Amount held on behalf of `owner`.
    pub fn owned_by(&self, owner: &NodeId) -> Decimal {
        self.entries.get(owner).copied().unwrap_or(Decimal::ZERO)
    }

    /// All owner entries.
    pub fn entries(&self) -> &BTreeMap<NodeId, Decimal> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add `amount` to the owner's entry, creating it if needed.
    pub fn deposit(&mut self, owner: NodeId, amount: Decimal) -> Result<(), WalletError> {
        if amount < Decimal::ZERO {
            return Err(WalletError::NegativeAmount(amount));
        }
        let amount = truncate(amount);
        if amount > Decimal::ZERO {
            *self.entries.entry(owner).or_insert(Decimal::ZERO) += amount;
        }
        Ok(())
    }

    /// Scale every entry by `1 - fraction`, destroying the difference.
    ///
    /// Returns the amount destroyed.
    pub fn leak(&mut self, fraction: Decimal) -> Result<Decimal, WalletError> {
        if fraction < Decimal::ZERO || fraction > Decimal::ONE {
            return Err(WalletError::InvalidLeakFraction(fraction));
        }
        if fraction.is_zero() {
            return Ok(Decimal::ZERO);
        }

        let keep = Decimal::ONE - fraction;
        let mut destroyed = Decimal::ZERO;
        for amount in self.entries.values_mut() {
            let remaining = truncate(*amount * keep);
            destroyed += *amount - remaining;
            *amount = remaining;
        }
        self.prune();
        Ok(destroyed)
    }

    /// Remove `amount` from the wallet, taking from each owner in
    /// proportion to its share of the total.
    ///
    /// `amount` is truncated to [`WALLET_SCALE`] places. Returns the
    /// per-owner amounts removed, which sum exactly to the truncated
    /// amount; no portion exceeds its owner's entry. On error the wallet
    /// is unchanged.
    pub fn withdraw(&mut self, amount: Decimal) -> Result<BTreeMap<NodeId, Decimal>, WalletError> {
        if amount < Decimal::ZERO {
            return Err(WalletError::NegativeAmount(amount));
        }
        let amount = truncate(amount);
        let available = self.total();
        if amount > available {
            return Err(WalletError::InsufficientFunds {
                requested: amount,
                available,
            });
        }
        if amount.is_zero() {
            return Ok(BTreeMap::new());
        }
        if amount == available {
            return Ok(std::mem::take(&mut self.entries));
        }

        let mut portions: BTreeMap<NodeId, Decimal> = BTreeMap::new();
        let mut remaining = amount;
        for (owner, held) in self.entries.iter_mut() {
            let share = truncate(amount * *held / available).min(remaining);
            if share > Decimal::ZERO {
                *held -= share;
                remaining -= share;
                portions.insert(owner.clone(), share);
            }
        }
        // Truncation leaves a remainder of at most a few units in the last
        // place; take it from whichever owners still hold something.
        for (owner, held) in self.entries.iter_mut() {
            if remaining.is_zero() {
                break;
            }
            let share = remaining.min(*held);
            if share > Decimal::ZERO {
                *held -= share;
                remaining -= share;
                *portions.entry(owner.clone()).or_insert(Decimal::ZERO) += share;
            }
        }
        self.prune();
        Ok(portions)
    }

    /// Move `amount` into `dest`, preserving per-owner attribution.
    ///
    /// Fails with [`WalletError::InsufficientFunds`] if `amount` exceeds
    /// the total; neither wallet is touched in that case.
    pub fn transfer_to(&mut self, dest: &mut Wallet, amount: Decimal) -> Result<Decimal, WalletError> {
        let portions = self.withdraw(amount)?;
        let mut moved = Decimal::ZERO;
        for (owner, share) in portions {
            moved += share;
            *dest.entries.entry(owner).or_insert(Decimal::ZERO) += share;
        }
        Ok(moved)
    }

    /// Replace the whole wallet with a single entry.
    pub fn reset_to(&mut self, owner: NodeId, amount: Decimal) {
        *self = Self::with_owner(owner, amount);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn prune(&mut self) {
        self.entries.retain(|_, amount| *amount > Decimal::ZERO);
    }
}
