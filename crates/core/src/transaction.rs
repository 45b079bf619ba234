//! Value transfer records.

use crate::hash::{CanonicalEncoder, Hash, Hashable};
use serde::{Deserialize, Serialize};

/// Sender of the sentinel transaction wrapped by the genesis block.
pub const GENESIS_FROM: &str = "NULL";
/// Reserved zero-address receiving the sentinel transaction.
pub const GENESIS_TO: &str = "0x0";

const TX_DOMAIN: &str = "tinyledger/tx/v1";

/// A transfer of `amount` from one address to another.
///
/// The hash is derived from `(from_address, to_address, amount)` when the
/// transaction is built and is never mutated afterwards, so the fields are
/// only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    from_address: String,
    to_address: String,
    amount: i64,
    hash: Hash,
}

impl Transaction {
    /// Create a new transfer. Presence of the fields is checked by the caller.
    pub fn new(from_address: impl Into<String>, to_address: impl Into<String>, amount: i64) -> Self {
        let mut tx = Self {
            from_address: from_address.into(),
            to_address: to_address.into(),
            amount,
            hash: Hash::ZERO,
        };
        tx.hash = tx.compute_hash();
        tx
    }

    /// The sentinel transaction carried by the genesis block.
    pub fn genesis() -> Self {
        Self::new(GENESIS_FROM, GENESIS_TO, 0)
    }

    pub fn from_address(&self) -> &str {
        &self.from_address
    }

    pub fn to_address(&self) -> &str {
        &self.to_address
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// The hash computed at construction time.
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// Whether `address` sends or receives in this transaction.
    pub fn touches(&self, address: &str) -> bool {
        self.from_address == address || self.to_address == address
    }

    /// Signed effect of this transaction on `address`'s balance.
    ///
    /// Widened to `i128` so that no single delta, or any sum of them a ledger
    /// can hold, overflows. A self-transfer nets to zero.
    pub fn balance_delta(&self, address: &str) -> i128 {
        let amount = i128::from(self.amount);
        let mut delta = 0i128;
        if self.from_address == address {
            delta -= amount;
        }
        if self.to_address == address {
            delta += amount;
        }
        delta
    }
}

impl Hashable for Transaction {
    fn canonical_bytes(&self) -> Vec<u8> {
        CanonicalEncoder::new(TX_DOMAIN)
            .str(&self.from_address)
            .str(&self.to_address)
            .i64(self.amount)
            .into_bytes()
    }
}
