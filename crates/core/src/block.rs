//! Single-transaction blocks linked by hash.

use crate::hash::{CanonicalEncoder, Hash, Hashable};
use crate::transaction::Transaction;
use rand::Rng;
use serde::Serialize;

/// `prev_hash` of the genesis block; no real block hashes to zero.
pub const ROOT_HASH: Hash = Hash::ZERO;

/// Upper bound (inclusive) of the random nonce.
pub const MAX_NONCE: u64 = 999_999_999;

const BLOCK_DOMAIN: &str = "tinyledger/block/v1";

/// A block wrapping exactly one transaction.
///
/// Only serialized, never deserialized: blocks come back from storage through
/// [`Block::restore`], so the hash always belongs to the fields it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    transaction: Transaction,
    timestamp: u64,
    prev_hash: Hash,
    nonce: u64,
    hash: Hash,
}

impl Block {
    /// Create a block on top of `prev_hash`, stamped now with a random nonce.
    pub fn new(prev_hash: Hash, transaction: Transaction) -> Self {
        Self::with_timestamp(prev_hash, transaction, current_timestamp())
    }

    /// Create a block with an explicit timestamp and a random nonce.
    pub fn with_timestamp(prev_hash: Hash, transaction: Transaction, timestamp: u64) -> Self {
        let nonce = rand::thread_rng().gen_range(0..=MAX_NONCE);
        Self::build(prev_hash, transaction, timestamp, nonce)
    }

    /// Create a block from every hashed field.
    pub fn build(prev_hash: Hash, transaction: Transaction, timestamp: u64, nonce: u64) -> Self {
        let mut block = Self {
            transaction,
            timestamp,
            prev_hash,
            nonce,
            hash: Hash::ZERO,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Reassemble a block read back from storage, keeping the stored hash.
    pub fn restore(
        prev_hash: Hash,
        transaction: Transaction,
        timestamp: u64,
        nonce: u64,
        hash: Hash,
    ) -> Self {
        Self {
            transaction,
            timestamp,
            prev_hash,
            nonce,
            hash,
        }
    }

    /// Create the genesis block around the sentinel transaction.
    pub fn genesis() -> Self {
        Self::new(ROOT_HASH, Transaction::genesis())
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn prev_hash(&self) -> Hash {
        self.prev_hash
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// The hash computed at construction time.
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// Check if this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.prev_hash == ROOT_HASH
    }
}

impl Hashable for Block {
    fn canonical_bytes(&self) -> Vec<u8> {
        CanonicalEncoder::new(BLOCK_DOMAIN)
            .hash(&self.prev_hash)
            .hash(&self.transaction.hash())
            .u64(self.timestamp)
            .u64(self.nonce)
            .into_bytes()
    }
}

/// Current Unix time in milliseconds.
pub fn current_timestamp() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
