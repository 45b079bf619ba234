//! Core ledger primitives for tinyledger.
//!
//! This crate provides the in-memory side of the ledger:
//! - Blake3 hashing over a canonical field encoding
//! - Transactions (single sender, single recipient)
//! - Blocks wrapping exactly one transaction, linked by hash

pub mod block;
pub mod hash;
pub mod transaction;

// Re-export commonly used types at the crate root
pub use block::{current_timestamp, Block, MAX_NONCE, ROOT_HASH};
pub use hash::{hash, CanonicalEncoder, Hash, Hashable, H256};
pub use transaction::{Transaction, GENESIS_FROM, GENESIS_TO};
