//! Ledger service for tinyledger.
//!
//! Ties the core primitives to the store:
//! - **Genesis**: creates the single root block, atomically
//! - **Append**: wraps a transaction in a block on top of the current tail
//! - **History**: every block with its transaction, most recent first
//! - **Balance**: signed sum over an address's transfers
//!
//! # Example
//!
//! ```rust,no_run
//! use tinyledger_chain::Ledger;
//! use tinyledger_core::Transaction;
//! use tinyledger_storage::Storage;
//!
//! let storage = Storage::open("./ledger_data").unwrap();
//! let ledger = Ledger::new(storage);
//! ledger.ensure_genesis().unwrap();
//!
//! ledger.append(Transaction::new("alice", "bob", 50)).unwrap();
//! assert_eq!(ledger.balance_of("bob").unwrap(), 50);
//! ```

pub mod ledger;

// Re-export commonly used types
pub use ledger::{Ledger, LedgerError, Result};
