//! Persistent storage layer for tinyledger.
//!
//! This crate provides the storage backend for the ledger:
//! - Transaction records and block records in separate trees
//! - Chain metadata (genesis root, tail pointer)
//! - Atomic write scopes spanning all trees
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Ledger Service                        │
//! │            (genesis, append, history, balance)           │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │                   Storage Layer                          │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │ ChainStore  │  │ WriteScope  │  │ Storage (DB)    │  │
//! │  │  - Genesis  │  │  - Persist  │  │  - sled wrapper │  │
//! │  │  - Append   │  │  - abort    │  │  - serialization│  │
//! │  │  - History  │  │             │  │  - key helpers  │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────┘  │
//! └────────────────────────┬────────────────────────────────┘
//!                          │
//! ┌────────────────────────▼────────────────────────────────┐
//! │                    sled Database                         │
//! │      trees: transactions │ blocks │ meta                 │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use tinyledger_storage::{ChainStore, Storage};
//! use tinyledger_core::{Block, Transaction};
//!
//! let storage = Storage::open("./ledger_data").unwrap();
//! let chain = ChainStore::new(&storage);
//!
//! let genesis = Block::genesis();
//! chain.init_genesis(&genesis).unwrap();
//!
//! let next = Block::new(genesis.hash(), Transaction::new("alice", "bob", 50));
//! chain.append_block(&next).unwrap();
//! ```

pub mod chain;
pub mod db;
pub mod scope;

// Re-export commonly used types
pub use chain::ChainStore;
pub use db::{Result, Storage, StorageError};
pub use scope::{abort, BlockRecord, Persist, RecordId, ScopeResult, WriteScope};
