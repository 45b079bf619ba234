//! The ledger service.
//!
//! Every operation reads from the store; nothing about the chain is cached
//! in memory between calls.

use thiserror::Error;
use tinyledger_core::{current_timestamp, Block, Hash, Transaction};
use tinyledger_storage::{ChainStore, Storage, StorageError};
use tracing::{debug, info, warn};

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("genesis creation failed: {0}")]
    ChainInit(#[source] StorageError),

    #[error("chain has no blocks yet")]
    EmptyChain,

    #[error("chain tail moved from {expected} to {found} before the block was committed")]
    Conflict { expected: Hash, found: Hash },

    #[error("balance of {address} does not fit in a signed 64-bit amount")]
    BalanceOverflow { address: String },

    #[error("storage error: {0}")]
    Store(#[source] StorageError),
}

impl LedgerError {
    /// Whether the caller may rebuild the block and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Conflict { .. })
    }
}

impl From<StorageError> for LedgerError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Uninitialized => LedgerError::EmptyChain,
            StorageError::Conflict { expected, found } => LedgerError::Conflict { expected, found },
            other => LedgerError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Append-only ledger of single-transaction blocks.
///
/// Holds only the store handle. Chain lifecycle:
/// `Uninitialized -> create_genesis_block -> Ready -> (append)*`.
#[derive(Clone)]
pub struct Ledger {
    storage: Storage,
}

impl Ledger {
    /// Create a ledger over the given store.
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// The underlying store handle.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    fn chain(&self) -> ChainStore<'_> {
        ChainStore::new(&self.storage)
    }

    /// Create and persist the genesis block.
    ///
    /// Fails with [`LedgerError::ChainInit`] if the write fails or a genesis
    /// block already exists.
    pub fn create_genesis_block(&self) -> Result<Block> {
        let genesis = Block::genesis();
        self.chain()
            .init_genesis(&genesis)
            .map_err(LedgerError::ChainInit)?;

        info!(hash = %genesis.hash(), "created genesis block");
        Ok(genesis)
    }

    /// Make sure a genesis block exists and return its hash.
    ///
    /// Used at startup. Losing a creation race to another process counts as
    /// success.
    pub fn ensure_genesis(&self) -> Result<Hash> {
        if let Some(root) = self.chain().get_root()? {
            info!(hash = %root, "genesis block already exists, skipping");
            return Ok(root);
        }

        match self.create_genesis_block() {
            Ok(genesis) => Ok(genesis.hash()),
            Err(LedgerError::ChainInit(StorageError::AlreadyInitialized(root))) => {
                info!(hash = %root, "genesis block created concurrently, skipping");
                Ok(root)
            }
            Err(err) => Err(err),
        }
    }

    /// Check if a genesis block exists.
    pub fn is_initialized(&self) -> Result<bool> {
        Ok(self.chain().is_initialized()?)
    }

    /// The most recently appended block.
    pub fn latest_block(&self) -> Result<Block> {
        self.chain()
            .get_latest_block()?
            .ok_or(LedgerError::EmptyChain)
    }

    /// Wrap `transaction` in a block on top of the current tail and persist it.
    ///
    /// If another append commits between reading the tail and committing this
    /// block, nothing is written and [`LedgerError::Conflict`] is returned.
    /// No retry is attempted here.
    ///
    /// The block is never stamped earlier than the tail, even if the wall
    /// clock has stepped back since the tail was written.
    pub fn append(&self, transaction: Transaction) -> Result<Block> {
        let tail = self.latest_block()?;
        let timestamp = current_timestamp().max(tail.timestamp());
        let block = Block::with_timestamp(tail.hash(), transaction, timestamp);
        self.commit(&block)?;
        Ok(block)
    }

    fn commit(&self, block: &Block) -> Result<()> {
        match self.chain().append_block(block) {
            Ok(id) => {
                debug!(
                    hash = %block.hash(),
                    prev_hash = %block.prev_hash(),
                    record = id.0,
                    "appended block"
                );
                Ok(())
            }
            Err(err) => {
                let err = LedgerError::from(err);
                if err.is_retryable() {
                    warn!(hash = %block.hash(), error = %err, "append rejected");
                }
                Err(err)
            }
        }
    }

    /// All blocks with their transactions inlined, most recent first.
    pub fn history(&self) -> Result<Vec<Block>> {
        let blocks = self.chain().history()?;
        if blocks.is_empty() {
            return Err(LedgerError::EmptyChain);
        }
        Ok(blocks)
    }

    /// Signed sum of everything `address` received minus everything it sent.
    ///
    /// Recomputed from the full history on every call. Summed in `i128`, so
    /// only a final balance outside the `i64` range is an error.
    pub fn balance_of(&self, address: &str) -> Result<i64> {
        let balance: i128 = self
            .history()?
            .iter()
            .map(Block::transaction)
            .filter(|tx| tx.touches(address))
            .map(|tx| tx.balance_delta(address))
            .sum();
        i64::try_from(balance).map_err(|_| LedgerError::BalanceOverflow {
            address: address.to_string(),
        })
    }
}
