//! Block storage and chain state management.

use crate::db::{Result, Storage, StorageError};
use crate::scope::{abort, BlockRecord, Persist, RecordId};
use tinyledger_core::{Block, Hash, Transaction};

/// Keys for chain metadata.
const CHAIN_ROOT_KEY: &[u8] = b"chain:root";
const CHAIN_TAIL_KEY: &[u8] = b"chain:tail";
const CHAIN_TAIL_HASH_KEY: &[u8] = b"chain:tail_hash";

/// Manages block storage and chain state.
pub struct ChainStore<'a> {
    storage: &'a Storage,
}

impl<'a> ChainStore<'a> {
    /// Create a new ChainStore wrapping the given storage.
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    // =========================================================================
    // Genesis Block
    // =========================================================================

    /// Initialize the chain with a genesis block.
    ///
    /// The existence check and the writes share one atomic scope, so at most
    /// one root can ever be committed. This will fail if:
    /// - The block does not link to the root marker
    /// - The chain is already initialized
    pub fn init_genesis(&self, genesis: &Block) -> Result<RecordId> {
        if !genesis.is_genesis() {
            return Err(StorageError::InvalidGenesis(format!(
                "genesis must link to the root marker, got {}",
                genesis.prev_hash()
            )));
        }

        self.storage.atomic(|scope| {
            if let Some(root) = scope.get_hash(CHAIN_ROOT_KEY)? {
                return abort(StorageError::AlreadyInitialized(root));
            }

            let id = genesis.persist(scope)?;
            scope.put_hash(CHAIN_ROOT_KEY, &genesis.hash())?;
            scope.put_hash(CHAIN_TAIL_HASH_KEY, &genesis.hash())?;
            scope.put_record_id(CHAIN_TAIL_KEY, id)?;
            Ok(id)
        })
    }

    /// Hash of the genesis block, if the chain is initialized.
    pub fn get_root(&self) -> Result<Option<Hash>> {
        self.storage.get_hash(CHAIN_ROOT_KEY)
    }

    /// Check if the chain is initialized (has a genesis block).
    pub fn is_initialized(&self) -> Result<bool> {
        Ok(self.get_root()?.is_some())
    }

    // =========================================================================
    // Chain Operations
    // =========================================================================

    /// Append a new block to the chain.
    ///
    /// Commits only if the stored tail hash still equals `block.prev_hash`
    /// when the scope runs. A block built against a stale tail is rejected
    /// with [`StorageError::Conflict`] instead of forking the chain, and a
    /// block stamped before the tail with [`StorageError::StaleTimestamp`],
    /// so timestamp order always agrees with chain order.
    pub fn append_block(&self, block: &Block) -> Result<RecordId> {
        self.storage.atomic(|scope| {
            let tail = match scope.get_hash(CHAIN_TAIL_HASH_KEY)? {
                Some(tail) => tail,
                None => return abort(StorageError::Uninitialized),
            };
            if tail != block.prev_hash() {
                return abort(StorageError::Conflict {
                    expected: block.prev_hash(),
                    found: tail,
                });
            }

            let tail_record = match scope.get_record_id(CHAIN_TAIL_KEY)? {
                Some(id) => scope.get_block(id)?,
                None => None,
            };
            let tail_time = match tail_record {
                Some(record) => record.timestamp,
                None => {
                    return abort(StorageError::Corrupt(format!(
                        "tail block {} has no record",
                        tail
                    )))
                }
            };
            if block.timestamp() < tail_time {
                return abort(StorageError::StaleTimestamp {
                    tail: tail_time,
                    found: block.timestamp(),
                });
            }

            let id = block.persist(scope)?;
            scope.put_hash(CHAIN_TAIL_HASH_KEY, &block.hash())?;
            scope.put_record_id(CHAIN_TAIL_KEY, id)?;
            Ok(id)
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get the current chain tail hash.
    pub fn get_head(&self) -> Result<Option<Hash>> {
        self.storage.get_hash(CHAIN_TAIL_HASH_KEY)
    }

    /// Get the latest block.
    pub fn get_latest_block(&self) -> Result<Option<Block>> {
        let tail = match self.storage.meta().get(CHAIN_TAIL_KEY)? {
            Some(key) => RecordId(Storage::record_id(&key)?),
            None => return Ok(None),
        };
        let record: BlockRecord = self
            .storage
            .get_or_err(self.storage.blocks(), tail.key())?;
        let tx = self.get_transaction(record.transaction)?.ok_or_else(|| {
            StorageError::Corrupt(format!("tail block {} has no transaction", record.hash))
        })?;
        Ok(Some(record.into_block(tx)))
    }

    fn get_transaction(&self, id: RecordId) -> Result<Option<Transaction>> {
        self.storage.get(self.storage.transactions(), id.key())
    }

    /// Every block with its transaction inlined, most recent first.
    ///
    /// Ordered by timestamp descending; blocks sharing a timestamp keep
    /// reverse append order. Blocks whose transaction record is missing are
    /// left out.
    pub fn history(&self) -> Result<Vec<Block>> {
        let mut entries = Vec::with_capacity(self.storage.blocks().len());
        for item in self.storage.blocks().iter() {
            let (key, value) = item?;
            let seq = Storage::record_id(&key)?;
            let record: BlockRecord = bincode::deserialize(&value)?;
            if let Some(tx) = self.get_transaction(record.transaction)? {
                entries.push((seq, record.into_block(tx)));
            }
        }

        entries.sort_by(|(a_seq, a), (b_seq, b)| {
            b.timestamp()
                .cmp(&a.timestamp())
                .then_with(|| b_seq.cmp(a_seq))
        });
        Ok(entries.into_iter().map(|(_, block)| block).collect())
    }

    /// Number of stored blocks.
    pub fn block_count(&self) -> usize {
        self.storage.blocks().len()
    }
}
