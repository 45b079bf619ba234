//! The atomic write scope and the `Persist` capability.
//!
//! A [`WriteScope`] is only handed out by [`Storage::atomic`](crate::Storage::atomic).
//! Records written through it commit together when the scope closure returns
//! `Ok`, and are discarded together when it returns an error.

use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree};
use tinyledger_core::{Block, Hash, Transaction};

use crate::db::{decode_hash, encode, Storage, StorageError};

/// Result of an operation inside a write scope.
pub type ScopeResult<T> = ConflictableTransactionResult<T, StorageError>;

/// Abort the enclosing scope with `err`.
pub fn abort<T>(err: StorageError) -> ScopeResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

/// Storage-assigned identifier of a persisted record.
///
/// Internal to the store: it links a block record to its transaction record
/// and never appears in the public block view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl RecordId {
    pub fn key(&self) -> Vec<u8> {
        Storage::record_key(self.0)
    }
}

/// Stored layout of a block: the transaction is referenced, not embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecord {
    pub transaction: RecordId,
    pub timestamp: u64,
    pub prev_hash: Hash,
    pub nonce: u64,
    pub hash: Hash,
}

impl BlockRecord {
    pub fn new(block: &Block, transaction: RecordId) -> Self {
        Self {
            transaction,
            timestamp: block.timestamp(),
            prev_hash: block.prev_hash(),
            nonce: block.nonce(),
            hash: block.hash(),
        }
    }

    /// Inline `transaction` back into a full block.
    pub fn into_block(self, transaction: Transaction) -> Block {
        Block::restore(self.prev_hash, transaction, self.timestamp, self.nonce, self.hash)
    }
}

/// Writes performed inside one atomic scope.
pub struct WriteScope<'a> {
    transactions: &'a TransactionalTree,
    blocks: &'a TransactionalTree,
    meta: &'a TransactionalTree,
}

impl<'a> WriteScope<'a> {
    pub(crate) fn new(
        transactions: &'a TransactionalTree,
        blocks: &'a TransactionalTree,
        meta: &'a TransactionalTree,
    ) -> Self {
        Self {
            transactions,
            blocks,
            meta,
        }
    }

    fn insert_record<V: Serialize>(tree: &TransactionalTree, value: &V) -> ScopeResult<RecordId> {
        let encoded = encode(value).or_else(abort)?;
        let id = tree
            .generate_id()
            .map_err(ConflictableTransactionError::Storage)?;
        tree.insert(Storage::record_key(id), encoded)?;
        Ok(RecordId(id))
    }

    /// Insert a transaction record.
    pub fn insert_transaction(&self, tx: &Transaction) -> ScopeResult<RecordId> {
        Self::insert_record(self.transactions, tx)
    }

    /// Insert a block record.
    pub fn insert_block(&self, record: &BlockRecord) -> ScopeResult<RecordId> {
        Self::insert_record(self.blocks, record)
    }

    /// Read a hash from the meta tree as seen by this scope.
    pub fn get_hash(&self, key: &[u8]) -> ScopeResult<Option<Hash>> {
        match self.meta.get(key)? {
            Some(bytes) => decode_hash(&bytes).map(Some).or_else(abort),
            None => Ok(None),
        }
    }

    /// Read a record id from the meta tree as seen by this scope.
    pub fn get_record_id(&self, key: &[u8]) -> ScopeResult<Option<RecordId>> {
        match self.meta.get(key)? {
            Some(bytes) => Storage::record_id(&bytes)
                .map(|id| Some(RecordId(id)))
                .or_else(abort),
            None => Ok(None),
        }
    }

    /// Read a block record as seen by this scope.
    pub fn get_block(&self, id: RecordId) -> ScopeResult<Option<BlockRecord>> {
        match self.blocks.get(id.key())? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(StorageError::from)
                .or_else(abort),
            None => Ok(None),
        }
    }

    /// Write a hash into the meta tree.
    pub fn put_hash(&self, key: &[u8], hash: &Hash) -> ScopeResult<()> {
        self.meta.insert(key, hash.as_bytes().to_vec())?;
        Ok(())
    }

    /// Write a record id into the meta tree.
    pub fn put_record_id(&self, key: &[u8], id: RecordId) -> ScopeResult<()> {
        self.meta.insert(key, id.key())?;
        Ok(())
    }
}

/// Entities that write themselves as records inside an atomic scope.
pub trait Persist {
    /// Write the entity and return the reference under which it was stored.
    fn persist(&self, scope: &WriteScope<'_>) -> ScopeResult<RecordId>;
}

impl Persist for Transaction {
    fn persist(&self, scope: &WriteScope<'_>) -> ScopeResult<RecordId> {
        scope.insert_transaction(self)
    }
}

impl Persist for Block {
    /// Writes the owned transaction first, then the block record pointing at it.
    fn persist(&self, scope: &WriteScope<'_>) -> ScopeResult<RecordId> {
        let tx_id = self.transaction().persist(scope)?;
        scope.insert_block(&BlockRecord::new(self, tx_id))
    }
}
