//! sled database wrapper with serialization helpers.

use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{TransactionError, Transactional};
use sled::{Db, Tree};
use std::path::Path;
use thiserror::Error;
use tinyledger_core::Hash;

use crate::scope::{ScopeResult, WriteScope};

/// Tree holding transaction records.
pub const TRANSACTIONS_TREE: &str = "transactions";
/// Tree holding block records.
pub const BLOCKS_TREE: &str = "blocks";
/// Tree holding chain metadata (root, tail).
pub const META_TREE: &str = "meta";

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Invalid genesis: {0}")]
    InvalidGenesis(String),

    #[error("Chain already initialized with root {0}")]
    AlreadyInitialized(Hash),

    #[error("Chain is not initialized")]
    Uninitialized,

    #[error("Chain tail moved: block links to {expected}, tail is {found}")]
    Conflict { expected: Hash, found: Hash },

    #[error("Block timestamp {found} is older than the chain tail at {tail}")]
    StaleTimestamp { tail: u64, found: u64 },

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Handle to the backing store.
///
/// Cloning is cheap and every clone refers to the same database, so one
/// handle is opened at startup and passed to whoever needs it.
#[derive(Clone)]
pub struct Storage {
    db: Db,
    transactions: Tree,
    blocks: Tree,
    meta: Tree,
}

impl Storage {
    /// Open a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// Open an in-memory database (for testing).
    pub fn open_temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            transactions: db.open_tree(TRANSACTIONS_TREE)?,
            blocks: db.open_tree(BLOCKS_TREE)?,
            meta: db.open_tree(META_TREE)?,
            db,
        })
    }

    pub fn transactions(&self) -> &Tree {
        &self.transactions
    }

    pub fn blocks(&self) -> &Tree {
        &self.blocks
    }

    pub fn meta(&self) -> &Tree {
        &self.meta
    }

    /// Retrieve and deserialize a value from `tree`.
    pub fn get<K, V>(&self, tree: &Tree, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]>,
        V: DeserializeOwned,
    {
        match tree.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Retrieve a value, returning error if not found.
    pub fn get_or_err<K, V>(&self, tree: &Tree, key: K) -> Result<V>
    where
        K: AsRef<[u8]> + std::fmt::Debug,
        V: DeserializeOwned,
    {
        let missing = format!("{:?}", key);
        self.get(tree, key)?
            .ok_or(StorageError::NotFound(missing))
    }

    /// Read a raw 32-byte hash stored under `key` in the meta tree.
    pub fn get_hash(&self, key: &[u8]) -> Result<Option<Hash>> {
        match self.meta.get(key)? {
            Some(bytes) => Ok(Some(decode_hash(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Run `f` as one atomic scope over all record trees.
    ///
    /// Either every write made through the scope becomes visible or none
    /// does. An `Err` returned from `f` aborts the scope and is handed back
    /// unchanged. `f` may be re-run by sled when a concurrent scope touches
    /// the same keys, so it must not have side effects outside the scope.
    pub fn atomic<F, R>(&self, f: F) -> Result<R>
    where
        F: Fn(&WriteScope<'_>) -> ScopeResult<R>,
    {
        (&self.transactions, &self.blocks, &self.meta)
            .transaction(|(transactions, blocks, meta)| {
                f(&WriteScope::new(transactions, blocks, meta))
            })
            .map_err(|err| match err {
                TransactionError::Abort(err) => err,
                TransactionError::Storage(err) => StorageError::Database(err),
            })
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Whether the database holds no records at all.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.transactions.is_empty() && self.meta.is_empty()
    }

    // =========================================================================
    // Key Construction Helpers
    // =========================================================================

    /// Key of a record in the transactions or blocks tree.
    /// Big-endian so that key order equals insertion order.
    pub fn record_key(id: u64) -> Vec<u8> {
        id.to_be_bytes().to_vec()
    }

    /// Inverse of [`Storage::record_key`].
    pub fn record_id(key: &[u8]) -> Result<u64> {
        let bytes: [u8; 8] = key
            .try_into()
            .map_err(|_| StorageError::Corrupt(format!("record key of {} bytes", key.len())))?;
        Ok(u64::from_be_bytes(bytes))
    }
}

/// Decode a hash stored as 32 raw bytes.
pub fn decode_hash(bytes: &[u8]) -> Result<Hash> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| StorageError::Corrupt(format!("hash of {} bytes", bytes.len())))?;
    Ok(Hash(arr))
}

/// Serialize a value for storage.
pub fn encode<V: Serialize>(value: &V) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_temporary() {
        let storage = Storage::open_temporary().unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn test_get_typed() {
        let storage = Storage::open_temporary().unwrap();

        storage
            .transactions()
            .insert(Storage::record_key(1), encode(&42u64).unwrap())
            .unwrap();

        let value: Option<u64> = storage.get(storage.transactions(), Storage::record_key(1)).unwrap();
        assert_eq!(value, Some(42));

        let missing: Option<u64> = storage.get(storage.transactions(), Storage::record_key(2)).unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_get_or_err() {
        let storage = Storage::open_temporary().unwrap();

        let result: Result<u64> = storage.get_or_err(storage.blocks(), Storage::record_key(9));
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_record_key_order() {
        assert!(Storage::record_key(2) < Storage::record_key(256));
        assert_eq!(Storage::record_id(&Storage::record_key(77)).unwrap(), 77);
        assert!(matches!(
            Storage::record_id(b"short"),
            Err(StorageError::Corrupt(_))
        ));
    }

    #[test]
    fn test_decode_hash() {
        let hash = Hash([7u8; 32]);
        assert_eq!(decode_hash(hash.as_bytes()).unwrap(), hash);
        assert!(decode_hash(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_clones_share_database() {
        let storage = Storage::open_temporary().unwrap();
        let clone = storage.clone();

        clone.meta().insert(b"k", b"v".to_vec()).unwrap();
        assert!(storage.meta().contains_key(b"k").unwrap());
    }

    #[test]
    fn test_reopen_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = Storage::open(dir.path()).unwrap();
            storage.meta().insert(b"k", b"v".to_vec()).unwrap();
            storage.flush().unwrap();
        }
        let storage = Storage::open(dir.path()).unwrap();
        assert!(storage.meta().contains_key(b"k").unwrap());
    }
}
