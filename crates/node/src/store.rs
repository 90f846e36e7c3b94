//! Durable storage for frozen blocks and snapshots.
//!
//! The store is deliberately dumb: height-keyed puts and gets of canonical
//! wire bytes. The in-memory implementation backs tests and ephemeral nodes;
//! the RocksDB implementation (feature `persistence`) backs real deployments.

use std::collections::BTreeMap;

use solidus_ledger::{BalanceSnapshot, Block};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("corrupt stored value at height {height}: {reason}")]
    Corrupt { height: u64, reason: String },
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub trait BlockStore: Send {
    fn put_block(&mut self, block: &Block) -> Result<(), StoreError>;
    fn get_block(&self, height: u64) -> Result<Option<Block>, StoreError>;
    fn put_snapshot(&mut self, snapshot: &BalanceSnapshot) -> Result<(), StoreError>;
    fn get_snapshot(&self, height: u64) -> Result<Option<BalanceSnapshot>, StoreError>;
    /// Highest stored block height, None for a fresh store. Inspected at
    /// startup to restore the frozen edge.
    fn highest_height(&self) -> Result<Option<u64>, StoreError>;

    /// Timestamp of height 0, the anchor for every slot boundary.
    fn genesis_start_timestamp(&self) -> Result<Option<i64>, StoreError> {
        Ok(self.get_block(0)?.map(|b| b.start_timestamp))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    blocks: BTreeMap<u64, Block>,
    snapshots: BTreeMap<u64, BalanceSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStore for MemoryStore {
    fn put_block(&mut self, block: &Block) -> Result<(), StoreError> {
        self.blocks.insert(block.height, block.clone());
        Ok(())
    }

    fn get_block(&self, height: u64) -> Result<Option<Block>, StoreError> {
        Ok(self.blocks.get(&height).cloned())
    }

    fn put_snapshot(&mut self, snapshot: &BalanceSnapshot) -> Result<(), StoreError> {
        self.snapshots.insert(snapshot.block_height, snapshot.clone());
        Ok(())
    }

    fn get_snapshot(&self, height: u64) -> Result<Option<BalanceSnapshot>, StoreError> {
        Ok(self.snapshots.get(&height).cloned())
    }

    fn highest_height(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.blocks.keys().next_back().copied())
    }
}

#[cfg(feature = "persistence")]
pub use rocks::RocksStore;

#[cfg(feature = "persistence")]
mod rocks {
    use super::*;
    use std::path::Path;

    fn block_key(height: u64) -> Vec<u8> {
        let mut k = b"blk:".to_vec();
        k.extend_from_slice(&height.to_be_bytes());
        k
    }

    fn snapshot_key(height: u64) -> Vec<u8> {
        let mut k = b"bal:".to_vec();
        k.extend_from_slice(&height.to_be_bytes());
        k
    }

    /// RocksDB-backed store. Values are the canonical wire encodings, so
    /// what is on disk is exactly what is on the wire.
    pub struct RocksStore {
        db: rocksdb::DB,
    }

    impl RocksStore {
        pub fn open(path: &Path) -> Result<Self, StoreError> {
            let mut opts = rocksdb::Options::default();
            opts.create_if_missing(true);
            let db = rocksdb::DB::open(&opts, path)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            Ok(Self { db })
        }

        fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
            self.db
                .get(key)
                .map_err(|e| StoreError::Backend(e.to_string()))
        }

        fn put_raw(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
            self.db
                .put(key, value)
                .map_err(|e| StoreError::Backend(e.to_string()))
        }
    }

    impl BlockStore for RocksStore {
        fn put_block(&mut self, block: &Block) -> Result<(), StoreError> {
            self.put_raw(&block_key(block.height), &block.to_bytes())?;
            // Track the tip under a fixed key so restarts avoid a scan.
            self.put_raw(b"meta:tip", &block.height.to_be_bytes())
        }

        fn get_block(&self, height: u64) -> Result<Option<Block>, StoreError> {
            match self.get_raw(&block_key(height))? {
                None => Ok(None),
                Some(raw) => Block::from_bytes(&raw)
                    .map(Some)
                    .map_err(|e| StoreError::Corrupt {
                        height,
                        reason: e.to_string(),
                    }),
            }
        }

        fn put_snapshot(&mut self, snapshot: &BalanceSnapshot) -> Result<(), StoreError> {
            self.put_raw(&snapshot_key(snapshot.block_height), &snapshot.to_bytes())
        }

        fn get_snapshot(&self, height: u64) -> Result<Option<BalanceSnapshot>, StoreError> {
            match self.get_raw(&snapshot_key(height))? {
                None => Ok(None),
                Some(raw) => BalanceSnapshot::from_bytes(&raw)
                    .map(Some)
                    .map_err(|e| StoreError::Corrupt {
                        height,
                        reason: e.to_string(),
                    }),
            }
        }

        fn highest_height(&self) -> Result<Option<u64>, StoreError> {
            match self.get_raw(b"meta:tip")? {
                None => Ok(None),
                Some(raw) if raw.len() == 8 => {
                    let mut a = [0u8; 8];
                    a.copy_from_slice(&raw);
                    Ok(Some(u64::from_be_bytes(a)))
                }
                Some(_) => Err(StoreError::Corrupt {
                    height: 0,
                    reason: "malformed tip marker".into(),
                }),
            }
        }
    }
}
