//! The authoritative frozen tail of the chain.
//!
//! Owns the frozen edge, the recent snapshot ring, the derived cycle
//! committee, and the store handle. Freezing is the only mutation; everything
//! else is read-only lookups for the consensus loop and admission.

use std::collections::{BTreeMap, HashSet, VecDeque};

use solidus_ledger::admission::FrozenHashLookup;
use solidus_ledger::cycle::Continuity;
use solidus_ledger::params::freeze_threshold;
use solidus_ledger::{
    execute_block, genesis_snapshot_for_block, start_timestamp_for_height, BalanceSnapshot, Block,
    ChainParams, CycleTracker, GenesisError, Identifier, BLOCK_DURATION_MS,
};

use crate::store::{BlockStore, StoreError};

/// Snapshots kept hot; older ones come from the store or re-execution.
const SNAPSHOT_RING: usize = 24;

/// Frozen blocks memoised in memory.
const RECENT_BLOCKS: usize = 64;

#[derive(thiserror::Error, Debug)]
pub enum FreezeError {
    #[error("no frozen edge yet; only a genesis block can start the chain")]
    NoFrozenEdge,
    #[error("chain already has a frozen edge at height {0}")]
    AlreadyStarted(u64),
    #[error("block height {got} is not the next frozen height {expected}")]
    NotNextHeight { expected: u64, got: u64 },
    #[error("block does not extend the frozen edge")]
    ParentHashMismatch,
    #[error("snapshot hash does not match the block's balance list hash")]
    SnapshotHashMismatch,
    #[error("cycle continuity verdict is discontinuous")]
    Discontinuous,
    #[error(transparent)]
    Genesis(#[from] GenesisError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("stored chain is missing block {0}")]
    MissingStoredBlock(u64),
    #[error("stored chain is missing a snapshot at or below {0}")]
    MissingStoredSnapshot(u64),
}

struct Tip {
    height: u64,
    block: Block,
    tracker: CycleTracker,
    cycle_set: HashSet<Identifier>,
}

pub struct FrozenChain {
    store: Box<dyn BlockStore>,
    params: ChainParams,
    tip: Option<Tip>,
    genesis_start: i64,
    snapshot_ring: VecDeque<BalanceSnapshot>,
    recent_blocks: BTreeMap<u64, Block>,
}

impl FrozenChain {
    /// Open over a store, restoring the frozen edge if one is persisted.
    pub fn open(store: Box<dyn BlockStore>, params: ChainParams) -> Result<Self, FreezeError> {
        let mut chain = FrozenChain {
            store,
            params,
            tip: None,
            genesis_start: 0,
            snapshot_ring: VecDeque::new(),
            recent_blocks: BTreeMap::new(),
        };
        if let Some(height) = chain.store.highest_height()? {
            chain.restore(height)?;
        }
        Ok(chain)
    }

    fn restore(&mut self, height: u64) -> Result<(), FreezeError> {
        let block = self
            .store
            .get_block(height)?
            .ok_or(FreezeError::MissingStoredBlock(height))?;
        let snapshot = self
            .store
            .get_snapshot(height)?
            .ok_or(FreezeError::MissingStoredSnapshot(height))?;
        let tracker = self.tracker_at(height)?;
        self.genesis_start = self
            .store
            .genesis_start_timestamp()?
            .ok_or(FreezeError::MissingStoredBlock(0))?;
        self.snapshot_ring.clear();
        self.snapshot_ring.push_front(snapshot);
        self.set_tip(height, block, tracker);
        log::info!("restored frozen edge at height {height}");
        Ok(())
    }

    /// Rebuild the cycle tracker for a stored height by replaying signer
    /// identifiers from Genesis. Restore-path only.
    fn tracker_at(&self, height: u64) -> Result<CycleTracker, FreezeError> {
        let genesis = self
            .store
            .get_block(0)?
            .ok_or(FreezeError::MissingStoredBlock(0))?;
        let mut tracker = CycleTracker::genesis(genesis.signer);
        for h in 1..=height {
            let b = self
                .store
                .get_block(h)?
                .ok_or(FreezeError::MissingStoredBlock(h))?;
            tracker = tracker.advanced(b.signer);
        }
        Ok(tracker)
    }

    fn set_tip(&mut self, height: u64, block: Block, tracker: CycleTracker) {
        let cycle_set: HashSet<Identifier> = tracker.current_cycle().iter().copied().collect();
        self.recent_blocks.insert(height, block.clone());
        while self.recent_blocks.len() > RECENT_BLOCKS {
            if let Some(&oldest) = self.recent_blocks.keys().next() {
                self.recent_blocks.remove(&oldest);
            }
        }
        self.tip = Some(Tip {
            height,
            block,
            tracker,
            cycle_set,
        });
    }

    /// Start the chain: freeze a validated Genesis block and its snapshot.
    pub fn freeze_genesis(
        &mut self,
        block: Block,
        snapshot: BalanceSnapshot,
    ) -> Result<(), FreezeError> {
        if let Some(tip) = &self.tip {
            return Err(FreezeError::AlreadyStarted(tip.height));
        }
        let expected = genesis_snapshot_for_block(&block)?;
        if expected.hash() != block.balance_list_hash || snapshot.hash() != block.balance_list_hash
        {
            return Err(FreezeError::SnapshotHashMismatch);
        }
        self.store.put_block(&block)?;
        self.store.put_snapshot(&snapshot)?;
        self.genesis_start = block.start_timestamp;
        self.snapshot_ring.push_front(snapshot);
        let tracker = CycleTracker::genesis(block.signer);
        self.set_tip(0, block, tracker);
        log::info!("froze genesis block");
        Ok(())
    }

    /// Advance the frozen edge by one block. The store writes land before any
    /// in-memory state moves, so a failed write leaves the edge untouched.
    pub fn freeze_block(
        &mut self,
        block: Block,
        snapshot: BalanceSnapshot,
    ) -> Result<(), FreezeError> {
        let tip = self.tip.as_ref().ok_or(FreezeError::NoFrozenEdge)?;
        if block.height != tip.height + 1 {
            return Err(FreezeError::NotNextHeight {
                expected: tip.height + 1,
                got: block.height,
            });
        }
        if block.previous_block_hash != tip.block.hash() {
            return Err(FreezeError::ParentHashMismatch);
        }
        if snapshot.hash() != block.balance_list_hash {
            return Err(FreezeError::SnapshotHashMismatch);
        }
        let tracker = tip.tracker.advanced(block.signer);
        if tracker.is_complete() && tracker.continuity() == Continuity::Discontinuous {
            return Err(FreezeError::Discontinuous);
        }

        self.store.put_block(&block)?;
        self.store.put_snapshot(&snapshot)?;

        let height = block.height;
        self.snapshot_ring.push_front(snapshot);
        while self.snapshot_ring.len() > SNAPSHOT_RING {
            self.snapshot_ring.pop_back();
        }
        self.set_tip(height, block, tracker);
        log::info!(
            "frozen edge advanced to height {height}, cycle length {}",
            self.cycle_length()
        );
        Ok(())
    }

    pub fn frozen_height(&self) -> Option<u64> {
        self.tip.as_ref().map(|t| t.height)
    }

    pub fn frozen_block(&self) -> Option<&Block> {
        self.tip.as_ref().map(|t| &t.block)
    }

    pub fn frozen_snapshot(&self) -> Option<&BalanceSnapshot> {
        self.snapshot_ring.front()
    }

    pub fn frozen_hash(&self) -> Option<[u8; 32]> {
        self.tip.as_ref().map(|t| t.block.hash())
    }

    #[inline]
    pub fn genesis_start(&self) -> i64 {
        self.genesis_start
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Surrender the backing store, e.g. to reopen the chain as a restart
    /// would.
    pub fn into_store(self) -> Box<dyn BlockStore> {
        self.store
    }

    /// Frozen block lookup: memory cache first, then the store.
    pub fn frozen_block_at(&self, height: u64) -> Option<Block> {
        if let Some(b) = self.recent_blocks.get(&height) {
            return Some(b.clone());
        }
        self.store.get_block(height).ok().flatten()
    }

    /// Snapshot for a frozen block: ring, store, then re-execution forward
    /// from the nearest stored snapshot. Returns None when blocks needed for
    /// re-execution are missing.
    pub fn snapshot_for_block(&self, block: &Block) -> Option<BalanceSnapshot> {
        if let Some(s) = self
            .snapshot_ring
            .iter()
            .find(|s| s.block_height == block.height)
        {
            return Some(s.clone());
        }
        if let Ok(Some(s)) = self.store.get_snapshot(block.height) {
            return Some(s);
        }
        // Walk back to the nearest snapshot, then execute forward.
        let mut base_height = block.height;
        let mut base = None;
        while base_height > 0 {
            base_height -= 1;
            if let Ok(Some(s)) = self.store.get_snapshot(base_height) {
                base = Some(s);
                break;
            }
        }
        let mut snapshot = base?;
        let mut tracker = self.tracker_at(base_height).ok()?;
        let mut parent = self.frozen_block_at(base_height)?;
        for h in base_height + 1..=block.height {
            let b = self.frozen_block_at(h)?;
            // The threshold in force when this block was executed came from
            // its parent's cycle.
            let threshold = freeze_threshold(tracker.cycle_length());
            tracker = tracker.advanced(b.signer);
            snapshot = execute_block(
                &snapshot,
                &parent,
                &b.transactions,
                b.signer,
                b.version,
                threshold,
                &self.params,
            )
            .ok()?;
            parent = b;
        }
        Some(snapshot)
    }

    pub fn cycle_contains(&self, id: &Identifier) -> bool {
        self.tip
            .as_ref()
            .map(|t| t.cycle_set.contains(id))
            .unwrap_or(false)
    }

    pub fn current_cycle(&self) -> Vec<Identifier> {
        self.tip
            .as_ref()
            .map(|t| t.tracker.current_cycle().to_vec())
            .unwrap_or_default()
    }

    pub fn cycle_length(&self) -> usize {
        self.tip
            .as_ref()
            .map(|t| t.tracker.cycle_length())
            .unwrap_or(0)
    }

    /// Votes needed to freeze the next block, or to approve a pending cycle
    /// transaction.
    pub fn cycle_threshold(&self) -> usize {
        freeze_threshold(self.cycle_length())
    }

    /// Bootstrap era: before the chain starts, and until a signer repeats.
    pub fn in_genesis_cycle(&self) -> bool {
        match &self.tip {
            None => true,
            Some(t) => t.tracker.in_genesis_cycle(),
        }
    }

    /// The tracker a child block signed by `signer` would have.
    pub fn tracker_for_child(&self, signer: Identifier) -> Option<CycleTracker> {
        self.tip.as_ref().map(|t| t.tracker.advanced(signer))
    }

    /// The signer whose turn it is for the next height: the member of the
    /// running cycle that signed longest ago.
    pub fn next_scheduled_signer(&self) -> Option<Identifier> {
        self.tip
            .as_ref()
            .and_then(|t| t.tracker.current_cycle().first().copied())
    }

    /// Highest height open for candidates, bounded by wall-clock progress.
    pub fn open_edge_height(&self, now_ms: i64) -> u64 {
        let Some(frozen) = self.frozen_height() else {
            return 0;
        };
        let elapsed = now_ms - self.genesis_start;
        let clock_edge = if elapsed <= 0 {
            0
        } else {
            (elapsed / BLOCK_DURATION_MS) as u64 + 1
        };
        clock_edge.max(frozen + 1)
    }

    /// Nominal opening time of a height slot on this chain.
    pub fn slot_start(&self, height: u64) -> i64 {
        start_timestamp_for_height(self.genesis_start, height)
    }
}

impl FrozenHashLookup for FrozenChain {
    fn frozen_hash_at(&self, height: u64) -> Option<[u8; 32]> {
        if Some(height) > self.frozen_height() {
            return None;
        }
        self.frozen_block_at(height).map(|b| b.hash())
    }
}
