//! Candidate blocks above the frozen edge.
//!
//! Registration is where a candidate earns its place: header and signature
//! checks, then a full execution against the parent state to confirm the
//! balance list hash it advertises. Registered candidates keep their computed
//! snapshot so freezing needs no second execution.

use std::collections::BTreeMap;

use solidus_ledger::cycle::Continuity;
use solidus_ledger::{execute_block, BalanceSnapshot, Block, ExecutionError};

use crate::frozen_chain::FrozenChain;
use crate::score;

/// Candidates kept per height once the Genesis cycle is over.
pub const MAX_PER_HEIGHT: usize = 10;

#[derive(thiserror::Error, Debug)]
pub enum RegisterError {
    #[error("height {got} is at or below the frozen edge {frozen}")]
    BelowFrozenEdge { got: u64, frozen: u64 },
    #[error("height {got} is beyond the open edge {open}")]
    BeyondOpenEdge { got: u64, open: u64 },
    #[error("no frozen edge and the block is not a genesis block")]
    NotStarted,
    #[error("header invalid: {0}")]
    Header(#[from] solidus_ledger::BlockError),
    #[error("genesis shape invalid: {0}")]
    Genesis(#[from] solidus_ledger::GenesisError),
    #[error("parent candidate not held; fetch it first")]
    MissingParent,
    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),
    #[error("advertised balance list hash does not match execution")]
    SnapshotHashMismatch,
}

pub struct Candidate {
    pub block: Block,
    pub snapshot: BalanceSnapshot,
    pub score: i64,
    pub first_seen_ms: i64,
}

#[derive(Default)]
pub struct UnfrozenStore {
    by_height: BTreeMap<u64, BTreeMap<[u8; 32], Candidate>>,
}

impl UnfrozenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and hold a candidate. Duplicate registration is idempotent.
    /// `vote_leader` shields the current leader from capacity eviction.
    pub fn register(
        &mut self,
        block: Block,
        chain: &FrozenChain,
        vote_leader: Option<[u8; 32]>,
        now_ms: i64,
    ) -> Result<(), RegisterError> {
        let hash = block.hash();

        let (snapshot, continuity) = match chain.frozen_height() {
            // Bootstrap: only a genesis block may be registered.
            None => {
                if block.height != 0 {
                    return Err(RegisterError::NotStarted);
                }
                block.validate_header(block.start_timestamp, chain.params().open_edge_slack_ms)?;
                let snapshot = solidus_ledger::genesis_snapshot_for_block(&block)?;
                if snapshot.hash() != block.balance_list_hash {
                    return Err(RegisterError::SnapshotHashMismatch);
                }
                (snapshot, Continuity::Continuous)
            }
            Some(frozen) => {
                if block.height <= frozen {
                    return Err(RegisterError::BelowFrozenEdge {
                        got: block.height,
                        frozen,
                    });
                }
                let open = chain.open_edge_height(now_ms);
                if block.height > open {
                    return Err(RegisterError::BeyondOpenEdge {
                        got: block.height,
                        open,
                    });
                }
                block.validate_header(chain.genesis_start(), chain.params().open_edge_slack_ms)?;

                // Parent state: the frozen edge for the next height, an
                // already-registered candidate beyond that.
                let (parent_block, parent_snapshot) = if block.height == frozen + 1 {
                    let pb = chain
                        .frozen_block()
                        .cloned()
                        .ok_or(RegisterError::MissingParent)?;
                    let ps = chain
                        .frozen_snapshot()
                        .cloned()
                        .ok_or(RegisterError::MissingParent)?;
                    (pb, ps)
                } else {
                    let parent = self
                        .lookup(block.height - 1, &block.previous_block_hash)
                        .ok_or(RegisterError::MissingParent)?;
                    (parent.block.clone(), parent.snapshot.clone())
                };
                if parent_block.hash() != block.previous_block_hash {
                    return Err(RegisterError::MissingParent);
                }

                let snapshot = execute_block(
                    &parent_snapshot,
                    &parent_block,
                    &block.transactions,
                    block.signer,
                    block.version,
                    chain.cycle_threshold(),
                    chain.params(),
                )?;
                if snapshot.hash() != block.balance_list_hash {
                    return Err(RegisterError::SnapshotHashMismatch);
                }
                let continuity = chain
                    .tracker_for_child(block.signer)
                    .map(|t| t.continuity())
                    .unwrap_or(Continuity::Undetermined);
                (snapshot, continuity)
            }
        };

        // Before genesis freezes the chain has no slot anchor; a genesis
        // candidate anchors on itself.
        let genesis_start = if chain.frozen_height().is_none() {
            block.start_timestamp
        } else {
            chain.genesis_start()
        };
        let entry = self.by_height.entry(block.height).or_default();
        if entry.contains_key(&hash) {
            return Ok(());
        }
        let candidate = Candidate {
            score: score::chain_score(&block, genesis_start, continuity, 0),
            block,
            snapshot,
            first_seen_ms: now_ms,
        };
        let height = candidate.block.height;
        entry.insert(hash, candidate);
        log::debug!(
            "registered candidate {} at height {height}",
            hex::encode(&hash[..4])
        );

        // Bounded retention, suspended during the Genesis cycle. The worst
        // scorer goes, unless the votes say otherwise.
        if !chain.in_genesis_cycle() {
            let entry = self.by_height.entry(height).or_default();
            while entry.len() > MAX_PER_HEIGHT {
                let worst = entry
                    .iter()
                    .filter(|(h, _)| Some(**h) != vote_leader)
                    .max_by(|(ah, a), (bh, b)| a.score.cmp(&b.score).then_with(|| ah.cmp(bh)))
                    .map(|(h, _)| *h);
                match worst {
                    Some(h) => {
                        entry.remove(&h);
                        log::debug!("evicted candidate {} at height {height}", hex::encode(&h[..4]));
                    }
                    None => break,
                }
            }
        }
        Ok(())
    }

    pub fn lookup(&self, height: u64, hash: &[u8; 32]) -> Option<&Candidate> {
        self.by_height.get(&height)?.get(hash)
    }

    pub fn candidates_at(&self, height: u64) -> impl Iterator<Item = &Candidate> {
        self.by_height.get(&height).into_iter().flatten().map(|(_, c)| c)
    }

    pub fn len_at(&self, height: u64) -> usize {
        self.by_height.get(&height).map(|m| m.len()).unwrap_or(0)
    }

    /// Remove the candidate with this hash, returning it. Used when freezing.
    pub fn take(&mut self, height: u64, hash: &[u8; 32]) -> Option<Candidate> {
        self.by_height.get_mut(&height)?.remove(hash)
    }

    /// Drop every candidate at or below the new frozen height.
    pub fn prune(&mut self, frozen_height: u64) {
        self.by_height = self.by_height.split_off(&(frozen_height + 1));
    }
}
