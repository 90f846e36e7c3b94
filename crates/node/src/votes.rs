//! Vote tallying with flip throttling.
//!
//! One vote per voter per height, last-writer-wins, except that changing an
//! existing vote requires repeated confirmation and a minimum age. That slows
//! vote oscillation without forbidding genuine changes of mind.

use std::collections::{BTreeMap, HashMap, HashSet};

use solidus_ledger::{Identifier, BLOCK_DURATION_MS};

/// Heights of tally history kept below the frozen edge.
pub const VOTE_RETENTION_BLOCKS: u64 = 40;

pub const FLIP_CONFIRMATIONS: u32 = 2;
pub const FLIP_MIN_AGE_MS: i64 = 2 * BLOCK_DURATION_MS;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VoteError {
    #[error("voter is not in the current cycle")]
    IneligibleVoter,
    #[error("height {got} outside the votable range ({frozen}, {open}]")]
    HeightOutOfRange { got: u64, frozen: u64, open: u64 },
    #[error("vote change throttled ({confirmations} confirmations, {age_ms} ms old)")]
    FlipThrottled { confirmations: u32, age_ms: i64 },
}

#[derive(Clone, Copy, Debug)]
struct VoteRecord {
    hash: [u8; 32],
    received_at_ms: i64,
}

#[derive(Default)]
pub struct VoteTallier {
    votes: BTreeMap<u64, HashMap<Identifier, VoteRecord>>,
    /// Confirmation counters for attempted vote changes, keyed by the vote
    /// being switched to.
    flip_counts: HashMap<(u64, Identifier, [u8; 32]), u32>,
}

impl VoteTallier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a vote. First votes land immediately; changes go through the
    /// flip throttle.
    pub fn register_vote(
        &mut self,
        height: u64,
        voter: Identifier,
        hash: [u8; 32],
        now_ms: i64,
    ) -> Result<(), VoteError> {
        let entry = self.votes.entry(height).or_default();
        match entry.get(&voter) {
            None => {
                entry.insert(
                    voter,
                    VoteRecord {
                        hash,
                        received_at_ms: now_ms,
                    },
                );
                Ok(())
            }
            Some(prior) if prior.hash == hash => Ok(()),
            Some(prior) => {
                let key = (height, voter, hash);
                let confirmations = self.flip_counts.entry(key).or_insert(0);
                *confirmations += 1;
                let age_ms = now_ms - prior.received_at_ms;
                if *confirmations >= FLIP_CONFIRMATIONS && age_ms >= FLIP_MIN_AGE_MS {
                    let confirmations = *confirmations;
                    self.flip_counts.remove(&key);
                    entry.insert(
                        voter,
                        VoteRecord {
                            hash,
                            received_at_ms: now_ms,
                        },
                    );
                    log::debug!(
                        "vote flipped at height {height} after {confirmations} confirmations"
                    );
                    Ok(())
                } else {
                    Err(VoteError::FlipThrottled {
                        confirmations: *confirmations,
                        age_ms,
                    })
                }
            }
        }
    }

    /// The hash with the most votes at a height, counting only voters in
    /// `committee` (None counts everyone, for the bootstrap era). Ties break
    /// toward the lexicographically smallest hash.
    pub fn leading_hash(
        &self,
        height: u64,
        committee: Option<&HashSet<Identifier>>,
    ) -> (Option<[u8; 32]>, usize) {
        let Some(entry) = self.votes.get(&height) else {
            return (None, 0);
        };
        let mut counts: BTreeMap<[u8; 32], usize> = BTreeMap::new();
        for (voter, record) in entry {
            if committee.map(|c| c.contains(voter)).unwrap_or(true) {
                *counts.entry(record.hash).or_insert(0) += 1;
            }
        }
        let mut best: Option<([u8; 32], usize)> = None;
        for (hash, count) in counts {
            // BTreeMap iterates hashes ascending, so on equal counts the
            // first (smallest) hash wins.
            if best.map(|(_, c)| count > c).unwrap_or(true) {
                best = Some((hash, count));
            }
        }
        match best {
            Some((hash, count)) => (Some(hash), count),
            None => (None, 0),
        }
    }

    /// This voter's current vote at a height.
    pub fn vote_of(&self, height: u64, voter: &Identifier) -> Option<[u8; 32]> {
        Some(self.votes.get(&height)?.get(voter)?.hash)
    }

    /// Total voters recorded at a height, committee-filtered or not.
    pub fn voter_count(&self, height: u64) -> usize {
        self.votes.get(&height).map(|m| m.len()).unwrap_or(0)
    }

    /// Drop tallies at heights at or below `frozen - retention`.
    pub fn prune(&mut self, frozen_height: u64) {
        if frozen_height <= VOTE_RETENTION_BLOCKS {
            return;
        }
        let cutoff = frozen_height - VOTE_RETENTION_BLOCKS;
        self.votes = self.votes.split_off(&(cutoff + 1));
        self.flip_counts.retain(|(h, _, _), _| *h > cutoff);
    }
}
