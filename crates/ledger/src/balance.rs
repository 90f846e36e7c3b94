//! The balance list: post-execution account state summarised in each block.
//!
//! Items are kept strictly sorted by identifier so the canonical bytes, and
//! therefore the hash committed into the block, are unique for a given state.

use solidus_crypto::sha256d;

use crate::identifier::{Identifier, Signature};
use crate::params::{MAX_PREV_SIGNERS, TOTAL_SUPPLY};
use crate::tx::Transaction;
use crate::wire::{self, DecodeError};

/// Bound on decoded collections; far above any state this chain can reach.
const MAX_ITEMS: usize = 10_000_000;
const MAX_PENDING: usize = 100_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BalanceItem {
    pub identifier: Identifier,
    pub balance: i64,
    /// Countdown to the next maintenance-fee check.
    pub blocks_until_fee: u16,
}

/// A cycle transfer that reached approval, retained for a window so late
/// observers can audit it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApprovedCycleTx {
    pub initiator: Identifier,
    pub receiver: Identifier,
    pub approval_height: u64,
    pub amount: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct BalanceSnapshot {
    pub blockchain_version: u16,
    pub block_height: u64,
    /// Fee micro-units not evenly divisible among recent signers, carried
    /// into the next block.
    pub rollover_fees: u8,
    /// Up to nine most recent distinct signers, newest first.
    pub previous_signers: Vec<Identifier>,
    /// Strictly ascending by identifier; no zero balances.
    pub items: Vec<BalanceItem>,
    /// Version 1+: cumulative cap state for locked accounts.
    pub unlock_threshold: i64,
    pub unlock_transfer_sum: i64,
    /// Version 2+: cycle transfers awaiting voter approval, one per
    /// initiator.
    pub pending_cycle_txs: Vec<Transaction>,
    /// Version 2+: approved transfers inside the retention window.
    pub recently_approved_cycle_txs: Vec<ApprovedCycleTx>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("supply mismatch: items + rollover = {got}, expected {expected}")]
    SupplyMismatch { expected: i64, got: i64 },
    #[error("items not strictly ascending at index {index}")]
    UnsortedItems { index: usize },
    #[error("zero or negative balance at index {index}")]
    NonPositiveBalance { index: usize },
    #[error("too many previous signers: {len}")]
    TooManyPreviousSigners { len: usize },
    #[error("duplicate previous signer")]
    DuplicatePreviousSigner,
}

impl BalanceSnapshot {
    /// Canonical bytes. Version decides which trailing sections exist, so
    /// snapshots of different versions never collide on a prefix.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        wire::write_u16(&mut out, self.blockchain_version);
        wire::write_u64(&mut out, self.block_height);
        wire::write_u8(&mut out, self.rollover_fees);
        wire::write_count(&mut out, self.previous_signers.len());
        for id in &self.previous_signers {
            wire::write_32(&mut out, id.as_bytes());
        }
        wire::write_count(&mut out, self.items.len());
        for item in &self.items {
            wire::write_32(&mut out, item.identifier.as_bytes());
            wire::write_i64(&mut out, item.balance);
            wire::write_u16(&mut out, item.blocks_until_fee);
        }
        if self.blockchain_version >= 1 {
            wire::write_i64(&mut out, self.unlock_threshold);
            wire::write_i64(&mut out, self.unlock_transfer_sum);
        }
        if self.blockchain_version >= 2 {
            wire::write_count(&mut out, self.pending_cycle_txs.len());
            for tx in &self.pending_cycle_txs {
                out.extend_from_slice(&tx.to_bytes());
            }
            wire::write_count(&mut out, self.recently_approved_cycle_txs.len());
            for a in &self.recently_approved_cycle_txs {
                wire::write_32(&mut out, a.initiator.as_bytes());
                wire::write_32(&mut out, a.receiver.as_bytes());
                wire::write_u64(&mut out, a.approval_height);
                wire::write_i64(&mut out, a.amount);
            }
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<BalanceSnapshot, DecodeError> {
        let mut input = bytes;
        let snapshot = Self::decode(&mut input)?;
        wire::expect_consumed(input)?;
        Ok(snapshot)
    }

    pub fn decode(input: &mut &[u8]) -> Result<BalanceSnapshot, DecodeError> {
        let blockchain_version = wire::read_u16(input)?;
        let block_height = wire::read_u64(input)?;
        let rollover_fees = wire::read_u8(input)?;
        let signer_count = wire::read_count(input, "previous signers", MAX_PREV_SIGNERS)?;
        let mut previous_signers = Vec::with_capacity(signer_count);
        for _ in 0..signer_count {
            previous_signers.push(wire::read_identifier(input)?);
        }
        let item_count = wire::read_count(input, "balance items", MAX_ITEMS)?;
        let mut items = Vec::with_capacity(item_count.min(1 << 16));
        for _ in 0..item_count {
            let identifier = wire::read_identifier(input)?;
            let balance = wire::read_i64(input)?;
            let blocks_until_fee = wire::read_u16(input)?;
            items.push(BalanceItem {
                identifier,
                balance,
                blocks_until_fee,
            });
        }
        let mut snapshot = BalanceSnapshot {
            blockchain_version,
            block_height,
            rollover_fees,
            previous_signers,
            items,
            ..BalanceSnapshot::default()
        };
        if blockchain_version >= 1 {
            snapshot.unlock_threshold = wire::read_i64(input)?;
            snapshot.unlock_transfer_sum = wire::read_i64(input)?;
        }
        if blockchain_version >= 2 {
            let pending = wire::read_count(input, "pending cycle txs", MAX_PENDING)?;
            for _ in 0..pending {
                snapshot.pending_cycle_txs.push(Transaction::decode(input)?);
            }
            let approved = wire::read_count(input, "approved cycle txs", MAX_PENDING)?;
            for _ in 0..approved {
                let initiator = wire::read_identifier(input)?;
                let receiver = wire::read_identifier(input)?;
                let approval_height = wire::read_u64(input)?;
                let amount = wire::read_i64(input)?;
                snapshot.recently_approved_cycle_txs.push(ApprovedCycleTx {
                    initiator,
                    receiver,
                    approval_height,
                    amount,
                });
            }
        }
        Ok(snapshot)
    }

    pub fn hash(&self) -> [u8; 32] {
        sha256d(&self.to_bytes())
    }

    /// Balance of an account, zero when absent. Items are sorted, so this is
    /// a binary search.
    pub fn balance_of(&self, id: &Identifier) -> i64 {
        match self
            .items
            .binary_search_by(|item| item.identifier.cmp(id))
        {
            Ok(i) => self.items[i].balance,
            Err(_) => 0,
        }
    }

    pub fn contains_account(&self, id: &Identifier) -> bool {
        self.items
            .binary_search_by(|item| item.identifier.cmp(id))
            .is_ok()
    }

    /// Effective balance of the cycle account at the start of the next
    /// block: the supply not held by any other account. Under the supply
    /// invariant this equals the stored cycle entry, but deriving it keeps
    /// the definition independent of whether the entry exists yet.
    pub fn cycle_account_balance(&self) -> i64 {
        let others: i64 = self
            .items
            .iter()
            .filter(|i| !i.identifier.is_cycle_account())
            .map(|i| i.balance)
            .sum();
        TOTAL_SUPPLY - others - self.rollover_fees as i64
    }

    /// The pending cycle transaction matching an initiator signature, if any.
    pub fn pending_cycle_tx(&self, initiator_signature: &Signature) -> Option<&Transaction> {
        self.pending_cycle_txs
            .iter()
            .find(|tx| tx.signature == *initiator_signature)
    }

    /// Structural invariants every snapshot must satisfy. Called after
    /// execution and by tests; a violation is fatal for the block that
    /// produced it.
    pub fn check_invariants(&self) -> Result<(), SnapshotError> {
        let mut sum: i64 = self.rollover_fees as i64;
        for (index, item) in self.items.iter().enumerate() {
            if item.balance <= 0 {
                return Err(SnapshotError::NonPositiveBalance { index });
            }
            if index > 0 && self.items[index - 1].identifier >= item.identifier {
                return Err(SnapshotError::UnsortedItems { index });
            }
            sum += item.balance;
        }
        if sum != TOTAL_SUPPLY {
            return Err(SnapshotError::SupplyMismatch {
                expected: TOTAL_SUPPLY,
                got: sum,
            });
        }
        if self.previous_signers.len() > MAX_PREV_SIGNERS {
            return Err(SnapshotError::TooManyPreviousSigners {
                len: self.previous_signers.len(),
            });
        }
        for (i, a) in self.previous_signers.iter().enumerate() {
            if self.previous_signers[..i].contains(a) {
                return Err(SnapshotError::DuplicatePreviousSigner);
            }
        }
        Ok(())
    }
}
