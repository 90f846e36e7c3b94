//! Deterministic derivation of the next balance snapshot.
//!
//! `execute_block` is a pure function of the parent state and the ordered,
//! already-admitted transaction list. Admission has filtered anything
//! recoverable; every failure here means the proposing signer built a
//! malformed block, so all errors are fatal for that block.

use std::collections::BTreeMap;

use solidus_crypto::verify_signature;

use crate::balance::{ApprovedCycleTx, BalanceItem, BalanceSnapshot};
use crate::block::Block;
use crate::identifier::Identifier;
use crate::params::{
    ChainParams, ACCOUNT_FEE_PERIOD, APPROVED_RETENTION_BLOCKS, FEE_THRESHOLD, MAX_PREV_SIGNERS,
    TOTAL_SUPPLY,
};
use crate::tx::{Transaction, TxType};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("parent snapshot at height {snapshot} does not match parent block {block}")]
    ParentMismatch { snapshot: u64, block: u64 },
    #[error("blockchain version regressed from {parent} to {requested}")]
    VersionRegression { parent: u16, requested: u16 },
    #[error("account {} went negative: {balance}", identifier.short_hex())]
    NegativeBalance {
        identifier: Identifier,
        balance: i64,
    },
    #[error("locked-account transfers {sum} exceed unlock threshold {threshold}")]
    UnlockLimitExceeded { sum: i64, threshold: i64 },
    #[error("supply mismatch after execution: {got}, expected {expected}")]
    SupplyMismatch { expected: i64, got: i64 },
}

#[derive(Clone, Copy)]
struct WorkingAccount {
    balance: i64,
    blocks_until_fee: u16,
    carried: bool,
}

/// Derive the snapshot for `parent_block.height + 1`.
///
/// `cycle_threshold` is the voter-signature count that approves a pending
/// cycle transaction (zero disables promotion and is what callers pass below
/// blockchain version 2).
pub fn execute_block(
    parent: &BalanceSnapshot,
    parent_block: &Block,
    transactions: &[Transaction],
    signer: Identifier,
    version: u16,
    cycle_threshold: usize,
    params: &ChainParams,
) -> Result<BalanceSnapshot, ExecutionError> {
    if parent.block_height != parent_block.height {
        return Err(ExecutionError::ParentMismatch {
            snapshot: parent.block_height,
            block: parent_block.height,
        });
    }
    if version < parent.blockchain_version {
        return Err(ExecutionError::VersionRegression {
            parent: parent.blockchain_version,
            requested: version,
        });
    }
    let height = parent_block.height + 1;

    let mut accounts: BTreeMap<Identifier, WorkingAccount> = BTreeMap::new();
    for item in &parent.items {
        accounts.insert(
            item.identifier,
            WorkingAccount {
                balance: item.balance,
                blocks_until_fee: item.blocks_until_fee,
                carried: true,
            },
        );
    }
    // Fees carried over from the parent join this block's pot.
    let mut total_fees: i64 = parent.rollover_fees as i64;

    // Materialise the cycle account at its derived balance. The derivation
    // and the stored entry agree under the supply invariant; deriving also
    // covers the first block after the version 2 upgrade, where no entry
    // exists yet.
    if version >= 2 {
        let cycle_balance = parent.cycle_account_balance();
        accounts.insert(
            Identifier::CYCLE_ACCOUNT,
            WorkingAccount {
                balance: cycle_balance,
                blocks_until_fee: ACCOUNT_FEE_PERIOD,
                carried: false,
            },
        );
    }

    let mut pending = parent.pending_cycle_txs.clone();
    let mut approved = parent.recently_approved_cycle_txs.clone();
    let mut locked_transfer_sum: i64 = 0;

    for tx in transactions {
        let fee = tx.fee();
        match tx.tx_type {
            TxType::CoinGeneration => {
                credit(&mut accounts, tx.receiver, tx.amount);
            }
            TxType::Seed | TxType::Standard => {
                credit(&mut accounts, tx.sender, -tx.amount);
                credit(&mut accounts, tx.receiver, tx.amount - fee);
                total_fees += fee;
                if params.is_locked_account(&tx.sender) {
                    locked_transfer_sum += tx.amount;
                }
            }
            TxType::Cycle => {
                let signatures = tx.valid_cycle_signature_count();
                if cycle_threshold > 0 && signatures >= cycle_threshold {
                    // Already carries enough approvals: the transfer executes
                    // in this block, funded by the cycle account.
                    apply_cycle_transfer(&mut accounts, tx, height, &mut approved);
                } else {
                    // One pending transaction per initiator; a re-submission
                    // replaces the earlier one and its collected votes.
                    pending.retain(|p| p.initiator() != tx.initiator());
                    pending.push(tx.clone());
                }
            }
            TxType::CycleSignature => {
                // Votes for unknown pending transactions are ignored; a vote
                // is only as good as the approval signature it carries.
                let Some(target) = tx.cycle_tx_signature else {
                    continue;
                };
                let Some(approval) = tx.cycle_signatures.get(&tx.sender).copied() else {
                    continue;
                };
                if let Some(p) = pending.iter_mut().find(|p| p.signature == target) {
                    if verify_signature(approval.as_bytes(), target.as_bytes(), tx.sender.as_bytes())
                    {
                        p.cycle_signatures.insert(tx.sender, approval);
                    }
                }
            }
        }
    }

    // Maintenance fees: small carried accounts pay one micro-unit each time
    // their countdown lapses.
    if version >= 1 {
        for (id, acct) in accounts.iter_mut() {
            if !acct.carried || id.is_cycle_account() {
                continue;
            }
            acct.blocks_until_fee = acct.blocks_until_fee.saturating_sub(1);
            if acct.blocks_until_fee == 0 {
                if acct.balance > 0 && acct.balance < FEE_THRESHOLD {
                    acct.balance -= 1;
                    total_fees += 1;
                }
                acct.blocks_until_fee = ACCOUNT_FEE_PERIOD;
            }
        }
    }

    // Promote pending cycle transactions whose vote maps reached the
    // threshold during this block, and age out old approvals.
    if version >= 2 && cycle_threshold > 0 {
        let mut still_pending = Vec::with_capacity(pending.len());
        for tx in pending {
            if tx.valid_cycle_signature_count() >= cycle_threshold {
                apply_cycle_transfer(&mut accounts, &tx, height, &mut approved);
            } else {
                still_pending.push(tx);
            }
        }
        pending = still_pending;
    }
    approved.retain(|a| height.saturating_sub(a.approval_height) <= APPROVED_RETENTION_BLOCKS);

    // Split the pot across the most recent distinct signers, newest first.
    let mut signers: Vec<Identifier> = Vec::with_capacity(MAX_PREV_SIGNERS);
    signers.push(signer);
    for id in &parent.previous_signers {
        if signers.len() == MAX_PREV_SIGNERS {
            break;
        }
        if !signers.contains(id) {
            signers.push(*id);
        }
    }
    let n = signers.len() as i64;
    let share = total_fees / n;
    let mut remainder = total_fees % n;
    for (i, id) in signers.iter().enumerate() {
        // A remainder wider than the rollover byte is spread one micro-unit
        // at a time over the leading signers.
        let extra = if remainder > 2 && (i as i64) < remainder {
            1
        } else {
            0
        };
        if share + extra > 0 {
            credit(&mut accounts, *id, share + extra);
        }
    }
    if remainder > 2 {
        remainder = 0;
    }

    // Rebuild the item list: sorted by construction, zero balances dropped,
    // negatives impossible for admitted transactions.
    let mut items = Vec::with_capacity(accounts.len());
    for (identifier, acct) in &accounts {
        if acct.balance == 0 {
            continue;
        }
        if acct.balance < 0 {
            return Err(ExecutionError::NegativeBalance {
                identifier: *identifier,
                balance: acct.balance,
            });
        }
        items.push(BalanceItem {
            identifier: *identifier,
            balance: acct.balance,
            blocks_until_fee: acct.blocks_until_fee,
        });
    }

    let unlock_threshold = params.unlock_threshold(height);
    let unlock_transfer_sum = parent.unlock_transfer_sum + locked_transfer_sum;
    if version >= 1 && locked_transfer_sum > 0 && unlock_transfer_sum > unlock_threshold {
        return Err(ExecutionError::UnlockLimitExceeded {
            sum: unlock_transfer_sum,
            threshold: unlock_threshold,
        });
    }

    let snapshot = BalanceSnapshot {
        blockchain_version: version,
        block_height: height,
        rollover_fees: remainder as u8,
        previous_signers: signers,
        items,
        unlock_threshold: if version >= 1 { unlock_threshold } else { 0 },
        unlock_transfer_sum: if version >= 1 { unlock_transfer_sum } else { 0 },
        pending_cycle_txs: if version >= 2 { pending } else { Vec::new() },
        recently_approved_cycle_txs: if version >= 2 { approved } else { Vec::new() },
    };

    let total: i64 =
        snapshot.items.iter().map(|i| i.balance).sum::<i64>() + snapshot.rollover_fees as i64;
    if total != TOTAL_SUPPLY {
        log::error!(
            "supply invariant violated at height {height}: {total} != {TOTAL_SUPPLY}"
        );
        return Err(ExecutionError::SupplyMismatch {
            expected: TOTAL_SUPPLY,
            got: total,
        });
    }

    Ok(snapshot)
}

fn credit(accounts: &mut BTreeMap<Identifier, WorkingAccount>, id: Identifier, v: i64) {
    let acct = accounts.entry(id).or_insert(WorkingAccount {
        balance: 0,
        blocks_until_fee: ACCOUNT_FEE_PERIOD,
        carried: false,
    });
    acct.balance += v;
}

fn apply_cycle_transfer(
    accounts: &mut BTreeMap<Identifier, WorkingAccount>,
    tx: &Transaction,
    height: u64,
    approved: &mut Vec<ApprovedCycleTx>,
) {
    credit(accounts, Identifier::CYCLE_ACCOUNT, -tx.amount);
    credit(accounts, tx.receiver, tx.amount);
    approved.push(ApprovedCycleTx {
        initiator: tx.initiator().unwrap_or_default(),
        receiver: tx.receiver,
        approval_height: height,
        amount: tx.amount,
    });
    log::info!(
        "cycle transfer approved at height {height}: {} micro to {}",
        tx.amount,
        tx.receiver.short_hex()
    );
}
