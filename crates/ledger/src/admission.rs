//! Deterministic transaction admission.
//!
//! Every honest signer running this filter over the same candidates and the
//! same parent state computes the same approved set, which is what lets
//! independently assembled blocks hash identically. Rejections drop the
//! transaction and continue; nothing here unwinds.

use std::collections::HashMap;

use crate::balance::BalanceSnapshot;
use crate::block::{start_timestamp_for_height, Block};
use crate::identifier::Identifier;
use crate::params::{ChainParams, BLOCK_DURATION_MS, MIN_PREFERRED_BALANCE};
use crate::tx::{Transaction, TxType};

/// Read access to frozen block hashes, for replay binding. Implemented by the
/// node's frozen chain and by test fixtures.
pub trait FrozenHashLookup {
    fn frozen_hash_at(&self, height: u64) -> Option<[u8; 32]>;
}

impl FrozenHashLookup for HashMap<u64, [u8; 32]> {
    fn frozen_hash_at(&self, height: u64) -> Option<[u8; 32]> {
        self.get(&height).copied()
    }
}

pub struct AdmissionContext<'a> {
    pub parent_block: &'a Block,
    pub parent_snapshot: &'a BalanceSnapshot,
    pub chain: &'a dyn FrozenHashLookup,
    pub params: &'a ChainParams,
    pub genesis_start: i64,
    /// Blockchain version of the block under construction.
    pub version: u16,
    /// Apply the per-block capacity cap (block assembly only; vote-time
    /// validation checks the set it is given).
    pub for_assembly: bool,
}

impl AdmissionContext<'_> {
    fn height(&self) -> u64 {
        self.parent_block.height + 1
    }
}

/// The admission pipeline: normalise, window, static validity, replay
/// binding, funding simulation, dust rules, capacity.
pub fn approved_transactions(
    mut candidates: Vec<Transaction>,
    ctx: &AdmissionContext,
) -> Vec<Transaction> {
    let height = ctx.height();
    let slot_start = start_timestamp_for_height(ctx.genesis_start, height);

    // Normalise: timestamp order with signature tie-break, duplicates out.
    candidates.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.signature.cmp(&b.signature))
    });
    candidates.dedup();

    candidates.retain(|tx| {
        // Only transactions stamped inside this height's slot belong here.
        if tx.timestamp < slot_start || tx.timestamp >= slot_start + BLOCK_DURATION_MS {
            return false;
        }
        // Replay binding: the named frozen block must exist with that hash.
        match ctx.chain.frozen_hash_at(tx.previous_hash_height) {
            Some(h) if h == tx.previous_block_hash => {}
            _ => return false,
        }
        // Type rules for this height and version, signature, memo bounds,
        // cycle-account and vote-binding rules.
        if tx.validate_static(height, ctx.version, ctx.params).is_err() {
            return false;
        }
        // Seed transfers only from designated seed accounts.
        if tx.tx_type == TxType::Seed && !ctx.params.is_seed_account(&tx.sender) {
            return false;
        }
        true
    });

    // Anti-dust (a): transfers that would create a sub-preferred account.
    candidates.retain(|tx| {
        let creates_account = !ctx.parent_snapshot.contains_account(&tx.receiver);
        !(creates_account && tx.amount > 1 && tx.amount < MIN_PREFERRED_BALANCE)
    });

    // Anti-dust (b): a sender aiming to leave itself a positive but
    // sub-preferred remainder has its transfers dropped. The remainder is
    // measured against everything the sender put forward for this block; a
    // sender overdrawing outright is the funding simulation's problem, not
    // dust.
    let mut intended_spend: HashMap<Identifier, i64> = HashMap::new();
    for tx in candidates.iter().filter(|tx| moves_funds(tx)) {
        *intended_spend.entry(tx.sender).or_insert(0) += tx.amount;
    }
    candidates.retain(|tx| {
        if !moves_funds(tx) {
            return true;
        }
        let start = ctx.parent_snapshot.balance_of(&tx.sender);
        let left = start - intended_spend.get(&tx.sender).copied().unwrap_or(0);
        !(left > 0 && left < MIN_PREFERRED_BALANCE)
    });

    // Sequential funding simulation over the sorted survivors.
    candidates = simulate(&candidates, ctx);

    if ctx.for_assembly {
        let cap = ctx.params.max_tx_per_block(ctx.version);
        if candidates.len() > cap {
            candidates.sort_by(|a, b| {
                b.amount
                    .cmp(&a.amount)
                    .then_with(|| a.tx_type.as_u8().cmp(&b.tx_type.as_u8()))
                    .then_with(|| a.signature.cmp(&b.signature))
            });
            candidates.truncate(cap);
            candidates.sort_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.signature.cmp(&b.signature))
            });
        }
    }

    candidates
}

fn moves_funds(tx: &Transaction) -> bool {
    matches!(tx.tx_type, TxType::Seed | TxType::Standard)
}

/// Walk the candidates in order against a working balance map; keep those the
/// sender can fund at their turn.
fn simulate(candidates: &[Transaction], ctx: &AdmissionContext) -> Vec<Transaction> {
    let mut balances: HashMap<Identifier, i64> = HashMap::new();
    let snapshot = ctx.parent_snapshot;
    let mut balance_of = |balances: &mut HashMap<Identifier, i64>, id: &Identifier| -> i64 {
        *balances.entry(*id).or_insert_with(|| {
            if id.is_cycle_account() {
                snapshot.cycle_account_balance()
            } else {
                snapshot.balance_of(id)
            }
        })
    };

    // Locked accounts share a cumulative transfer allowance that grows with
    // height; admissions beyond it are dropped in order.
    let mut unlock_sum = snapshot.unlock_transfer_sum;
    let unlock_threshold = ctx.params.unlock_threshold(ctx.height());

    let mut approved = Vec::with_capacity(candidates.len());
    for tx in candidates {
        let sender_balance = balance_of(&mut balances, &tx.sender);
        if sender_balance < tx.amount {
            continue;
        }
        if ctx.version >= 1 && moves_funds(tx) && ctx.params.is_locked_account(&tx.sender) {
            if unlock_sum + tx.amount > unlock_threshold {
                continue;
            }
            unlock_sum += tx.amount;
        }
        balances.insert(tx.sender, sender_balance - tx.amount);
        let fee = tx.fee();
        let credit = tx.amount - fee;
        let receiver_balance = balance_of(&mut balances, &tx.receiver);
        balances.insert(tx.receiver, receiver_balance + credit);
        approved.push(tx.clone());
    }
    approved
}
