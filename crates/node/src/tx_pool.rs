//! Holding area for transactions awaiting block assembly.
//!
//! Admission policy stays thin here: structural dedup by signature, a global
//! cap, and a per-sender cap against flooding. Full validation happens in the
//! admission filter when a block is assembled.

use std::collections::BTreeMap;

use solidus_ledger::identifier::Signature;
use solidus_ledger::Transaction;

pub const DEFAULT_CAPACITY: usize = 100_000;
pub const MAX_PER_SENDER: usize = 1_000;

#[derive(Default)]
pub struct TxPool {
    txs: BTreeMap<Signature, Transaction>,
    capacity: usize,
}

impl TxPool {
    pub fn new(capacity: usize) -> Self {
        TxPool {
            txs: BTreeMap::new(),
            capacity,
        }
    }

    /// Accept a transaction unless the pool or its sender is full. Duplicate
    /// signatures are no-ops.
    pub fn add(&mut self, tx: Transaction) -> bool {
        if self.txs.contains_key(&tx.signature) {
            return false;
        }
        if self.txs.len() >= self.capacity {
            log::warn!("transaction pool full, dropping incoming transaction");
            return false;
        }
        let from_sender = self
            .txs
            .values()
            .filter(|t| t.sender == tx.sender)
            .count();
        if from_sender >= MAX_PER_SENDER {
            log::debug!(
                "per-sender cap reached for {}, dropping transaction",
                tx.sender.short_hex()
            );
            return false;
        }
        self.txs.insert(tx.signature, tx);
        true
    }

    /// Current candidates in timestamp order, ready for admission.
    pub fn candidates(&self) -> Vec<Transaction> {
        let mut out: Vec<Transaction> = self.txs.values().cloned().collect();
        out.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.signature.cmp(&b.signature))
        });
        out
    }

    /// Drop transactions stamped before the given slot start; they can never
    /// be admitted again.
    pub fn prune_before(&mut self, slot_start_ms: i64) {
        self.txs.retain(|_, tx| tx.timestamp >= slot_start_ms);
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }
}
