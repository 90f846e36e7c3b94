//! Cross-thread status snapshot.
//!
//! The consensus loop owns all consensus state; other threads (the status
//! endpoint) read through an atomically swapped snapshot published once per
//! freeze. Readers never touch live state.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

#[derive(Clone, Debug, Default, Serialize)]
pub struct StatusSnapshot {
    pub frozen_height: Option<u64>,
    pub frozen_hash: Option<String>,
    pub cycle_length: usize,
    pub open_edge_height: u64,
    pub tx_pool_len: usize,
}

#[derive(Clone, Default)]
pub struct StatusHandle {
    inner: Arc<RwLock<StatusSnapshot>>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: StatusSnapshot) {
        *self.inner.write() = snapshot;
    }

    pub fn read(&self) -> StatusSnapshot {
        self.inner.read().clone()
    }
}
