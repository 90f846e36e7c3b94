//! Chain constants and tunable parameters.

use crate::identifier::Identifier;

/// Micro-units per whole unit.
pub const MICROS_PER_UNIT: i64 = 1_000_000;

/// Fixed total supply in micro-units: 100,000,000 units, minted at genesis.
pub const TOTAL_SUPPLY: i64 = 100_000_000 * MICROS_PER_UNIT;

/// Wall-clock duration of one block height.
pub const BLOCK_DURATION_MS: i64 = 7_000;

/// Balances below this are discouraged by the dust filter.
pub const MIN_PREFERRED_BALANCE: i64 = 10 * MICROS_PER_UNIT;

/// Fee recipients per block: the signer plus up to eight predecessors.
pub const MAX_PREV_SIGNERS: usize = 9;

/// Accounts below `FEE_THRESHOLD` pay a 1 micro-unit maintenance fee every
/// `ACCOUNT_FEE_PERIOD` blocks (blockchain version 1 and later).
pub const FEE_THRESHOLD: i64 = 10 * MICROS_PER_UNIT;
pub const ACCOUNT_FEE_PERIOD: u16 = 500;

/// How long an approved cycle transaction stays recorded in the balance list.
pub const APPROVED_RETENTION_BLOCKS: u64 = 10_000;

/// Tunable chain parameters. Everything consensus-relevant that is plain data
/// lives here so tests and alternate deployments can vary it in one place.
#[derive(Clone, Debug)]
pub struct ChainParams {
    /// Blocks per height slot, duplicated from the constant so tests can
    /// compress time without patching every call site.
    pub block_duration_ms: i64,
    /// How far past `start_timestamp` a verification timestamp may fall.
    pub open_edge_slack_ms: i64,
    /// Seed transactions are rejected at and above this height.
    pub seed_cutoff_height: u64,
    /// Senders allowed to issue seed transactions.
    pub seed_accounts: Vec<Identifier>,
    /// Accounts subject to the transfer-unlock schedule.
    pub locked_accounts: Vec<Identifier>,
    /// Height at which locked accounts begin unlocking.
    pub unlock_start_height: u64,
    /// Additional micro-units unlocked per block past the start height.
    pub unlock_per_block: i64,
    /// Transaction capacity per block, by blockchain version.
    pub max_tx_per_block_v0: usize,
    pub max_tx_per_block_v1: usize,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            block_duration_ms: BLOCK_DURATION_MS,
            open_edge_slack_ms: BLOCK_DURATION_MS,
            seed_cutoff_height: 1_000_000,
            seed_accounts: Vec::new(),
            locked_accounts: Vec::new(),
            unlock_start_height: 1_500_000,
            unlock_per_block: 100 * MICROS_PER_UNIT,
            max_tx_per_block_v0: 10_000,
            max_tx_per_block_v1: 30_000,
        }
    }
}

impl ChainParams {
    pub fn max_tx_per_block(&self, version: u16) -> usize {
        if version >= 1 {
            self.max_tx_per_block_v1
        } else {
            self.max_tx_per_block_v0
        }
    }

    pub fn is_locked_account(&self, id: &Identifier) -> bool {
        self.locked_accounts.contains(id)
    }

    pub fn is_seed_account(&self, id: &Identifier) -> bool {
        self.seed_accounts.contains(id)
    }

    /// Cumulative micro-units that locked accounts may have transferred by
    /// `height`. Grows linearly once unlocking starts.
    pub fn unlock_threshold(&self, height: u64) -> i64 {
        if height <= self.unlock_start_height {
            return 0;
        }
        let blocks = (height - self.unlock_start_height) as i64;
        blocks.saturating_mul(self.unlock_per_block)
    }
}

/// Votes required to freeze a block or approve a cycle transaction: strictly
/// more than three quarters of the cycle, clamped to the cycle size so short
/// Genesis-era cycles can still make progress.
pub fn freeze_threshold(cycle_len: usize) -> usize {
    let supermajority = (3 * cycle_len).div_ceil(4) + 1;
    supermajority.min(cycle_len).max(1)
}
