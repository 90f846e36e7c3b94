pub mod identifier;

pub mod wire;

pub mod params;

pub mod tx;

pub mod balance;

pub mod block;

pub mod cycle;

pub mod executor;

pub mod admission;

pub mod genesis;

pub use identifier::{Identifier, Signature};

pub use params::{
    ChainParams, ACCOUNT_FEE_PERIOD, APPROVED_RETENTION_BLOCKS, BLOCK_DURATION_MS, FEE_THRESHOLD,
    MAX_PREV_SIGNERS, MICROS_PER_UNIT, MIN_PREFERRED_BALANCE, TOTAL_SUPPLY,
};

pub use wire::DecodeError;

pub use tx::{Transaction, TxError, TxType};

pub use balance::{ApprovedCycleTx, BalanceItem, BalanceSnapshot, SnapshotError};

pub use block::{start_timestamp_for_height, Block, BlockError};

pub use cycle::{Continuity, CycleTracker, NewVerifierState};

pub use executor::{execute_block, ExecutionError};

pub use admission::{approved_transactions, AdmissionContext, FrozenHashLookup};

pub use genesis::{build_genesis, genesis_snapshot_for_block, GenesisConfig, GenesisError};
