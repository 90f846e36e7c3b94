//! Genesis construction.
//!
//! The Genesis block mints the entire supply to a configured recipient with a
//! single CoinGeneration transaction. Its snapshot is built directly rather
//! than through the executor: there is no parent state, no fees, and no
//! previous signers.

use serde::{Deserialize, Serialize};
use solidus_crypto::SignerIdentity;

use crate::balance::{BalanceItem, BalanceSnapshot};
use crate::block::Block;
use crate::identifier::Identifier;
use crate::params::{ACCOUNT_FEE_PERIOD, TOTAL_SUPPLY};
use crate::tx::{Transaction, TxType};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GenesisError {
    #[error("genesis block must be at height 0, got {got}")]
    NotHeightZero { got: u64 },
    #[error("genesis previous hash must be zero")]
    NonZeroPreviousHash,
    #[error("genesis must contain exactly one coin-generation transaction")]
    BadTransactionSet,
    #[error("genesis must mint the full supply, got {got}")]
    WrongSupply { got: i64 },
}

/// On-disk genesis description, loaded from JSON by the node binary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Millisecond timestamp of height 0; every later slot derives from it.
    pub start_timestamp: i64,
    /// Account receiving the minted supply.
    pub supply_recipient: Identifier,
    /// Blockchain version the chain starts at.
    #[serde(default)]
    pub blockchain_version: u16,
}

/// Build the Genesis block and its snapshot, signed by `identity`.
pub fn build_genesis(
    config: &GenesisConfig,
    identity: &SignerIdentity,
) -> (Block, BalanceSnapshot) {
    let mint = Transaction::coin_generation(
        config.start_timestamp,
        TOTAL_SUPPLY,
        config.supply_recipient,
    );
    let snapshot = BalanceSnapshot {
        blockchain_version: config.blockchain_version,
        block_height: 0,
        rollover_fees: 0,
        previous_signers: Vec::new(),
        items: vec![BalanceItem {
            identifier: config.supply_recipient,
            balance: TOTAL_SUPPLY,
            blocks_until_fee: ACCOUNT_FEE_PERIOD,
        }],
        ..BalanceSnapshot::default()
    };
    let block = Block::new_signed(
        config.blockchain_version,
        0,
        [0u8; 32],
        config.start_timestamp,
        config.start_timestamp,
        vec![mint],
        snapshot.hash(),
        identity,
    );
    (block, snapshot)
}

/// Validate a Genesis block received from elsewhere and derive its snapshot.
/// Used when the chain bootstraps from a registered candidate instead of a
/// local config.
pub fn genesis_snapshot_for_block(block: &Block) -> Result<BalanceSnapshot, GenesisError> {
    if block.height != 0 {
        return Err(GenesisError::NotHeightZero { got: block.height });
    }
    if block.previous_block_hash != [0u8; 32] {
        return Err(GenesisError::NonZeroPreviousHash);
    }
    let [mint] = block.transactions.as_slice() else {
        return Err(GenesisError::BadTransactionSet);
    };
    if mint.tx_type != TxType::CoinGeneration {
        return Err(GenesisError::BadTransactionSet);
    }
    if mint.amount != TOTAL_SUPPLY {
        return Err(GenesisError::WrongSupply { got: mint.amount });
    }
    Ok(BalanceSnapshot {
        blockchain_version: block.version,
        block_height: 0,
        rollover_fees: 0,
        previous_signers: Vec::new(),
        items: vec![BalanceItem {
            identifier: mint.receiver,
            balance: TOTAL_SUPPLY,
            blocks_until_fee: ACCOUNT_FEE_PERIOD,
        }],
        ..BalanceSnapshot::default()
    })
}
