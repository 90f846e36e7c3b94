#![allow(dead_code)]

use std::collections::HashMap;

use solidus_crypto::SignerIdentity;
use solidus_ledger::{
    build_genesis, BalanceSnapshot, Block, GenesisConfig, Identifier, Transaction,
    BLOCK_DURATION_MS,
};

pub const GENESIS_START: i64 = 1_700_000_000_000;

pub fn ident(label: &str) -> SignerIdentity {
    SignerIdentity::from_label(label.as_bytes())
}

pub fn id_of(identity: &SignerIdentity) -> Identifier {
    Identifier(identity.identifier())
}

/// A fresh chain: genesis signer holds the whole supply.
pub fn genesis_fixture(version: u16) -> (SignerIdentity, Block, BalanceSnapshot) {
    let signer = ident("genesis-signer");
    let config = GenesisConfig {
        start_timestamp: GENESIS_START,
        supply_recipient: id_of(&signer),
        blockchain_version: version,
    };
    let (block, snapshot) = build_genesis(&config, &signer);
    (signer, block, snapshot)
}

/// Frozen-hash lookup stub for admission tests.
pub fn chain_map(blocks: &[&Block]) -> HashMap<u64, [u8; 32]> {
    blocks.iter().map(|b| (b.height, b.hash())).collect()
}

/// Timestamp inside the slot for `height`, offset into it by `offset_ms`.
pub fn slot_ts(height: u64, offset_ms: i64) -> i64 {
    GENESIS_START + height as i64 * BLOCK_DURATION_MS + offset_ms
}

/// A standard transfer bound to the genesis block, stamped for `height`.
pub fn transfer_at(
    height: u64,
    offset_ms: i64,
    amount: i64,
    sender: &SignerIdentity,
    receiver: Identifier,
    genesis: &Block,
) -> Transaction {
    Transaction::standard(
        slot_ts(height, offset_ms),
        amount,
        receiver,
        0,
        genesis.hash(),
        sender,
    )
}
