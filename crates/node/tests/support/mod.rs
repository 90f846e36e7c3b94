#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use solidus_crypto::SignerIdentity;
use solidus_ledger::{
    build_genesis, execute_block, BalanceSnapshot, Block, ChainParams, GenesisConfig, Identifier,
    Transaction, BLOCK_DURATION_MS,
};
use solidus_node::consensus::Outbound;
use solidus_node::store::MemoryStore;
use solidus_node::FrozenChain;

pub const GENESIS_START: i64 = 1_700_000_000_000;

pub fn ident(label: &str) -> SignerIdentity {
    SignerIdentity::from_label(label.as_bytes())
}

pub fn id_of(identity: &SignerIdentity) -> Identifier {
    Identifier(identity.identifier())
}

pub fn slot_ts(height: u64, offset_ms: i64) -> i64 {
    GENESIS_START + height as i64 * BLOCK_DURATION_MS + offset_ms
}

/// A chain with genesis frozen, minted to and signed by `signer`.
pub fn started_chain(signer: &SignerIdentity) -> FrozenChain {
    let mut chain = FrozenChain::open(Box::new(MemoryStore::new()), ChainParams::default())
        .expect("open empty store");
    let config = GenesisConfig {
        start_timestamp: GENESIS_START,
        supply_recipient: id_of(signer),
        blockchain_version: 0,
    };
    let (block, snapshot) = build_genesis(&config, signer);
    chain.freeze_genesis(block, snapshot).expect("freeze genesis");
    chain
}

/// The genesis block and snapshot for `signer`, without a chain.
pub fn genesis_pair(signer: &SignerIdentity) -> (Block, BalanceSnapshot) {
    let config = GenesisConfig {
        start_timestamp: GENESIS_START,
        supply_recipient: id_of(signer),
        blockchain_version: 0,
    };
    build_genesis(&config, signer)
}

/// Build a valid child of the frozen edge, signed by `signer`.
pub fn child_of_edge(
    chain: &FrozenChain,
    signer: &SignerIdentity,
    txs: Vec<Transaction>,
    verification_offset_ms: i64,
) -> (Block, BalanceSnapshot) {
    let parent_block = chain.frozen_block().expect("frozen edge").clone();
    let parent_snapshot = chain.frozen_snapshot().expect("frozen snapshot").clone();
    let height = parent_block.height + 1;
    let snapshot = execute_block(
        &parent_snapshot,
        &parent_block,
        &txs,
        id_of(signer),
        parent_snapshot.blockchain_version,
        chain.cycle_threshold(),
        chain.params(),
    )
    .expect("child execution");
    let block = Block::new_signed(
        parent_snapshot.blockchain_version,
        height,
        parent_block.hash(),
        chain.genesis_start(),
        slot_ts(height, verification_offset_ms),
        txs,
        snapshot.hash(),
        signer,
    );
    (block, snapshot)
}

/// Extend the frozen edge by one empty block from `signer`.
pub fn freeze_child(chain: &mut FrozenChain, signer: &SignerIdentity) {
    let (block, snapshot) = child_of_edge(chain, signer, Vec::new(), 100);
    chain.freeze_block(block, snapshot).expect("freeze child");
}

/// Rotate `signers` over the chain for `blocks` heights.
pub fn rotate(chain: &mut FrozenChain, signers: &[SignerIdentity], blocks: usize) {
    for i in 0..blocks {
        let signer = &signers[i % signers.len()];
        freeze_child(chain, signer);
    }
}

#[derive(Default)]
pub struct OutboundLog {
    pub blocks: Vec<Block>,
    pub votes: Vec<(u64, [u8; 32])>,
    pub requests: Vec<(u64, [u8; 32])>,
}

/// Outbound sink that records everything for assertions.
#[derive(Clone, Default)]
pub struct RecordingOutbound {
    pub log: Arc<Mutex<OutboundLog>>,
}

impl Outbound for RecordingOutbound {
    fn broadcast_block(&mut self, block: &Block) {
        self.log.lock().blocks.push(block.clone());
    }

    fn broadcast_vote(&mut self, height: u64, hash: [u8; 32]) {
        self.log.lock().votes.push((height, hash));
    }

    fn request_block(&mut self, height: u64, hash: [u8; 32]) {
        self.log.lock().requests.push((height, hash));
    }
}
