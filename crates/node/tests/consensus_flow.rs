mod support;

use solidus_ledger::{ChainParams, Transaction, MICROS_PER_UNIT, TOTAL_SUPPLY};
use solidus_node::consensus::ConsensusLoop;
use solidus_node::frozen_chain::FreezeError;
use solidus_node::message::{Message, MessageContent};
use solidus_node::store::MemoryStore;
use solidus_node::{FrozenChain, NodeCfg};
use support::{
    child_of_edge, freeze_child, genesis_pair, id_of, ident, rotate, slot_ts, started_chain,
    RecordingOutbound,
};

fn empty_chain() -> FrozenChain {
    FrozenChain::open(Box::new(MemoryStore::new()), ChainParams::default()).unwrap()
}

fn new_loop(chain: FrozenChain, identity: &solidus_crypto::SignerIdentity) -> (ConsensusLoop, RecordingOutbound) {
    let outbound = RecordingOutbound::default();
    let consensus = ConsensusLoop::new(
        chain,
        identity.clone(),
        Box::new(outbound.clone()),
        NodeCfg::default(),
    );
    (consensus, outbound)
}

#[test]
fn genesis_block_freezes_on_a_single_vote() {
    let a = ident("verifier-a");
    let (genesis_block, genesis_snapshot) = genesis_pair(&a);
    let genesis_hash = genesis_block.hash();
    let (mut consensus, _outbound) = new_loop(empty_chain(), &a);

    let now = slot_ts(0, 500);
    consensus.handle_message(
        Message::new_signed(MessageContent::NewBlock(genesis_block), now, &a),
        now,
    );
    consensus.handle_message(
        Message::new_signed(
            MessageContent::BlockVote {
                height: 0,
                hash: genesis_hash,
            },
            now,
            &a,
        ),
        now,
    );
    consensus.step(now);

    let chain = consensus.chain();
    assert_eq!(chain.frozen_height(), Some(0));
    assert_eq!(chain.frozen_hash(), Some(genesis_hash));
    let snapshot = chain.frozen_snapshot().unwrap();
    assert_eq!(snapshot.items.len(), 1);
    assert_eq!(snapshot.items[0].identifier, id_of(&a));
    assert_eq!(snapshot.items[0].balance, TOTAL_SUPPLY);
    assert_eq!(snapshot, &genesis_snapshot);
}

#[test]
fn scheduled_signer_produces_votes_and_freezes_a_transfer() {
    let a = ident("verifier-a");
    let b = ident("account-b");
    let chain = started_chain(&a);
    let genesis_hash = chain.frozen_hash().unwrap();
    let (mut consensus, outbound) = new_loop(chain, &a);

    let tx = Transaction::standard(
        slot_ts(1, 100),
        10 * MICROS_PER_UNIT,
        id_of(&b),
        0,
        genesis_hash,
        &a,
    );
    let now = slot_ts(1, 200);
    consensus.handle_message(
        Message::new_signed(MessageContent::Transaction(tx), now, &a),
        now,
    );
    assert_eq!(consensus.pool_len(), 1);

    // One step: produce, self-vote, freeze (single-signer Genesis cycle).
    consensus.step(now);

    let chain = consensus.chain();
    assert_eq!(chain.frozen_height(), Some(1));
    let snapshot = chain.frozen_snapshot().unwrap();
    assert_eq!(snapshot.balance_of(&id_of(&b)), 9_975_000);
    assert_eq!(
        snapshot.balance_of(&id_of(&a)),
        TOTAL_SUPPLY - 10 * MICROS_PER_UNIT + 25_000
    );
    assert_eq!(snapshot.check_invariants(), Ok(()));

    let log = outbound.log.lock();
    assert_eq!(log.blocks.len(), 1);
    assert_eq!(log.blocks[0].height, 1);
    assert!(log.votes.iter().any(|(h, _)| *h == 1));
}

#[test]
fn supermajority_is_strictly_more_than_three_quarters() {
    // A seven-signer cycle: six votes are not enough, the seventh freezes.
    let signers: Vec<_> = (1..=7).map(|i| ident(&format!("v{i}"))).collect();
    let mut chain = started_chain(&signers[0]);
    rotate(&mut chain, &signers[1..], 6);
    rotate(&mut chain, &signers, 28);
    assert_eq!(chain.cycle_length(), 7);
    assert!(!chain.in_genesis_cycle());
    assert_eq!(chain.cycle_threshold(), 7);

    let height = chain.frozen_height().unwrap() + 1;
    let producer_id = chain.next_scheduled_signer().unwrap();
    let producer = signers
        .iter()
        .find(|s| id_of(s) == producer_id)
        .unwrap()
        .clone();
    let (block, _) = child_of_edge(&chain, &producer, Vec::new(), 100);
    let hash = block.hash();

    // Observe from a node outside the cycle, so its own vote cannot tip it.
    let observer = ident("observer");
    let (mut consensus, _outbound) = new_loop(chain, &observer);

    let now = slot_ts(height, 300);
    consensus.handle_message(
        Message::new_signed(MessageContent::NewBlock(block), now, &producer),
        now,
    );

    for signer in signers.iter().take(6) {
        consensus.handle_message(
            Message::new_signed(
                MessageContent::BlockVote { height, hash },
                now,
                signer,
            ),
            now,
        );
    }
    consensus.step(now);
    assert_eq!(consensus.chain().frozen_height(), Some(height - 1));

    consensus.handle_message(
        Message::new_signed(
            MessageContent::BlockVote { height, hash },
            now,
            &signers[6],
        ),
        now,
    );
    consensus.step(now);
    assert_eq!(consensus.chain().frozen_height(), Some(height));
    assert_eq!(consensus.chain().frozen_hash(), Some(hash));
    assert_eq!(consensus.unfrozen().len_at(height), 0);
}

#[test]
fn votes_from_outside_the_cycle_do_not_count() {
    let signers: Vec<_> = (1..=3).map(|i| ident(&format!("v{i}"))).collect();
    let mut chain = started_chain(&signers[0]);
    rotate(&mut chain, &signers[1..], 2);
    rotate(&mut chain, &signers, 12);
    assert_eq!(chain.cycle_threshold(), 3);

    let height = chain.frozen_height().unwrap() + 1;
    let producer_id = chain.next_scheduled_signer().unwrap();
    let producer = signers
        .iter()
        .find(|s| id_of(s) == producer_id)
        .unwrap()
        .clone();
    let (block, _) = child_of_edge(&chain, &producer, Vec::new(), 100);
    let hash = block.hash();

    let observer = ident("observer");
    let (mut consensus, _outbound) = new_loop(chain, &observer);
    let now = slot_ts(height, 300);
    consensus.handle_message(
        Message::new_signed(MessageContent::NewBlock(block), now, &producer),
        now,
    );

    // A flood of outsider votes moves nothing.
    for i in 0..10u8 {
        let outsider = ident(&format!("outsider-{i}"));
        consensus.handle_message(
            Message::new_signed(MessageContent::BlockVote { height, hash }, now, &outsider),
            now,
        );
    }
    consensus.step(now);
    assert_eq!(consensus.chain().frozen_height(), Some(height - 1));
}

#[test]
fn discontinuous_candidate_is_never_frozen() {
    // Five rotating signers, then a fresh joiner, then a second fresh joiner
    // inside the same cycle span: diversity rules reject the second.
    let signers: Vec<_> = (1..=5).map(|i| ident(&format!("v{i}"))).collect();
    let mut chain = started_chain(&signers[0]);
    rotate(&mut chain, &signers[1..], 4);
    rotate(&mut chain, &signers, 20);
    assert_eq!(chain.cycle_length(), 5);

    let joiner_a = ident("joiner-a");
    freeze_child(&mut chain, &joiner_a);
    freeze_child(&mut chain, &signers[0]);
    freeze_child(&mut chain, &signers[1]);

    let joiner_b = ident("joiner-b");
    let (block, snapshot) = child_of_edge(&chain, &joiner_b, Vec::new(), 100);
    let err = chain.freeze_block(block, snapshot).unwrap_err();
    assert!(matches!(err, FreezeError::Discontinuous));
}

#[test]
fn missing_leader_block_is_fetched_once() {
    let signers: Vec<_> = (1..=3).map(|i| ident(&format!("v{i}"))).collect();
    let mut chain = started_chain(&signers[0]);
    rotate(&mut chain, &signers[1..], 2);
    rotate(&mut chain, &signers, 12);
    let height = chain.frozen_height().unwrap() + 1;

    let observer = ident("observer");
    let (mut consensus, outbound) = new_loop(chain, &observer);
    let phantom = [0x99u8; 32];
    let now = slot_ts(height, 300);
    for signer in &signers {
        consensus.handle_message(
            Message::new_signed(
                MessageContent::BlockVote {
                    height,
                    hash: phantom,
                },
                now,
                signer,
            ),
            now,
        );
    }
    consensus.step(now);
    consensus.step(now + 300);

    // The leading block is absent: requested exactly once, never frozen.
    let log = outbound.log.lock();
    assert_eq!(log.requests, vec![(height, phantom)]);
    assert_eq!(consensus.chain().frozen_height(), Some(height - 1));
}

#[test]
fn chain_restarts_from_the_store() {
    let a = ident("verifier-a");
    let mut chain = started_chain(&a);
    freeze_child(&mut chain, &a);
    freeze_child(&mut chain, &a);
    let frozen_hash = chain.frozen_hash().unwrap();

    // Hand the same backing store to a fresh chain, as a restart would.
    let store = chain.into_store();
    let restored = FrozenChain::open(store, ChainParams::default()).unwrap();
    assert_eq!(restored.frozen_height(), Some(2));
    assert_eq!(restored.frozen_hash(), Some(frozen_hash));
    assert_eq!(restored.genesis_start(), support::GENESIS_START);
    assert_eq!(restored.cycle_length(), 1);
}
