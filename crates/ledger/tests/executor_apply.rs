mod support;

use solidus_ledger::identifier::Signature;
use solidus_ledger::{
    execute_block, BalanceItem, BalanceSnapshot, Block, ChainParams, ExecutionError, Identifier,
    Transaction, ACCOUNT_FEE_PERIOD, MICROS_PER_UNIT, TOTAL_SUPPLY,
};
use support::{genesis_fixture, id_of, ident, slot_ts, GENESIS_START};

fn params() -> ChainParams {
    ChainParams::default()
}

/// A structurally valid block standing in for a parent whose content the
/// executor never inspects beyond height and version.
fn fake_parent(height: u64, version: u16) -> Block {
    Block::new_signed(
        version,
        height,
        [0u8; 32],
        GENESIS_START,
        slot_ts(height, 1),
        Vec::new(),
        [0u8; 32],
        &ident("fake-parent-signer"),
    )
}

#[test]
fn standard_transfer_moves_amount_minus_fee() {
    let (signer_a, genesis_block, genesis_snapshot) = genesis_fixture(0);
    let a = id_of(&signer_a);
    let b = Identifier([2u8; 32]);

    let tx = Transaction::standard(
        slot_ts(1, 100),
        10 * MICROS_PER_UNIT,
        b,
        0,
        genesis_block.hash(),
        &signer_a,
    );
    assert_eq!(tx.fee(), 25_000);

    let next = execute_block(
        &genesis_snapshot,
        &genesis_block,
        &[tx],
        a,
        0,
        0,
        &params(),
    )
    .unwrap();

    assert_eq!(next.block_height, 1);
    assert_eq!(next.check_invariants(), Ok(()));
    // The signer earns the whole fee pot back: it is the only recent signer.
    assert_eq!(
        next.balance_of(&a),
        TOTAL_SUPPLY - 10 * MICROS_PER_UNIT + 25_000
    );
    assert_eq!(next.balance_of(&b), 9_975_000);
    assert_eq!(next.previous_signers, vec![a]);
    assert_eq!(next.rollover_fees, 0);
}

#[test]
fn fee_pot_splits_with_small_remainder_carried() {
    let (signer_a, genesis_block, mut parent) = genesis_fixture(0);
    let a = id_of(&signer_a);
    // Two prior signers, so three fee recipients with the block signer.
    let s1 = Identifier([0x51u8; 32]);
    let s2 = Identifier([0x52u8; 32]);
    parent.previous_signers = vec![s1, s2];

    let tx = Transaction::standard(
        slot_ts(1, 0),
        10 * MICROS_PER_UNIT,
        Identifier([2u8; 32]),
        0,
        genesis_block.hash(),
        &signer_a,
    );
    let next = execute_block(&parent, &genesis_block, &[tx], a, 0, 0, &params()).unwrap();

    // 25_000 / 3 = 8_333 with remainder 1, which fits the rollover byte.
    assert_eq!(next.balance_of(&s1), 8_333);
    assert_eq!(next.balance_of(&s2), 8_333);
    assert_eq!(next.rollover_fees, 1);
    assert_eq!(next.previous_signers, vec![a, s1, s2]);
    assert_eq!(next.check_invariants(), Ok(()));
}

#[test]
fn wide_remainder_is_spread_over_leading_signers() {
    let (signer_a, genesis_block, mut parent) = genesis_fixture(0);
    let a = id_of(&signer_a);
    let prior: Vec<Identifier> = (1..=8).map(|i| Identifier([0x60 + i; 32])).collect();
    parent.previous_signers = prior.clone();

    let tx = Transaction::standard(
        slot_ts(1, 0),
        10 * MICROS_PER_UNIT,
        Identifier([2u8; 32]),
        0,
        genesis_block.hash(),
        &signer_a,
    );
    let next = execute_block(&parent, &genesis_block, &[tx], a, 0, 0, &params()).unwrap();

    // 25_000 over 9 recipients: share 2_777, remainder 7. A remainder that
    // wide is handed out one micro-unit each instead of rolling over.
    assert_eq!(next.rollover_fees, 0);
    let credited: Vec<i64> = prior.iter().map(|s| next.balance_of(s)).collect();
    assert_eq!(credited[..6], [2_778, 2_778, 2_778, 2_778, 2_778, 2_778]);
    assert_eq!(credited[6..], [2_777, 2_777]);
    assert_eq!(next.check_invariants(), Ok(()));
}

#[test]
fn maintenance_fee_charges_small_accounts_on_schedule() {
    let poor = Identifier([0x70u8; 32]);
    let rich = Identifier([0x71u8; 32]);
    let parent = BalanceSnapshot {
        blockchain_version: 1,
        block_height: 9,
        rollover_fees: 0,
        previous_signers: Vec::new(),
        items: vec![
            BalanceItem {
                identifier: poor,
                balance: 5 * MICROS_PER_UNIT,
                blocks_until_fee: 1,
            },
            BalanceItem {
                identifier: rich,
                balance: TOTAL_SUPPLY - 5 * MICROS_PER_UNIT,
                blocks_until_fee: 1,
            },
        ],
        unlock_threshold: 0,
        unlock_transfer_sum: 0,
        ..BalanceSnapshot::default()
    };
    let signer = Identifier([0x72u8; 32]);
    let next = execute_block(
        &parent,
        &fake_parent(9, 1),
        &[],
        signer,
        1,
        0,
        &params(),
    )
    .unwrap();

    // Only the account under the threshold pays; both countdowns reset.
    assert_eq!(next.balance_of(&poor), 5 * MICROS_PER_UNIT - 1);
    assert_eq!(next.balance_of(&rich), TOTAL_SUPPLY - 5 * MICROS_PER_UNIT);
    for item in &next.items {
        if item.identifier == poor || item.identifier == rich {
            assert_eq!(item.blocks_until_fee, ACCOUNT_FEE_PERIOD);
        }
    }
    // The single micro-unit lands with the block signer.
    assert_eq!(next.balance_of(&signer), 1);
    assert_eq!(next.check_invariants(), Ok(()));
}

#[test]
fn cycle_transaction_waits_for_votes_then_pays_out() {
    let initiator = ident("cycle-initiator");
    let holder = Identifier([0x42u8; 32]);
    let receiver = Identifier([0x43u8; 32]);
    let cycle_funds = 50 * MICROS_PER_UNIT;
    let parent = BalanceSnapshot {
        blockchain_version: 2,
        block_height: 4,
        rollover_fees: 0,
        previous_signers: Vec::new(),
        items: vec![
            BalanceItem {
                identifier: Identifier::CYCLE_ACCOUNT,
                balance: cycle_funds,
                blocks_until_fee: ACCOUNT_FEE_PERIOD,
            },
            BalanceItem {
                identifier: holder,
                balance: TOTAL_SUPPLY - cycle_funds,
                blocks_until_fee: ACCOUNT_FEE_PERIOD,
            },
        ],
        ..BalanceSnapshot::default()
    };

    let cycle_tx = Transaction::cycle(
        slot_ts(5, 0),
        10 * MICROS_PER_UNIT,
        receiver,
        0,
        [0u8; 32],
        &initiator,
    );
    let target = cycle_tx.signature;
    let signer = Identifier([0x44u8; 32]);

    // Block one: the transfer parks as pending, no funds move.
    let mid = execute_block(
        &parent,
        &fake_parent(4, 2),
        &[cycle_tx],
        signer,
        2,
        3,
        &params(),
    )
    .unwrap();
    assert_eq!(mid.pending_cycle_txs.len(), 1);
    assert_eq!(mid.balance_of(&receiver), 0);
    assert_eq!(mid.cycle_account_balance(), cycle_funds);
    assert_eq!(mid.check_invariants(), Ok(()));

    // Block two: three standalone votes push it over the threshold.
    let votes: Vec<Transaction> = ["voter-a", "voter-b", "voter-c"]
        .iter()
        .map(|name| {
            Transaction::cycle_signature(slot_ts(6, 0), target, 0, [0u8; 32], &ident(name))
        })
        .collect();
    let after = execute_block(
        &mid,
        &fake_parent(5, 2),
        &votes,
        signer,
        2,
        3,
        &params(),
    )
    .unwrap();

    assert!(after.pending_cycle_txs.is_empty());
    assert_eq!(after.balance_of(&receiver), 10 * MICROS_PER_UNIT);
    assert_eq!(after.cycle_account_balance(), cycle_funds - 10 * MICROS_PER_UNIT);
    assert_eq!(after.recently_approved_cycle_txs.len(), 1);
    assert_eq!(after.recently_approved_cycle_txs[0].initiator, id_of(&initiator));
    assert_eq!(after.check_invariants(), Ok(()));
}

#[test]
fn cycle_transaction_with_enough_embedded_votes_executes_at_once() {
    let initiator = ident("cycle-initiator");
    let holder = Identifier([0x42u8; 32]);
    let receiver = Identifier([0x45u8; 32]);
    let parent = BalanceSnapshot {
        blockchain_version: 2,
        block_height: 4,
        rollover_fees: 0,
        previous_signers: Vec::new(),
        items: vec![
            BalanceItem {
                identifier: Identifier::CYCLE_ACCOUNT,
                balance: 20 * MICROS_PER_UNIT,
                blocks_until_fee: ACCOUNT_FEE_PERIOD,
            },
            BalanceItem {
                identifier: holder,
                balance: TOTAL_SUPPLY - 20 * MICROS_PER_UNIT,
                blocks_until_fee: ACCOUNT_FEE_PERIOD,
            },
        ],
        ..BalanceSnapshot::default()
    };

    let mut cycle_tx = Transaction::cycle(
        slot_ts(5, 0),
        5 * MICROS_PER_UNIT,
        receiver,
        0,
        [0u8; 32],
        &initiator,
    );
    cycle_tx.add_cycle_signature(&ident("voter-a"));
    cycle_tx.add_cycle_signature(&ident("voter-b"));

    let next = execute_block(
        &parent,
        &fake_parent(4, 2),
        &[cycle_tx],
        Identifier([0x44u8; 32]),
        2,
        2,
        &params(),
    )
    .unwrap();
    assert!(next.pending_cycle_txs.is_empty());
    assert_eq!(next.balance_of(&receiver), 5 * MICROS_PER_UNIT);
    assert_eq!(next.recently_approved_cycle_txs.len(), 1);
}

#[test]
fn invalid_embedded_votes_do_not_count() {
    let initiator = ident("cycle-initiator");
    let mut cycle_tx = Transaction::cycle(
        slot_ts(5, 0),
        MICROS_PER_UNIT,
        Identifier([9u8; 32]),
        0,
        [0u8; 32],
        &initiator,
    );
    cycle_tx.add_cycle_signature(&ident("honest-voter"));
    // A forged approval from an identity that never signed it.
    cycle_tx
        .cycle_signatures
        .insert(Identifier([0x66u8; 32]), Signature([0x66u8; 64]));
    assert_eq!(cycle_tx.valid_cycle_signature_count(), 1);
}

#[test]
fn unfunded_sender_is_fatal() {
    let (_, genesis_block, genesis_snapshot) = genesis_fixture(0);
    let ghost = ident("ghost");
    let tx = Transaction::standard(
        slot_ts(1, 0),
        5 * MICROS_PER_UNIT,
        Identifier([2u8; 32]),
        0,
        genesis_block.hash(),
        &ghost,
    );
    let err = execute_block(
        &genesis_snapshot,
        &genesis_block,
        &[tx],
        Identifier([3u8; 32]),
        0,
        0,
        &params(),
    )
    .unwrap_err();
    assert!(matches!(err, ExecutionError::NegativeBalance { .. }));
}

#[test]
fn version_cannot_regress() {
    let (signer_a, genesis_block, mut parent) = genesis_fixture(1);
    parent.blockchain_version = 1;
    let err = execute_block(
        &parent,
        &genesis_block,
        &[],
        id_of(&signer_a),
        0,
        0,
        &params(),
    )
    .unwrap_err();
    assert!(matches!(err, ExecutionError::VersionRegression { .. }));
}

#[test]
fn corrupt_parent_supply_is_fatal() {
    let (signer_a, genesis_block, mut parent) = genesis_fixture(0);
    parent.items[0].balance -= 5;
    let err = execute_block(
        &parent,
        &genesis_block,
        &[],
        id_of(&signer_a),
        0,
        0,
        &params(),
    )
    .unwrap_err();
    assert!(matches!(err, ExecutionError::SupplyMismatch { .. }));
}

#[test]
fn execution_is_deterministic() {
    let (signer_a, genesis_block, genesis_snapshot) = genesis_fixture(0);
    let txs: Vec<Transaction> = (0u8..5)
        .map(|i| {
            Transaction::standard(
                slot_ts(1, i as i64),
                (i as i64 + 1) * 20 * MICROS_PER_UNIT,
                Identifier([i + 10; 32]),
                0,
                genesis_block.hash(),
                &signer_a,
            )
        })
        .collect();
    let one = execute_block(
        &genesis_snapshot,
        &genesis_block,
        &txs,
        id_of(&signer_a),
        0,
        0,
        &params(),
    )
    .unwrap();
    let two = execute_block(
        &genesis_snapshot,
        &genesis_block,
        &txs,
        id_of(&signer_a),
        0,
        0,
        &params(),
    )
    .unwrap();
    assert_eq!(one, two);
    assert_eq!(one.hash(), two.hash());
}
