mod support;

use solidus_ledger::{Identifier, Transaction, MICROS_PER_UNIT};
use solidus_node::message::{
    Message, MessageContent, MessageError, TYPE_BLOCK_VOTE, TYPE_NEW_BLOCK, TYPE_TRANSACTION,
};
use support::{genesis_pair, ident, slot_ts};

#[test]
fn vote_round_trip() {
    let sender = ident("peer");
    let msg = Message::new_signed(
        MessageContent::BlockVote {
            height: 42,
            hash: [7u8; 32],
        },
        slot_ts(42, 0),
        &sender,
    );
    let bytes = msg.to_bytes();
    let decoded = Message::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, msg);
    assert_eq!(decoded.content.type_tag(), TYPE_BLOCK_VOTE);
}

#[test]
fn transaction_round_trip() {
    let peer = ident("peer");
    let payer = ident("payer");
    let tx = Transaction::standard(
        slot_ts(1, 0),
        MICROS_PER_UNIT,
        Identifier([2u8; 32]),
        0,
        [0u8; 32],
        &payer,
    );
    let msg = Message::new_signed(MessageContent::Transaction(tx), slot_ts(1, 1), &peer);
    let decoded = Message::from_bytes(&msg.to_bytes()).unwrap();
    assert_eq!(decoded, msg);
    assert_eq!(decoded.content.type_tag(), TYPE_TRANSACTION);
}

#[test]
fn block_round_trip() {
    let peer = ident("peer");
    let (genesis, _) = genesis_pair(&peer);
    let msg = Message::new_signed(MessageContent::NewBlock(genesis), slot_ts(0, 1), &peer);
    let decoded = Message::from_bytes(&msg.to_bytes()).unwrap();
    assert_eq!(decoded, msg);
    assert_eq!(decoded.content.type_tag(), TYPE_NEW_BLOCK);
}

#[test]
fn empty_and_opaque_contents_round_trip() {
    let peer = ident("peer");
    let ack = Message::new_signed(MessageContent::BlockVoteResponse, 5, &peer);
    assert_eq!(Message::from_bytes(&ack.to_bytes()).unwrap(), ack);

    let join = Message::new_signed(MessageContent::NodeJoinV2(vec![1, 2, 3]), 6, &peer);
    assert_eq!(Message::from_bytes(&join.to_bytes()).unwrap(), join);
}

#[test]
fn envelope_length_is_self_inclusive_and_checked() {
    let sender = ident("peer");
    let msg = Message::new_signed(
        MessageContent::BlockVote {
            height: 1,
            hash: [1u8; 32],
        },
        1_000,
        &sender,
    );
    let bytes = msg.to_bytes();
    let declared = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    assert_eq!(declared, bytes.len());

    let mut truncated = bytes.clone();
    truncated.pop();
    assert!(matches!(
        Message::from_bytes(&truncated),
        Err(MessageError::BadLength { .. })
    ));
}

#[test]
fn tampered_envelope_fails_signature() {
    let sender = ident("peer");
    let msg = Message::new_signed(
        MessageContent::BlockVote {
            height: 9,
            hash: [9u8; 32],
        },
        2_000,
        &sender,
    );
    let mut bytes = msg.to_bytes();
    // Flip a bit inside the vote hash.
    let idx = 4 + 8 + 2 + 8 + 3;
    bytes[idx] ^= 1;
    assert!(matches!(
        Message::from_bytes(&bytes),
        Err(MessageError::BadSignature)
    ));
}

#[test]
fn unknown_type_is_rejected() {
    let sender = ident("peer");
    let msg = Message::new_signed(
        MessageContent::BlockVote {
            height: 9,
            hash: [9u8; 32],
        },
        2_000,
        &sender,
    );
    let mut bytes = msg.to_bytes();
    // Overwrite the type tag with an unassigned value.
    bytes[12] = 0x7f;
    bytes[13] = 0x7f;
    let err = Message::from_bytes(&bytes).unwrap_err();
    assert!(matches!(
        err,
        MessageError::UnknownType(_) | MessageError::BadSignature
    ));
}
