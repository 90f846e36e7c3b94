//! The signed message envelope exchanged with peers.
//!
//! Envelope layout: `length(u32) ‖ timestamp(i64) ‖ type(u16) ‖ content ‖
//! sender(32) ‖ signature(64)`. The length counts the whole envelope
//! including itself; the signature covers everything from the timestamp
//! through the sender identifier. Content is a tagged union so message
//! handling stays exhaustive at the type level.

use solidus_crypto::{verify_signature, SignerIdentity};
use solidus_ledger::wire::{self, DecodeError};
use solidus_ledger::{Block, Identifier, Transaction};
use solidus_ledger::identifier::Signature;

pub const TYPE_TRANSACTION: u16 = 5;
pub const TYPE_NEW_BLOCK: u16 = 9;
pub const TYPE_BLOCK_VOTE: u16 = 19;
pub const TYPE_BLOCK_VOTE_RESPONSE: u16 = 20;
pub const TYPE_NODE_JOIN_V2: u16 = 43;

/// Sanity cap on inbound envelopes.
pub const MAX_MESSAGE_BYTES: usize = 1 << 24;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("declared length {declared} does not match envelope {actual}")]
    BadLength { declared: usize, actual: usize },
    #[error("unknown message type {0}")]
    UnknownType(u16),
    #[error("bad envelope signature")]
    BadSignature,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageContent {
    /// Tag 5: a transaction for the pool.
    Transaction(Transaction),
    /// Tag 9: a freshly signed candidate block.
    NewBlock(Block),
    /// Tag 19: the sender's vote at a height.
    BlockVote { height: u64, hash: [u8; 32] },
    /// Tag 20: acknowledgement, no state change.
    BlockVoteResponse,
    /// Tag 43: peer announcement, handed to the peer directory unparsed.
    NodeJoinV2(Vec<u8>),
}

impl MessageContent {
    pub fn type_tag(&self) -> u16 {
        match self {
            MessageContent::Transaction(_) => TYPE_TRANSACTION,
            MessageContent::NewBlock(_) => TYPE_NEW_BLOCK,
            MessageContent::BlockVote { .. } => TYPE_BLOCK_VOTE,
            MessageContent::BlockVoteResponse => TYPE_BLOCK_VOTE_RESPONSE,
            MessageContent::NodeJoinV2(_) => TYPE_NODE_JOIN_V2,
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            MessageContent::Transaction(tx) => out.extend_from_slice(&tx.to_bytes()),
            MessageContent::NewBlock(b) => out.extend_from_slice(&b.to_bytes()),
            MessageContent::BlockVote { height, hash } => {
                wire::write_u64(out, *height);
                wire::write_32(out, hash);
            }
            MessageContent::BlockVoteResponse => {}
            MessageContent::NodeJoinV2(raw) => out.extend_from_slice(raw),
        }
    }

    fn decode(tag: u16, content: &[u8]) -> Result<MessageContent, MessageError> {
        let mut input = content;
        let parsed = match tag {
            TYPE_TRANSACTION => MessageContent::Transaction(Transaction::decode(&mut input)?),
            TYPE_NEW_BLOCK => MessageContent::NewBlock(Block::decode(&mut input)?),
            TYPE_BLOCK_VOTE => {
                let height = wire::read_u64(&mut input)?;
                let hash = wire::read_32(&mut input)?;
                MessageContent::BlockVote { height, hash }
            }
            TYPE_BLOCK_VOTE_RESPONSE => MessageContent::BlockVoteResponse,
            TYPE_NODE_JOIN_V2 => {
                let raw = input.to_vec();
                input = &[];
                MessageContent::NodeJoinV2(raw)
            }
            other => return Err(MessageError::UnknownType(other)),
        };
        wire::expect_consumed(input)?;
        Ok(parsed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub timestamp: i64,
    pub content: MessageContent,
    pub sender: Identifier,
    pub signature: Signature,
}

impl Message {
    pub fn new_signed(content: MessageContent, timestamp: i64, identity: &SignerIdentity) -> Message {
        let sender = Identifier(identity.identifier());
        let body = signed_portion(timestamp, &content, &sender);
        let signature = Signature(identity.sign(&body));
        Message {
            timestamp,
            content,
            sender,
            signature,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::new();
        wire::write_i64(&mut body, self.timestamp);
        wire::write_u16(&mut body, self.content.type_tag());
        self.content.write(&mut body);
        wire::write_32(&mut body, self.sender.as_bytes());
        wire::write_64(&mut body, self.signature.as_bytes());

        let mut out = Vec::with_capacity(4 + body.len());
        wire::write_u32(&mut out, (4 + body.len()) as u32);
        out.extend_from_slice(&body);
        out
    }

    /// Decode and verify an envelope. Anything structurally wrong or with a
    /// bad signature is dropped by callers; peers are not retried.
    pub fn from_bytes(bytes: &[u8]) -> Result<Message, MessageError> {
        let mut input = bytes;
        let declared = wire::read_u32(&mut input)? as usize;
        if declared != bytes.len() || declared > MAX_MESSAGE_BYTES {
            return Err(MessageError::BadLength {
                declared,
                actual: bytes.len(),
            });
        }
        let timestamp = wire::read_i64(&mut input)?;
        let tag = wire::read_u16(&mut input)?;
        // Content runs up to the trailing sender + signature.
        if input.len() < 32 + 64 {
            return Err(MessageError::Decode(DecodeError::UnexpectedEnd));
        }
        let content_len = input.len() - 32 - 64;
        let content_bytes = wire::take(&mut input, content_len)?;
        let sender = wire::read_identifier(&mut input)?;
        let signature = wire::read_signature(&mut input)?;
        wire::expect_consumed(input)?;

        let content = MessageContent::decode(tag, content_bytes)?;
        let message = Message {
            timestamp,
            content,
            sender,
            signature,
        };
        if !message.verify() {
            return Err(MessageError::BadSignature);
        }
        Ok(message)
    }

    pub fn verify(&self) -> bool {
        let body = signed_portion(self.timestamp, &self.content, &self.sender);
        verify_signature(self.signature.as_bytes(), &body, self.sender.as_bytes())
    }
}

fn signed_portion(timestamp: i64, content: &MessageContent, sender: &Identifier) -> Vec<u8> {
    let mut body = Vec::new();
    wire::write_i64(&mut body, timestamp);
    wire::write_u16(&mut body, content.type_tag());
    content.write(&mut body);
    wire::write_32(&mut body, sender.as_bytes());
    body
}
