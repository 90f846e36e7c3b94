//! Blocks: the unit of consensus.
//!
//! A block's identity is its signer signature; the canonical hash is the
//! double SHA-256 of the 64 signature bytes, so two blocks are the same block
//! exactly when their signatures match.

use solidus_crypto::{sha256d, verify_signature, SignerIdentity};

use crate::identifier::{Identifier, Signature};
use crate::tx::Transaction;
use crate::wire::{self, DecodeError};

const MAX_BLOCK_TXS: usize = 1 << 20;

/// Nominal opening time of a height slot.
#[inline]
pub fn start_timestamp_for_height(genesis_start: i64, height: u64) -> i64 {
    genesis_start + height as i64 * crate::params::BLOCK_DURATION_MS
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("start timestamp {got} does not match slot {expected}")]
    BadStartTimestamp { expected: i64, got: i64 },
    #[error("verification timestamp {got} outside [{min}, {max}]")]
    VerificationTimestampOutOfRange { got: i64, min: i64, max: i64 },
    #[error("bad signer signature")]
    BadSignature,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub version: u16,
    pub height: u64,
    pub previous_block_hash: [u8; 32],
    pub start_timestamp: i64,
    pub verification_timestamp: i64,
    pub transactions: Vec<Transaction>,
    pub balance_list_hash: [u8; 32],
    pub signer: Identifier,
    pub signature: Signature,
}

impl Block {
    /// Canonical bytes without the trailing signature; this is what the
    /// signer signs.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        wire::write_u16(&mut out, self.version);
        wire::write_u64(&mut out, self.height);
        wire::write_32(&mut out, &self.previous_block_hash);
        wire::write_i64(&mut out, self.start_timestamp);
        wire::write_i64(&mut out, self.verification_timestamp);
        wire::write_count(&mut out, self.transactions.len());
        for tx in &self.transactions {
            out.extend_from_slice(&tx.to_bytes());
        }
        wire::write_32(&mut out, &self.balance_list_hash);
        wire::write_32(&mut out, self.signer.as_bytes());
        out
    }

    /// Transmission bytes: signing bytes plus the signature.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.signing_bytes();
        wire::write_64(&mut out, self.signature.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Block, DecodeError> {
        let mut input = bytes;
        let block = Self::decode(&mut input)?;
        wire::expect_consumed(input)?;
        Ok(block)
    }

    pub fn decode(input: &mut &[u8]) -> Result<Block, DecodeError> {
        let version = wire::read_u16(input)?;
        let height = wire::read_u64(input)?;
        let previous_block_hash = wire::read_32(input)?;
        let start_timestamp = wire::read_i64(input)?;
        let verification_timestamp = wire::read_i64(input)?;
        let tx_count = wire::read_count(input, "block transactions", MAX_BLOCK_TXS)?;
        let mut transactions = Vec::with_capacity(tx_count.min(1 << 12));
        for _ in 0..tx_count {
            transactions.push(Transaction::decode(input)?);
        }
        let balance_list_hash = wire::read_32(input)?;
        let signer = wire::read_identifier(input)?;
        let signature = wire::read_signature(input)?;
        Ok(Block {
            version,
            height,
            previous_block_hash,
            start_timestamp,
            verification_timestamp,
            transactions,
            balance_list_hash,
            signer,
            signature,
        })
    }

    /// Canonical block hash: double SHA-256 of the signature bytes.
    #[inline]
    pub fn hash(&self) -> [u8; 32] {
        sha256d(self.signature.as_bytes())
    }

    /// Slot and signature checks. Parent linkage and balance-hash agreement
    /// are checked where the parent state is at hand.
    pub fn validate_header(&self, genesis_start: i64, open_edge_slack: i64) -> Result<(), BlockError> {
        let expected_start = start_timestamp_for_height(genesis_start, self.height);
        if self.start_timestamp != expected_start {
            return Err(BlockError::BadStartTimestamp {
                expected: expected_start,
                got: self.start_timestamp,
            });
        }
        let max = expected_start + open_edge_slack;
        if self.verification_timestamp < expected_start || self.verification_timestamp > max {
            return Err(BlockError::VerificationTimestampOutOfRange {
                got: self.verification_timestamp,
                min: expected_start,
                max,
            });
        }
        if !verify_signature(
            self.signature.as_bytes(),
            &self.signing_bytes(),
            self.signer.as_bytes(),
        ) {
            return Err(BlockError::BadSignature);
        }
        Ok(())
    }

    /// Assemble and sign a block for `height` on top of `previous_hash`.
    #[allow(clippy::too_many_arguments)]
    pub fn new_signed(
        version: u16,
        height: u64,
        previous_block_hash: [u8; 32],
        genesis_start: i64,
        verification_timestamp: i64,
        transactions: Vec<Transaction>,
        balance_list_hash: [u8; 32],
        identity: &SignerIdentity,
    ) -> Block {
        let mut block = Block {
            version,
            height,
            previous_block_hash,
            start_timestamp: start_timestamp_for_height(genesis_start, height),
            verification_timestamp,
            transactions,
            balance_list_hash,
            signer: Identifier(identity.identifier()),
            signature: Signature::EMPTY,
        };
        block.signature = Signature(identity.sign(&block.signing_bytes()));
        block
    }
}
