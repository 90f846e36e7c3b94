//! Value-transfer transactions.
//!
//! A transaction is self-describing on the wire and signed over a canonical
//! body that excludes the signature itself. The memo (`sender_data`) enters
//! the signing body as its SHA-256, so the body is fixed-width regardless of
//! memo length.

use std::collections::BTreeMap;

use solidus_crypto::{sha256, sha256d, verify_signature, SignerIdentity};

use crate::identifier::{Identifier, Signature};
use crate::params::ChainParams;
use crate::wire::{self, DecodeError};

pub const MAX_SENDER_DATA: usize = 32;

/// Upper bound on voter-signature maps; no real cycle approaches this.
const MAX_CYCLE_SIGNATURES: usize = 4096;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TxType {
    /// Mints the full supply; valid only in the Genesis block.
    CoinGeneration = 0,
    Seed = 1,
    Standard = 2,
    /// Transfer from the cycle account, gated by voter signatures.
    Cycle = 3,
    /// A standalone vote attaching one voter signature to a pending cycle
    /// transaction.
    CycleSignature = 4,
}

impl TxType {
    pub fn from_u8(v: u8) -> Option<TxType> {
        match v {
            0 => Some(TxType::CoinGeneration),
            1 => Some(TxType::Seed),
            2 => Some(TxType::Standard),
            3 => Some(TxType::Cycle),
            4 => Some(TxType::CycleSignature),
            _ => None,
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Cycle transfers accumulate voter signatures; standalone votes carry
    /// their single approval in the same map shape.
    #[inline]
    pub fn carries_vote_map(self) -> bool {
        matches!(self, TxType::Cycle | TxType::CycleSignature)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("type {got} not allowed at height {height}")]
    TypeNotAllowed { got: u8, height: u64 },
    #[error("type {got} requires blockchain version {needs}")]
    TypeNeedsVersion { got: u8, needs: u16 },
    #[error("sender data too long: {len} bytes")]
    SenderDataTooLong { len: usize },
    #[error("negative amount: {amount}")]
    NegativeAmount { amount: i64 },
    #[error("cycle signature vote must carry zero amount, got {amount}")]
    CycleSignatureAmount { amount: i64 },
    #[error("cycle transaction must originate from the cycle account")]
    CycleSenderNotCycleAccount,
    #[error("cycle transaction carries no initiator")]
    CycleInitiatorMissing,
    #[error("cycle signature vote does not bind its target transaction")]
    CycleVoteUnbound,
    #[error("bad signature")]
    BadSignature,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub tx_type: TxType,
    pub timestamp: i64,
    pub amount: i64,
    pub receiver: Identifier,
    /// Zeroed for CoinGeneration, which has no sender on the wire.
    pub sender: Identifier,
    pub sender_data: Vec<u8>,
    pub previous_hash_height: u64,
    pub previous_block_hash: [u8; 32],
    /// Zeroed for CoinGeneration, which is unsigned.
    pub signature: Signature,
    /// CycleSignature only: the 64-byte signature of the cycle transaction
    /// the vote targets. Bound into the signing body via `sender_data`.
    pub cycle_tx_signature: Option<Signature>,
    /// Cycle only: accumulated per-voter signatures over the initiator
    /// transaction's signature bytes. Sorted by voter identifier.
    pub cycle_signatures: BTreeMap<Identifier, Signature>,
}

impl Transaction {
    /// Fee schedule: one 400th of the amount with a 1 micro-unit floor for
    /// value transfers; coin generation and cycle types carry no fee.
    pub fn fee(&self) -> i64 {
        match self.tx_type {
            TxType::Seed | TxType::Standard => (self.amount / 400).max(1),
            TxType::CoinGeneration | TxType::Cycle | TxType::CycleSignature => 0,
        }
    }

    /// Canonical signing body:
    /// `type ‖ timestamp ‖ amount ‖ receiver ‖ previous_block_hash ‖ sender
    /// ‖ sha256(sender_data)`.
    pub fn signing_body(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 8 + 8 + 32 + 32 + 32 + 32);
        wire::write_u8(&mut out, self.tx_type.as_u8());
        wire::write_i64(&mut out, self.timestamp);
        wire::write_i64(&mut out, self.amount);
        wire::write_32(&mut out, self.receiver.as_bytes());
        wire::write_32(&mut out, &self.previous_block_hash);
        wire::write_32(&mut out, self.sender.as_bytes());
        wire::write_32(&mut out, &sha256(&self.sender_data));
        out
    }

    /// Wire bytes. CoinGeneration omits sender and signature; cycle types
    /// append their extra fields between `previous_block_hash` and the
    /// signature.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        wire::write_u8(&mut out, self.tx_type.as_u8());
        wire::write_i64(&mut out, self.timestamp);
        wire::write_i64(&mut out, self.amount);
        wire::write_32(&mut out, self.receiver.as_bytes());
        if self.tx_type != TxType::CoinGeneration {
            wire::write_32(&mut out, self.sender.as_bytes());
        }
        wire::write_u8(&mut out, self.sender_data.len() as u8);
        out.extend_from_slice(&self.sender_data);
        wire::write_u64(&mut out, self.previous_hash_height);
        wire::write_32(&mut out, &self.previous_block_hash);
        if self.tx_type == TxType::CycleSignature {
            let target = self.cycle_tx_signature.unwrap_or(Signature::EMPTY);
            wire::write_64(&mut out, target.as_bytes());
        }
        if self.tx_type.carries_vote_map() {
            wire::write_count(&mut out, self.cycle_signatures.len());
            for (voter, sig) in &self.cycle_signatures {
                wire::write_32(&mut out, voter.as_bytes());
                wire::write_64(&mut out, sig.as_bytes());
            }
        }
        if self.tx_type != TxType::CoinGeneration {
            wire::write_64(&mut out, self.signature.as_bytes());
        }
        out
    }

    pub fn encoded_len(&self) -> usize {
        let mut n = 1 + 8 + 8 + 32 + 1 + self.sender_data.len() + 8 + 32;
        if self.tx_type != TxType::CoinGeneration {
            n += 32 + 64;
        }
        if self.tx_type == TxType::CycleSignature {
            n += 64;
        }
        if self.tx_type.carries_vote_map() {
            n += 4 + self.cycle_signatures.len() * (32 + 64);
        }
        n
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Transaction, DecodeError> {
        let mut input = bytes;
        let tx = Self::decode(&mut input)?;
        wire::expect_consumed(input)?;
        Ok(tx)
    }

    pub fn decode(input: &mut &[u8]) -> Result<Transaction, DecodeError> {
        let tag = wire::read_u8(input)?;
        let tx_type = TxType::from_u8(tag).ok_or(DecodeError::BadTag {
            what: "transaction type",
            value: tag as u64,
        })?;
        let timestamp = wire::read_i64(input)?;
        let amount = wire::read_i64(input)?;
        let receiver = wire::read_identifier(input)?;
        let sender = if tx_type != TxType::CoinGeneration {
            wire::read_identifier(input)?
        } else {
            Identifier::default()
        };
        let data_len = wire::read_u8(input)? as usize;
        if data_len > MAX_SENDER_DATA {
            return Err(DecodeError::LengthTooLarge {
                what: "sender data",
                len: data_len,
                max: MAX_SENDER_DATA,
            });
        }
        let sender_data = wire::take(input, data_len)?.to_vec();
        let previous_hash_height = wire::read_u64(input)?;
        let previous_block_hash = wire::read_32(input)?;
        let cycle_tx_signature = if tx_type == TxType::CycleSignature {
            Some(wire::read_signature(input)?)
        } else {
            None
        };
        let mut cycle_signatures = BTreeMap::new();
        if tx_type.carries_vote_map() {
            let n = wire::read_count(input, "cycle signatures", MAX_CYCLE_SIGNATURES)?;
            for _ in 0..n {
                let voter = wire::read_identifier(input)?;
                let sig = wire::read_signature(input)?;
                cycle_signatures.insert(voter, sig);
            }
        }
        let signature = if tx_type != TxType::CoinGeneration {
            wire::read_signature(input)?
        } else {
            Signature::EMPTY
        };
        Ok(Transaction {
            tx_type,
            timestamp,
            amount,
            receiver,
            sender,
            sender_data,
            previous_hash_height,
            previous_block_hash,
            signature,
            cycle_tx_signature,
            cycle_signatures,
        })
    }

    /// Canonical transaction hash, used for pool dedup and logging.
    pub fn hash(&self) -> [u8; 32] {
        sha256d(&self.to_bytes())
    }

    /// Structural and cryptographic checks that need no balance state.
    /// Previous-hash binding and funding are admission's job.
    pub fn validate_static(
        &self,
        height: u64,
        version: u16,
        params: &ChainParams,
    ) -> Result<(), TxError> {
        match self.tx_type {
            TxType::CoinGeneration if height != 0 => {
                return Err(TxError::TypeNotAllowed {
                    got: self.tx_type.as_u8(),
                    height,
                });
            }
            TxType::Seed if height >= params.seed_cutoff_height => {
                return Err(TxError::TypeNotAllowed {
                    got: self.tx_type.as_u8(),
                    height,
                });
            }
            TxType::Cycle | TxType::CycleSignature if version < 2 => {
                return Err(TxError::TypeNeedsVersion {
                    got: self.tx_type.as_u8(),
                    needs: 2,
                });
            }
            _ => {}
        }
        if self.sender_data.len() > MAX_SENDER_DATA {
            return Err(TxError::SenderDataTooLong {
                len: self.sender_data.len(),
            });
        }
        if self.amount < 0 {
            return Err(TxError::NegativeAmount {
                amount: self.amount,
            });
        }
        // The signing key: the sender, except for cycle transfers, which the
        // initiating verifier signs on behalf of the cycle account. The
        // initiator identifier rides in the memo.
        let signing_id = match self.tx_type {
            TxType::CoinGeneration => return Ok(()),
            TxType::Cycle => {
                if !self.sender.is_cycle_account() {
                    return Err(TxError::CycleSenderNotCycleAccount);
                }
                self.initiator().ok_or(TxError::CycleInitiatorMissing)?
            }
            TxType::CycleSignature => {
                if self.amount != 0 {
                    return Err(TxError::CycleSignatureAmount {
                        amount: self.amount,
                    });
                }
                // The vote's memo must commit to the exact target signature.
                let target = self.cycle_tx_signature.ok_or(TxError::CycleVoteUnbound)?;
                if self.sender_data != sha256(target.as_bytes()) {
                    return Err(TxError::CycleVoteUnbound);
                }
                self.sender
            }
            TxType::Seed | TxType::Standard => self.sender,
        };
        if !verify_signature(
            self.signature.as_bytes(),
            &self.signing_body(),
            signing_id.as_bytes(),
        ) {
            return Err(TxError::BadSignature);
        }
        Ok(())
    }

    /// The verifier that initiated a cycle transfer, recovered from the memo.
    pub fn initiator(&self) -> Option<Identifier> {
        if self.tx_type != TxType::Cycle || self.sender_data.len() != 32 {
            return None;
        }
        let mut id = [0u8; 32];
        id.copy_from_slice(&self.sender_data);
        Some(Identifier(id))
    }

    /// Count of embedded voter signatures that verify over the initiator
    /// signature. Invalid entries are ignored rather than rejected so a
    /// single bad voter cannot poison an otherwise valid map.
    pub fn valid_cycle_signature_count(&self) -> usize {
        self.cycle_signatures
            .iter()
            .filter(|(voter, sig)| {
                verify_signature(sig.as_bytes(), self.signature.as_bytes(), voter.as_bytes())
            })
            .count()
    }

    // Construction helpers. These sign with the supplied identity; timestamp
    // and chain binding are the caller's responsibility.

    pub fn coin_generation(timestamp: i64, amount: i64, receiver: Identifier) -> Transaction {
        Transaction {
            tx_type: TxType::CoinGeneration,
            timestamp,
            amount,
            receiver,
            sender: Identifier::default(),
            sender_data: Vec::new(),
            previous_hash_height: 0,
            previous_block_hash: [0u8; 32],
            signature: Signature::EMPTY,
            cycle_tx_signature: None,
            cycle_signatures: BTreeMap::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn transfer(
        tx_type: TxType,
        timestamp: i64,
        amount: i64,
        receiver: Identifier,
        sender_data: Vec<u8>,
        previous_hash_height: u64,
        previous_block_hash: [u8; 32],
        identity: &SignerIdentity,
    ) -> Transaction {
        let mut tx = Transaction {
            tx_type,
            timestamp,
            amount,
            receiver,
            sender: Identifier(identity.identifier()),
            sender_data,
            previous_hash_height,
            previous_block_hash,
            signature: Signature::EMPTY,
            cycle_tx_signature: None,
            cycle_signatures: BTreeMap::new(),
        };
        tx.signature = Signature(identity.sign(&tx.signing_body()));
        tx
    }

    pub fn standard(
        timestamp: i64,
        amount: i64,
        receiver: Identifier,
        previous_hash_height: u64,
        previous_block_hash: [u8; 32],
        identity: &SignerIdentity,
    ) -> Transaction {
        Self::transfer(
            TxType::Standard,
            timestamp,
            amount,
            receiver,
            Vec::new(),
            previous_hash_height,
            previous_block_hash,
            identity,
        )
    }

    /// Initiate a cycle transfer. The initiator signs on behalf of the cycle
    /// account; voter signatures accumulate in `cycle_signatures` afterward.
    pub fn cycle(
        timestamp: i64,
        amount: i64,
        receiver: Identifier,
        previous_hash_height: u64,
        previous_block_hash: [u8; 32],
        initiator: &SignerIdentity,
    ) -> Transaction {
        let mut tx = Transaction {
            tx_type: TxType::Cycle,
            timestamp,
            amount,
            receiver,
            sender: Identifier::CYCLE_ACCOUNT,
            sender_data: initiator.identifier()[..MAX_SENDER_DATA].to_vec(),
            previous_hash_height,
            previous_block_hash,
            signature: Signature::EMPTY,
            cycle_tx_signature: None,
            cycle_signatures: BTreeMap::new(),
        };
        tx.signature = Signature(initiator.sign(&tx.signing_body()));
        tx
    }

    /// A standalone vote for the pending cycle transaction whose initiator
    /// signature is `target`. The vote map carries the voter's approval over
    /// the target signature; the memo binds the target into the signed body.
    pub fn cycle_signature(
        timestamp: i64,
        target: Signature,
        previous_hash_height: u64,
        previous_block_hash: [u8; 32],
        voter: &SignerIdentity,
    ) -> Transaction {
        let voter_id = Identifier(voter.identifier());
        let mut cycle_signatures = BTreeMap::new();
        cycle_signatures.insert(voter_id, Signature(voter.sign(target.as_bytes())));
        let mut tx = Transaction {
            tx_type: TxType::CycleSignature,
            timestamp,
            amount: 0,
            receiver: Identifier::CYCLE_ACCOUNT,
            sender: voter_id,
            sender_data: sha256(target.as_bytes()).to_vec(),
            previous_hash_height,
            previous_block_hash,
            signature: Signature::EMPTY,
            cycle_tx_signature: Some(target),
            cycle_signatures,
        };
        tx.signature = Signature(voter.sign(&tx.signing_body()));
        tx
    }

    /// Add this voter's approval to a cycle transaction's signature map.
    pub fn add_cycle_signature(&mut self, voter: &SignerIdentity) {
        let sig = Signature(voter.sign(self.signature.as_bytes()));
        self.cycle_signatures
            .insert(Identifier(voter.identifier()), sig);
    }
}
