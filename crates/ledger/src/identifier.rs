//! Canonical signer identifier and signature types.
//!
//! An identifier is the raw 32-byte Ed25519 public key of a signer; it is the
//! state key for balances and the committee key for cycle membership. The
//! all-zero identifier is reserved for the cycle account, the synthetic
//! account that funds approved cycle transactions.

use serde::{Deserialize, Serialize};

#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Identifier(pub [u8; 32]);

impl Identifier {
    /// The synthetic cycle account.
    pub const CYCLE_ACCOUNT: Identifier = Identifier([0u8; 32]);

    #[inline]
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Identifier(b)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    #[inline]
    pub fn is_cycle_account(&self) -> bool {
        *self == Self::CYCLE_ACCOUNT
    }

    /// Short hex prefix for log lines.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl AsRef<[u8]> for Identifier {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// 64-byte detached signature. Ordering is byte-lexicographic; the sort order
/// of signatures is consensus-relevant in transaction normalisation and vote
/// tie-breaking.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub const EMPTY: Signature = Signature([0u8; 64]);

    #[inline]
    pub fn from_bytes(b: [u8; 64]) -> Self {
        Signature(b)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl Default for Signature {
    fn default() -> Self {
        Signature::EMPTY
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({})", hex::encode(&self.0[..4]))
    }
}
