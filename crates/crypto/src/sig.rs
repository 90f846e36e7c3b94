//! Ed25519 signing seam.
//!
//! The verifier identifies every peer by the 32 raw bytes of its Ed25519
//! public key and exchanges 64-byte detached signatures. Consumers only see
//! fixed-width byte arrays; the dalek types never cross this boundary.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::hash::sha256;

pub const IDENTIFIER_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 64;

/// Capability of a signing party: produce signatures under a stable identifier.
pub trait SignatureScheme {
    fn sign(&self, body: &[u8]) -> [u8; SIGNATURE_LEN];
    fn public_identifier(&self) -> [u8; IDENTIFIER_LEN];
}

/// Verify a detached signature against a raw 32-byte public identifier.
///
/// Malformed identifiers (off-curve points) verify as false rather than
/// erroring; a peer presenting one is indistinguishable from a bad signer.
pub fn verify_signature(
    signature: &[u8; SIGNATURE_LEN],
    body: &[u8],
    identifier: &[u8; IDENTIFIER_LEN],
) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(identifier) else {
        return false;
    };
    let sig = Signature::from_bytes(signature);
    key.verify(body, &sig).is_ok()
}

/// The local verifier's signing identity, injected wherever blocks, votes, or
/// messages need to be signed. Construct from a seed for deterministic tests.
#[derive(Clone)]
pub struct SignerIdentity {
    key: SigningKey,
    identifier: [u8; IDENTIFIER_LEN],
}

impl SignerIdentity {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let key = SigningKey::from_bytes(&seed);
        let identifier = key.verifying_key().to_bytes();
        Self { key, identifier }
    }

    /// Fresh random identity (node startup without a configured seed).
    pub fn generate() -> Self {
        let key = SigningKey::generate(&mut OsRng);
        let identifier = key.verifying_key().to_bytes();
        Self { key, identifier }
    }

    /// Convenience for tests: derive a distinct identity from a short label.
    pub fn from_label(label: &[u8]) -> Self {
        Self::from_seed(sha256(label))
    }

    #[inline]
    pub fn identifier(&self) -> [u8; IDENTIFIER_LEN] {
        self.identifier
    }

    pub fn sign(&self, body: &[u8]) -> [u8; SIGNATURE_LEN] {
        self.key.sign(body).to_bytes()
    }
}

impl SignatureScheme for SignerIdentity {
    fn sign(&self, body: &[u8]) -> [u8; SIGNATURE_LEN] {
        SignerIdentity::sign(self, body)
    }

    fn public_identifier(&self) -> [u8; IDENTIFIER_LEN] {
        self.identifier
    }
}

impl std::fmt::Debug for SignerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secret key intentionally not printed.
        write!(f, "SignerIdentity({})", hex::encode(&self.identifier[..8]))
    }
}
