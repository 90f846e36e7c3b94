pub mod hash;

pub mod sig;

pub use hash::{sha256, sha256d};

pub use sig::{verify_signature, SignatureScheme, SignerIdentity, IDENTIFIER_LEN, SIGNATURE_LEN};
