use sha2::{Digest, Sha256};

/// Single SHA-256.
#[inline]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    let out = h.finalize();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&out);
    arr
}

/// Double SHA-256, the canonical hash for blocks, snapshots, and transactions.
#[inline]
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_hash_is_hash_of_hash() {
        let msg = b"solidus";
        assert_eq!(sha256d(msg), sha256(&sha256(msg)));
        assert_ne!(sha256d(msg), sha256(msg));
    }

    #[test]
    fn empty_input_is_stable() {
        // SHA-256 of the empty string, well-known vector.
        let expected =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap();
        assert_eq!(sha256(b"").to_vec(), expected);
    }
}
