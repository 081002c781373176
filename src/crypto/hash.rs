//! SHA-256 content hashing
//!
//! Event identifiers are the lowercase hex SHA-256 of the canonical event
//! bytes.

use sha2::{Digest, Sha256};

/// Size of a hash output in bytes
pub const HASH_SIZE: usize = 32;

/// A hash output
pub type HashOutput = [u8; HASH_SIZE];

/// Hashing operations
pub struct Hash;

impl Hash {
    /// Compute the SHA-256 digest of data
    pub fn hash(data: &[u8]) -> HashOutput {
        Sha256::digest(data).into()
    }

    /// Compute hash and return as lowercase hex string
    pub fn hash_hex(data: &[u8]) -> String {
        hex::encode(Self::hash(data))
    }

    /// Parse a 64-character hex digest back into raw bytes
    pub fn from_hex(digest: &str) -> Option<HashOutput> {
        let bytes = hex::decode(digest).ok()?;
        bytes.try_into().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let data = b"Hello, events!";
        assert_eq!(Hash::hash(data), Hash::hash(data));
    }

    #[test]
    fn test_hash_different_inputs() {
        assert_ne!(Hash::hash(b"input1"), Hash::hash(b"input2"));
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            Hash::hash_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hex_roundtrip() {
        let digest = Hash::hash(b"roundtrip");
        assert_eq!(Hash::from_hex(&hex::encode(digest)), Some(digest));
        assert_eq!(Hash::from_hex("abcd"), None);
        assert_eq!(Hash::from_hex("not hex"), None);
    }
}
