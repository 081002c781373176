//! Cryptographic primitives for event authentication
//!
//! This module provides the building blocks the event layer signs with:
//! - `keys`: secp256k1 key pairs and BIP-340 Schnorr signatures
//! - `codec`: bech32 text encoding of keys (`esec` / `epub`)
//! - `hash`: SHA-256 content hashing

pub mod codec;
pub mod error;
pub mod hash;
pub mod keys;

// Re-export commonly used types
pub use codec::{PUBLIC_KEY_PREFIX, SECRET_KEY_PREFIX};
pub use error::{CryptoError, CryptoResult};
pub use hash::Hash;
pub use keys::{KeyPair, PublicKey, SecretKey, SignatureBytes};

/// Generate cryptographically secure random bytes
pub fn random_bytes<const N: usize>() -> [u8; N] {
    use rand::RngCore;
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn test_text_keys_sign_and_verify() {
        // Keys shared as text
        let pair = KeyPair::generate();
        let secret_text = pair.secret_key().to_bech32().unwrap();
        let public_text = pair.public_key().to_bech32().unwrap();

        // Signer restores from text
        let restored = KeyPair::from_secret(&SecretKey::parse(&secret_text).unwrap()).unwrap();
        let digest = Hash::hash(b"shared over text");
        let signature = restored.sign_digest(&digest).unwrap();

        // Verifier only has the public text
        let verifier = PublicKey::parse(&public_text).unwrap();
        assert!(verifier.verify(&digest, &signature).is_ok());
    }

    #[test]
    fn test_random_bytes_differ() {
        assert_ne!(random_bytes::<32>(), random_bytes::<32>());
    }
}
