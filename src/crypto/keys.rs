//! secp256k1 key pairs for event signing
//!
//! Keys are BIP-340 style: a 32-byte secret scalar and the 32-byte x-only
//! public key derived from it. Both can be written as lowercase hex or as
//! bech32 text (`esec1...` / `epub1...`); all forms round-trip losslessly.

use secp256k1::{schnorr::Signature, Keypair, Message, Secp256k1, XOnlyPublicKey};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::codec::{self, PUBLIC_KEY_PREFIX, SECRET_KEY_PREFIX};
use super::error::{CryptoError, CryptoResult};
use super::hash::HashOutput;

/// Size of a public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of a secret key in bytes
pub const SECRET_KEY_SIZE: usize = 32;

/// Size of a signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

fn decode_hex(s: &str) -> CryptoResult<Vec<u8>> {
    hex::decode(s).map_err(|e| CryptoError::InvalidHex(e.to_string()))
}

/// An x-only public key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Create from raw bytes
    ///
    /// The bytes must be the x coordinate of a point on the curve.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: PUBLIC_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        XOnlyPublicKey::from_slice(bytes).map_err(|_| CryptoError::InvalidPublicKey)?;

        let mut arr = [0u8; PUBLIC_KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(PublicKey(arr))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Convert to lowercase hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex string
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        Self::from_bytes(&decode_hex(s)?)
    }

    /// Encode as `epub1...` text
    pub fn to_bech32(&self) -> CryptoResult<String> {
        codec::encode(PUBLIC_KEY_PREFIX, &self.0)
    }

    /// Decode from `epub1...` text
    pub fn from_bech32(s: &str) -> CryptoResult<Self> {
        Self::from_bytes(&codec::decode_expecting(s, PUBLIC_KEY_PREFIX)?)
    }

    /// Parse either representation, picking bech32 when the text starts
    /// with `epub1`
    pub fn parse(s: &str) -> CryptoResult<Self> {
        if s.starts_with("epub1") {
            Self::from_bech32(s)
        } else {
            Self::from_hex(s)
        }
    }

    /// Verify a Schnorr signature over a 32-byte digest
    pub fn verify(&self, digest: &HashOutput, signature: &SignatureBytes) -> CryptoResult<()> {
        let key = XOnlyPublicKey::from_slice(&self.0).map_err(|_| CryptoError::InvalidPublicKey)?;
        let sig = Signature::from_slice(&signature.0).map_err(|_| {
            CryptoError::InvalidSignatureLength {
                expected: SIGNATURE_SIZE,
                actual: signature.0.len(),
            }
        })?;
        let msg = Message::from_digest(*digest);

        Secp256k1::verification_only()
            .verify_schnorr(&sig, &msg, &key)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({}...)", &self.to_hex()[..16])
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A 64-byte BIP-340 signature
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SignatureBytes(pub [u8; SIGNATURE_SIZE]);

impl SignatureBytes {
    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != SIGNATURE_SIZE {
            return Err(CryptoError::InvalidSignatureLength {
                expected: SIGNATURE_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; SIGNATURE_SIZE];
        arr.copy_from_slice(bytes);
        Ok(SignatureBytes(arr))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex string
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        Self::from_bytes(&decode_hex(s)?)
    }
}

impl std::fmt::Debug for SignatureBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..16])
    }
}

/// A secret key, zeroized when dropped
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; SECRET_KEY_SIZE]);

impl SecretKey {
    /// Create from raw bytes, rejecting zero and out-of-range scalars
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != SECRET_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: SECRET_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        secp256k1::SecretKey::from_slice(bytes).map_err(|_| CryptoError::InvalidSecretKey)?;

        let mut arr = [0u8; SECRET_KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(SecretKey(arr))
    }

    /// Get the raw bytes
    ///
    /// # Security Warning
    /// The secret key should never be logged or transmitted.
    pub fn as_bytes(&self) -> &[u8; SECRET_KEY_SIZE] {
        &self.0
    }

    /// Convert to lowercase hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex string
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let mut bytes = decode_hex(s)?;
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }

    /// Encode as `esec1...` text
    pub fn to_bech32(&self) -> CryptoResult<String> {
        codec::encode(SECRET_KEY_PREFIX, &self.0)
    }

    /// Decode from `esec1...` text
    pub fn from_bech32(s: &str) -> CryptoResult<Self> {
        let mut bytes = codec::decode_expecting(s, SECRET_KEY_PREFIX)?;
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }

    /// Parse either representation, picking bech32 when the text starts
    /// with `esec1`
    pub fn parse(s: &str) -> CryptoResult<Self> {
        if s.starts_with("esec1") {
            Self::from_bech32(s)
        } else {
            Self::from_hex(s)
        }
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey(..)")
    }
}

/// A signing key pair
///
/// The public key is derived from the secret key once, at construction.
#[derive(Clone)]
pub struct KeyPair {
    public_key: PublicKey,
    secret_key: SecretKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        loop {
            let mut candidate = super::random_bytes::<SECRET_KEY_SIZE>();
            let secret = SecretKey::from_bytes(&candidate);
            candidate.zeroize();
            if let Ok(pair) = secret.and_then(|secret| Self::from_secret(&secret)) {
                return pair;
            }
        }
    }

    /// Derive the key pair belonging to a secret key
    pub fn from_secret(secret: &SecretKey) -> CryptoResult<Self> {
        let keypair = Self::secp_keypair(secret)?;
        let (x_only, _parity) = keypair.x_only_public_key();

        Ok(KeyPair {
            public_key: PublicKey(x_only.serialize()),
            secret_key: secret.clone(),
        })
    }

    /// Get the public key
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Get the secret key
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// Schnorr-sign a 32-byte digest
    ///
    /// Signing uses no auxiliary randomness, so the same key and digest
    /// always produce the same signature.
    pub fn sign_digest(&self, digest: &HashOutput) -> CryptoResult<SignatureBytes> {
        let keypair = Self::secp_keypair(&self.secret_key)?;
        let msg = Message::from_digest(*digest);
        let sig = Secp256k1::signing_only().sign_schnorr_no_aux_rand(&msg, &keypair);
        let bytes: &[u8; SIGNATURE_SIZE] = sig.as_ref();
        Ok(SignatureBytes(*bytes))
    }

    /// Verify a signature made by this key pair (convenience method)
    pub fn verify(&self, digest: &HashOutput, signature: &SignatureBytes) -> CryptoResult<()> {
        self.public_key.verify(digest, signature)
    }

    fn secp_keypair(secret: &SecretKey) -> CryptoResult<Keypair> {
        let secp = Secp256k1::signing_only();
        Keypair::from_seckey_slice(&secp, secret.as_bytes())
            .map_err(|_| CryptoError::InvalidSecretKey)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}
