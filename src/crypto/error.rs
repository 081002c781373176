//! Cryptographic error types

use thiserror::Error;

/// Errors that can occur in key handling, encoding and signing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The provided key has an invalid length
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes
        expected: usize,
        /// Actual key length in bytes
        actual: usize,
    },

    /// The provided signature has an invalid length
    #[error("Invalid signature length: expected {expected}, got {actual}")]
    InvalidSignatureLength {
        /// Expected signature length in bytes
        expected: usize,
        /// Actual signature length in bytes
        actual: usize,
    },

    /// Input was not valid hexadecimal
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// Signature verification failed - the signature is invalid
    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    /// The public key is not a valid x-only secp256k1 point
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// The secret key is zero or not below the curve order
    #[error("Invalid secret key")]
    InvalidSecretKey,

    /// Bech32 text could not be produced
    #[error("Encoding failed: {0}")]
    EncodingError(String),

    /// Bech32 text could not be decoded (checksum, prefix or length)
    #[error("Decoding failed: {0}")]
    DecodingError(String),

    /// Bech32 text decoded fine but carries the wrong prefix
    #[error("Unexpected prefix: expected {expected}, got {actual}")]
    UnexpectedPrefix {
        /// Prefix the caller asked for
        expected: String,
        /// Prefix found in the text
        actual: String,
    },
}

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;
