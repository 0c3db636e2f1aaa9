//! Cryptographic error types

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// No usable cryptographic backend (system RNG unavailable)
    #[error("cryptographic backend unavailable: {0}")]
    Unavailable(String),

    /// Key pair generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Decryption failed - malformed input or padding mismatch (possibly tampered data)
    #[error("decryption failed")]
    DecryptionFailed,

    /// A decrypted payload was empty where a value is required
    #[error("decrypted payload is empty")]
    EmptyPayload,

    /// The encoded public key could not be decoded
    #[error("invalid public key encoding")]
    InvalidPublicKey,
}

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;
