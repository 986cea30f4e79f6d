//! Error types for the encryption layer.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed (wrong key, bad padding or tampered data).
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Sealed blob is shorter than an IV plus one cipher block, or misaligned.
    #[error("sealed blob malformed: {len} bytes")]
    Malformed { len: usize },

    /// Invalid key length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
}
