//! Error types for the licensing module.

use thiserror::Error;

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Invalid license key format.
    #[error("invalid license key format: {0}")]
    InvalidKeyFormat(String),

    /// Ed25519 signature verification failed.
    #[error("license token signature invalid")]
    InvalidSignature,

    /// Token JSON is malformed or missing required fields.
    #[error("invalid license payload: {0}")]
    InvalidPayload(String),

    /// License has expired.
    #[error("license expired on {0}")]
    Expired(String),

    /// The entitlement authority answered with something other than `granted`.
    #[error("license key {0}")]
    Revoked(String),

    /// This machine already consumed its trial.
    #[error("trial already used on this machine")]
    TrialAlreadyUsed,

    /// No entitlement authority could be reached.
    #[error("license validation unavailable: {0}")]
    ValidationUnavailable(String),

    /// Network error while talking to an authority.
    #[error("network error: {0}")]
    Network(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Encryption layer error.
    #[error("crypto error: {0}")]
    Crypto(#[from] aiprd_crypto::CryptoError),
}

impl From<std::io::Error> for LicenseError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
