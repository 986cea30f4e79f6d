//! Device flow error types.

use thiserror::Error;

/// Result type for device flow operations.
pub type DeviceFlowResult<T> = Result<T, DeviceFlowError>;

/// Errors that end or prevent a device-authorization attempt.
#[derive(Debug, Error)]
pub enum DeviceFlowError {
    #[error("no device flow in progress; start one first")]
    NoSession,

    #[error("device code expired; start a new device flow")]
    Expired,

    #[error("authorization denied by user")]
    AccessDenied,

    #[error("authorization server error: {code}")]
    Authority {
        code: String,
        description: Option<String>,
    },

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DeviceFlowError {
    /// Returns true if the session was discarded and the caller must start over.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeviceFlowError::Expired | DeviceFlowError::AccessDenied | DeviceFlowError::Authority { .. }
        )
    }
}
