//! Device flow configuration.

use serde::{Deserialize, Serialize};

/// Endpoints and client identity for the device-authorization flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceFlowConfig {
    /// OAuth client ID registered with the authority.
    pub client_id: String,
    /// Space-separated scopes to request.
    pub scope: String,
    /// Device authorization endpoint.
    pub device_code_url: String,
    /// Token exchange endpoint.
    pub token_url: String,
    /// Timeout for a single request.
    pub request_timeout_secs: u64,
}

impl Default for DeviceFlowConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            scope: "read:user".to_string(),
            device_code_url: "https://github.com/login/device/code".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
            request_timeout_secs: 30,
        }
    }
}
