//! Shared test helpers for device flow tests.

#![allow(dead_code)]

use aiprd_device_auth::{DeviceFlow, DeviceFlowConfig};
use serde_json::{json, Value};
use wiremock::MockServer;

pub const DEVICE_CODE_PATH: &str = "/login/device/code";
pub const TOKEN_PATH: &str = "/login/oauth/access_token";
pub const DEVICE_CODE: &str = "dev-code-123";

/// Installs a test subscriber once; respects `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config_for(server: &MockServer) -> DeviceFlowConfig {
    DeviceFlowConfig {
        client_id: "client-abc".to_string(),
        scope: "read:user".to_string(),
        device_code_url: format!("{}{}", server.uri(), DEVICE_CODE_PATH),
        token_url: format!("{}{}", server.uri(), TOKEN_PATH),
        request_timeout_secs: 2,
    }
}

pub fn flow_for(server: &MockServer) -> DeviceFlow {
    init_tracing();
    DeviceFlow::new(config_for(server))
}

pub fn device_code_body(expires_in: u64, interval: u64) -> Value {
    json!({
        "device_code": DEVICE_CODE,
        "user_code": "WDJB-MJHT",
        "verification_uri": "https://example.com/device",
        "expires_in": expires_in,
        "interval": interval,
    })
}

pub fn error_body(code: &str) -> Value {
    json!({ "error": code, "error_description": format!("{code} description") })
}

pub fn token_body(token: &str) -> Value {
    json!({ "access_token": token, "token_type": "bearer", "scope": "read:user" })
}
