//! Shared test helpers for license tests.

#![allow(dead_code)]

use aiprd_license::{
    signing_bytes, EntitlementToken, ExchangedToken, LicenseConfig, LicenseManager, ProductType,
    SignedToken, Tier, PREMIUM_FEATURES,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signer, SigningKey};
use std::time::Duration as StdDuration;
use tempfile::TempDir;

/// Endpoint nothing listens on.
pub const UNREACHABLE_AUTHORITY: &str = "http://127.0.0.1:9";

pub const VALIDATE_PATH: &str = "/v1/customer-portal/license-keys/validate";

pub const LICENSE_UUID: &str = "3f2c8a1e-5b7d-4c9e-8f10-2a3b4c5d6e7f";

/// Installs a test subscriber once; respects `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Returns a deterministic Ed25519 key pair from a fixed seed.
pub fn test_keypair() -> (SigningKey, [u8; 32]) {
    let seed: [u8; 32] = [
        1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24,
        25, 26, 27, 28, 29, 30, 31, 32,
    ];
    let signing_key = SigningKey::from_bytes(&seed);
    let verifying_key = signing_key.verifying_key();
    (signing_key, verifying_key.to_bytes())
}

/// Signs a token the way the external issuer does.
pub fn sign_token(
    signing_key: &SigningKey,
    tier: Tier,
    expires_at: Option<DateTime<Utc>>,
    features: &[&str],
) -> SignedToken {
    sign_claims(
        signing_key,
        serde_json::json!({
            "tier": tier,
            "expires_at": expires_at,
            "enabled_features": features,
        }),
    )
}

/// Signs arbitrary claims verbatim.
pub fn sign_claims(signing_key: &SigningKey, claims: serde_json::Value) -> SignedToken {
    let signature = signing_key.sign(&signing_bytes(&claims));
    let serde_json::Value::Object(claims) = claims else {
        panic!("claims must be a JSON object");
    };
    SignedToken::from_claims(claims, STANDARD.encode(signature.to_bytes())).unwrap()
}

/// Edits the claims of a signed token while keeping its original signature.
pub fn tamper(
    token: &SignedToken,
    edit: impl FnOnce(&mut serde_json::Map<String, serde_json::Value>),
) -> SignedToken {
    let mut claims = token.claims().clone();
    edit(&mut claims);
    SignedToken::from_claims(claims, token.signature()).unwrap()
}

/// Builds a user-facing key for a token: `AIPRD-` + base64url(JSON).
pub fn token_key(token: &EntitlementToken) -> String {
    format!("AIPRD-{}", token.encode_key_body().unwrap())
}

pub fn license_key() -> String {
    format!("AIPRD-{LICENSE_UUID}")
}

pub fn days_from_now(days: i64) -> DateTime<Utc> {
    Utc::now() + Duration::days(days)
}

/// An exchanged token expiring in `expires_in_days` and validated `validated_days_ago`.
pub fn exchanged_token(expires_in_days: Option<i64>, validated_days_ago: i64) -> EntitlementToken {
    let now = Utc::now();
    let expires_at = expires_in_days.map(|d| now + Duration::days(d));
    EntitlementToken::Exchanged(ExchangedToken {
        tier: Tier::Licensed,
        expires_at,
        enabled_features: PREMIUM_FEATURES.iter().map(|f| (*f).to_string()).collect(),
        opaque_id: license_key(),
        product_type: ProductType::classify(expires_at, now),
        validated_at: now - Duration::days(validated_days_ago),
    })
}

/// Polar's validation answer.
pub fn polar_body(status: &str, expires_at: Option<DateTime<Utc>>) -> serde_json::Value {
    serde_json::json!({
        "id": "lk_01",
        "status": status,
        "expires_at": expires_at.map(|e| e.to_rfc3339()),
        "benefit_id": "ben_123",
        "customer": { "email": "buyer@example.com" },
        "usage": 0,
    })
}

/// A data directory plus a config pointing at it.
pub struct TestEnv {
    pub dir: TempDir,
    pub config: LicenseConfig,
}

impl TestEnv {
    pub fn new(authority: &str) -> Self {
        Self::with_authorities(vec![authority.to_string()])
    }

    pub fn offline() -> Self {
        Self::new(UNREACHABLE_AUTHORITY)
    }

    pub fn with_authorities(authorities: Vec<String>) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let (_, public_key) = test_keypair();
        let config = LicenseConfig {
            data_dir: dir.path().join("data"),
            install_path: dir.path().to_path_buf(),
            organization_id: "org_test".to_string(),
            authority_endpoints: authorities,
            public_key,
            request_timeout_secs: 2,
            ..LicenseConfig::default()
        };
        Self { dir, config }
    }

    pub fn manager(&self) -> LicenseManager {
        LicenseManager::new(self.config.clone())
    }
}

/// Persists `token` through the manager's store.
pub fn store_token(manager: &LicenseManager, token: &EntitlementToken) {
    manager.store().persist(&token.to_json().unwrap()).unwrap();
}

/// Waits until no background re-validation is running.
pub async fn wait_for_revalidation(manager: &LicenseManager) {
    for _ in 0..500 {
        if !manager.is_revalidating() {
            return;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    panic!("background re-validation did not finish");
}
