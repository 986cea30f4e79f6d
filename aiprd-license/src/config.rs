//! Licensing configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Embedded Ed25519 public key for signed entitlement tokens (32 bytes).
pub const LICENSE_PUBLIC_KEY: [u8; 32] = [
    218, 41, 233, 91, 2, 224, 15, 250, 21, 100, 87, 117, 251, 29, 43, 162, 34, 161, 148, 51,
    149, 238, 160, 107, 148, 226, 192, 87, 183, 190, 105, 208,
];

/// Prefix every user-facing license key carries.
pub const DEFAULT_KEY_PREFIX: &str = "AIPRD-";

/// Production entitlement authority.
pub const POLAR_PRODUCTION_URL: &str = "https://api.polar.sh";

/// Sandbox entitlement authority, tried after production.
pub const POLAR_SANDBOX_URL: &str = "https://sandbox-api.polar.sh";

const TOKEN_FILE: &str = "license.enc";
const TRIAL_FILE: &str = "trial.json";

/// Configuration for entitlement resolution and activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseConfig {
    /// Per-installation directory holding the encrypted token and trial record.
    pub data_dir: PathBuf,
    /// Installation path, one of the identifiers the storage key is bound to.
    pub install_path: PathBuf,
    /// Organization the license keys were issued under.
    pub organization_id: String,
    /// Authority base URLs, tried in order.
    pub authority_endpoints: Vec<String>,
    /// Public key that signed tokens are verified against.
    pub public_key: [u8; 32],
    /// Timeout for a single authority request.
    pub request_timeout_secs: u64,
    /// Required prefix of user-facing license keys.
    pub key_prefix: String,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            install_path: default_install_path(),
            organization_id: String::new(),
            authority_endpoints: vec![
                POLAR_PRODUCTION_URL.to_string(),
                POLAR_SANDBOX_URL.to_string(),
            ],
            public_key: LICENSE_PUBLIC_KEY,
            request_timeout_secs: 10,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl LicenseConfig {
    /// Default config with `AIPRD_DATA_DIR` and `AIPRD_POLAR_ORGANIZATION_ID` applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("AIPRD_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(org) = std::env::var("AIPRD_POLAR_ORGANIZATION_ID") {
            config.organization_id = org;
        }
        config
    }

    /// Config rooted at `data_dir`, with defaults for everything else.
    #[must_use]
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Path of the encrypted entitlement token.
    #[must_use]
    pub fn token_path(&self) -> PathBuf {
        self.data_dir.join(TOKEN_FILE)
    }

    /// Path of the trial record.
    #[must_use]
    pub fn trial_path(&self) -> PathBuf {
        self.data_dir.join(TRIAL_FILE)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("aiprd")
}

fn default_install_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}
