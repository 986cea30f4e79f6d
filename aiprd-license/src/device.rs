//! Machine identity for key derivation and trial fingerprinting.
//!
//! Both the secure store key and the trial fingerprint are derived from the
//! same three identifiers: host name, current user and installation path.

use aiprd_crypto::MachineKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use std::path::Path;

const FINGERPRINT_DOMAIN: &[u8] = b"aiprd-fingerprint|";

/// Stable identifiers for one installation on one machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineIdentity {
    /// Hostname.
    pub hostname: String,
    /// Current user name.
    pub username: String,
    /// Installation path.
    pub install_path: String,
}

impl MachineIdentity {
    /// Collects identifiers for the current machine and the given installation path.
    #[must_use]
    pub fn collect(install_path: impl AsRef<Path>) -> Self {
        Self {
            hostname: get_hostname(),
            username: get_username(),
            install_path: install_path.as_ref().to_string_lossy().into_owned(),
        }
    }

    fn components(&self) -> [&str; 3] {
        [&self.hostname, &self.username, &self.install_path]
    }

    /// Derives the symmetric key used by the secure store.
    #[must_use]
    pub fn storage_key(&self) -> MachineKey {
        MachineKey::derive(&self.components())
    }

    /// Returns the hex-encoded one-way hardware fingerprint.
    ///
    /// Domain-separated from [`storage_key`](Self::storage_key): the
    /// fingerprint is written in plaintext and must not reveal the key.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_DOMAIN);
        hasher.update(self.components().join("|").as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Gets the machine hostname.
fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Gets the current user name.
fn get_username() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
