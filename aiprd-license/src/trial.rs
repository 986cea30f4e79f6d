//! Single-use trial tracking.
//!
//! One record per machine, `{fingerprint, activated_at, integrity_tag}`, where
//! the tag is HMAC-SHA256 keyed by the fingerprint over
//! `TRIAL_TAG ‖ fingerprint ‖ activated_at`.
//!
//! A missing or unparseable record means the trial is still available. A
//! record that belongs to another machine or carries a wrong tag is not
//! honored either.

use crate::config::LicenseConfig;
use crate::device::MachineIdentity;
use crate::error::{LicenseError, LicenseResult};
use crate::store::owner_only_options;
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

const TRIAL_TAG: &str = "aiprd-trial-v1";

/// A persisted trial activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub fingerprint: String,
    /// RFC 3339 timestamp, kept as the literal string the tag was computed over.
    pub activated_at: String,
    pub integrity_tag: String,
}

impl TrialRecord {
    /// Creates a tagged record for `fingerprint` activated at `at`.
    pub fn new(fingerprint: &str, at: DateTime<Utc>) -> LicenseResult<Self> {
        let activated_at = at.to_rfc3339_opts(SecondsFormat::Secs, true);
        let integrity_tag = integrity_tag(fingerprint, &activated_at)?;
        Ok(Self {
            fingerprint: fingerprint.to_string(),
            activated_at,
            integrity_tag,
        })
    }

    /// Returns true if the record was produced on the machine with `fingerprint`
    /// and has not been edited.
    #[must_use]
    pub fn verify(&self, fingerprint: &str) -> bool {
        if self.fingerprint != fingerprint {
            return false;
        }
        integrity_tag(fingerprint, &self.activated_at)
            .is_ok_and(|expected| expected == self.integrity_tag)
    }
}

fn integrity_tag(fingerprint: &str, activated_at: &str) -> LicenseResult<String> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(fingerprint.as_bytes())
        .map_err(|e| LicenseError::InvalidPayload(format!("trial tag key rejected: {e}")))?;
    mac.update(TRIAL_TAG.as_bytes());
    mac.update(fingerprint.as_bytes());
    mac.update(activated_at.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Guards against repeated trials on one machine.
#[derive(Debug, Clone)]
pub struct TrialGuard {
    path: PathBuf,
    fingerprint: String,
}

impl TrialGuard {
    /// Creates a guard for the record at `path` and the given machine.
    pub fn new(path: impl AsRef<Path>, identity: &MachineIdentity) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            fingerprint: identity.fingerprint(),
        }
    }

    /// Creates the guard for `config` on the current machine.
    #[must_use]
    pub fn for_config(config: &LicenseConfig) -> Self {
        Self::new(
            config.trial_path(),
            &MachineIdentity::collect(&config.install_path),
        )
    }

    /// Returns this machine's fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Returns true only if a record exists that matches this machine and its tag.
    #[must_use]
    pub fn has_used_trial(&self) -> bool {
        self.verified_record().is_some()
    }

    /// Returns the record if it exists and verifies.
    #[must_use]
    pub fn verified_record(&self) -> Option<TrialRecord> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read trial record");
                return None;
            }
        };

        let record: TrialRecord = match serde_json::from_str(&json) {
            Ok(record) => record,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unparseable trial record");
                return None;
            }
        };

        if record.verify(&self.fingerprint) {
            Some(record)
        } else {
            warn!(path = %self.path.display(), "rejecting trial record that does not verify");
            None
        }
    }

    /// Writes a fresh record stamped with the current time.
    pub fn record_trial_usage(&self) -> LicenseResult<()> {
        let record = TrialRecord::new(&self.fingerprint, Utc::now())?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = owner_only_options().open(&self.path)?;
        file.write_all(serde_json::to_string_pretty(&record)?.as_bytes())?;

        info!(activated_at = %record.activated_at, "recorded trial activation");
        Ok(())
    }
}
