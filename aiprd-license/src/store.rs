//! Machine-bound encrypted storage for the entitlement token.
//!
//! Holds exactly one opaque blob on disk as `IV ‖ ciphertext`. The key is
//! derived from [`MachineIdentity`] and never written anywhere, so a copied
//! file does not open on another machine, user or installation.

use crate::config::LicenseConfig;
use crate::device::MachineIdentity;
use crate::error::LicenseResult;
use aiprd_crypto::{open, seal, MachineKey, SealedBlob};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Encrypted single-blob store.
#[derive(Debug)]
pub struct SecureStore {
    path: PathBuf,
    key: MachineKey,
}

impl SecureStore {
    /// Creates a store at `path` sealed with `key`.
    pub fn new(path: impl AsRef<Path>, key: MachineKey) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            key,
        }
    }

    /// Creates the store for `config`, keyed to the current machine.
    #[must_use]
    pub fn for_config(config: &LicenseConfig) -> Self {
        let identity = MachineIdentity::collect(&config.install_path);
        Self::new(config.token_path(), identity.storage_key())
    }

    /// Returns the file path backing this store.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Encrypts and atomically writes `plaintext` with owner-only permissions.
    pub fn persist(&self, plaintext: &[u8]) -> LicenseResult<()> {
        let blob = seal(&self.key, plaintext)?.to_bytes();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = owner_only_options().open(&tmp)?;
            file.write_all(&blob)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), "persisted encrypted token");
        Ok(())
    }

    /// Reads and decrypts the blob.
    ///
    /// Returns `None` when the file is missing, unreadable, truncated or fails
    /// to decrypt. Never errors.
    #[must_use]
    pub fn load(&self) -> Option<Vec<u8>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read token store");
                return None;
            }
        };

        match SealedBlob::from_bytes(&bytes).and_then(|blob| open(&self.key, &blob)) {
            Ok(plaintext) => Some(plaintext),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "discarding unreadable token store");
                None
            }
        }
    }

    /// Checks if a blob exists on disk (without decrypting it).
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Deletes the stored blob.
    pub fn clear(&self) -> LicenseResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Open options for a truncating write readable only by the owner.
pub(crate) fn owner_only_options() -> fs::OpenOptions {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
}
