//! Machine-bound encryption for AIPRD.
//!
//! Provides the two primitives the secure local store is built on:
//! - A 256-bit key derived by hashing stable machine identifiers, so no key
//!   material ever has to be written to disk
//! - AES-256-CBC sealing of a single opaque blob, laid out as `IV ‖ ciphertext`
//!
//! A SHA-256 digest of the plaintext travels inside the ciphertext. CBC alone
//! does not detect tampering; the inner digest makes any mutation of the IV or
//! the ciphertext surface as a decryption error.

mod cipher;
mod error;
mod key;

pub use cipher::{open, seal, SealedBlob, BLOCK_SIZE, DIGEST_SIZE, IV_SIZE};
pub use error::{CryptoError, CryptoResult};
pub use key::{MachineKey, KEY_SIZE};
