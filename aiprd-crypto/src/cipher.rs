//! Blob sealing using AES-256-CBC.
//!
//! Wire layout is `IV ‖ ciphertext`, where the ciphertext is the PKCS#7-padded
//! encryption of `plaintext ‖ SHA-256(plaintext)` under a fresh random IV.

use crate::error::{CryptoError, CryptoResult};
use crate::key::MachineKey;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use sha2::{Digest, Sha256};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Size of the IV in bytes (one AES block).
pub const IV_SIZE: usize = 16;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Size of the inner plaintext digest in bytes.
pub const DIGEST_SIZE: usize = 32;

/// An encrypted blob with the IV needed to decrypt it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedBlob {
    /// The IV used for encryption (unique per seal).
    pub iv: [u8; IV_SIZE],
    /// The padded ciphertext.
    pub ciphertext: Vec<u8>,
}

impl SealedBlob {
    /// Returns the total size of the encoded blob.
    pub fn len(&self) -> usize {
        IV_SIZE + self.ciphertext.len()
    }

    /// Returns true if the ciphertext is empty.
    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }

    /// Encodes as `IV ‖ ciphertext`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.len());
        bytes.extend_from_slice(&self.iv);
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    /// Splits `IV ‖ ciphertext`.
    ///
    /// Rejects input shorter than an IV plus one block, or whose ciphertext
    /// is not block-aligned.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < IV_SIZE + BLOCK_SIZE || (bytes.len() - IV_SIZE) % BLOCK_SIZE != 0 {
            return Err(CryptoError::Malformed { len: bytes.len() });
        }

        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&bytes[..IV_SIZE]);

        Ok(Self {
            iv,
            ciphertext: bytes[IV_SIZE..].to_vec(),
        })
    }
}

/// Encrypts plaintext under a fresh random IV.
pub fn seal(key: &MachineKey, plaintext: &[u8]) -> CryptoResult<SealedBlob> {
    let mut iv = [0u8; IV_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut body = Vec::with_capacity(plaintext.len() + DIGEST_SIZE);
    body.extend_from_slice(plaintext);
    body.extend_from_slice(&Sha256::digest(plaintext));

    Ok(SealedBlob {
        iv,
        ciphertext: cipher.encrypt_padded_vec_mut::<Pkcs7>(&body),
    })
}

/// Decrypts a sealed blob and checks the inner digest.
pub fn open(key: &MachineKey, sealed: &SealedBlob) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256CbcDec::new_from_slices(key.as_bytes(), &sealed.iv)
        .map_err(|e| CryptoError::Decryption(e.to_string()))?;

    let mut body = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&sealed.ciphertext)
        .map_err(|_| CryptoError::Decryption("bad padding (wrong key or tampered data)".into()))?;

    if body.len() < DIGEST_SIZE {
        return Err(CryptoError::Decryption("plaintext too short".into()));
    }

    let digest = body.split_off(body.len() - DIGEST_SIZE);
    if Sha256::digest(&body).as_slice() != digest.as_slice() {
        return Err(CryptoError::Decryption("digest mismatch (tampered data)".into()));
    }

    Ok(body)
}
