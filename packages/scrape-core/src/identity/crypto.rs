//! Authenticated encryption for Identity cookies and storage state
//! (spec §3: "symmetrically encrypted with an authenticated cipher").

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::security::credentials::SecretString;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption key must be 32 bytes")]
    InvalidKeyLength,
    #[error("encryption failed")]
    EncryptFailed,
    #[error("decryption failed: ciphertext invalid or key mismatch")]
    DecryptFailed,
    #[error("ciphertext too short to contain a nonce")]
    Truncated,
}

const NONCE_LEN: usize = 12;

pub struct IdentityCipher {
    cipher: Aes256Gcm,
}

impl IdentityCipher {
    pub fn new(key: &SecretString) -> Result<Self, CryptoError> {
        let bytes = key.expose().as_bytes();
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength);
        }
        let key = Key::<Aes256Gcm>::from_slice(bytes);
        Ok(Self { cipher: Aes256Gcm::new(key) })
    }

    /// Encrypts `plaintext`, returning `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut out = self.cipher.encrypt(&nonce, plaintext).map_err(|_| CryptoError::EncryptFailed)?;
        let mut sealed = nonce.to_vec();
        sealed.append(&mut out);
        Ok(sealed)
    }

    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < NONCE_LEN {
            return Err(CryptoError::Truncated);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher.decrypt(nonce.into(), ciphertext).map_err(|_| CryptoError::DecryptFailed)
    }

    pub fn encrypt_json<T: serde::Serialize>(&self, value: &T) -> Result<Vec<u8>, CryptoError> {
        let bytes = serde_json::to_vec(value).map_err(|_| CryptoError::EncryptFailed)?;
        self.encrypt(&bytes)
    }

    pub fn decrypt_json<T: serde::de::DeserializeOwned>(&self, sealed: &[u8]) -> Result<T, CryptoError> {
        let bytes = self.decrypt(sealed)?;
        serde_json::from_slice(&bytes).map_err(|_| CryptoError::DecryptFailed)
    }
}
