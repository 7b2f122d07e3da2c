//! AES-256-GCM encryption for document bodies and DEK wrapping (§4.3).
//!
//! The spec names AES-EAX; its own design notes sanction AES-GCM as a
//! drop-in replacement as long as the wrap/unwrap envelope shape is kept
//! and nonces are never reused under the same key. Both hold here: every
//! call draws a fresh random 12-byte nonce, and the envelope is exactly
//! ciphertext + nonce (GCM folds its authentication tag into the
//! ciphertext it returns).

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("authenticated decryption failed: bad key or tampered ciphertext")]
    AuthenticationFailed,
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
}

/// An AES-256-GCM ciphertext alongside the nonce used to produce it,
/// base64-encoded for JSON transport and at-rest storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub ciphertext: String,
    pub nonce: String,
}

pub fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Envelope, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    let b64 = base64::engine::general_purpose::STANDARD;
    Ok(Envelope {
        ciphertext: b64.encode(ciphertext),
        nonce: b64.encode(nonce_bytes),
    })
}

pub fn decrypt(key: &[u8; KEY_LEN], envelope: &Envelope) -> Result<Vec<u8>, CryptoError> {
    let b64 = base64::engine::general_purpose::STANDARD;
    let nonce_bytes = b64
        .decode(&envelope.nonce)
        .map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(CryptoError::MalformedEnvelope(format!(
            "nonce must be {NONCE_LEN} bytes, got {}",
            nonce_bytes.len()
        )));
    }
    let ciphertext = b64
        .decode(&envelope.ciphertext)
        .map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(&nonce_bytes);
    cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Generates a fresh random 32-byte data-encryption key.
pub fn generate_dek() -> [u8; KEY_LEN] {
    let mut dek = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut dek);
    dek
}

/// Wraps a DEK under the KEK — just another AES-256-GCM encryption, of the
/// 32 raw DEK bytes rather than a document body.
pub fn wrap_dek(kek: &[u8; KEY_LEN], dek: &[u8; KEY_LEN]) -> Result<Envelope, CryptoError> {
    encrypt(kek, dek)
}

pub fn unwrap_dek(
    kek: &[u8; KEY_LEN],
    envelope: &Envelope,
) -> Result<[u8; KEY_LEN], CryptoError> {
    let bytes = decrypt(kek, envelope)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength(len))
}
