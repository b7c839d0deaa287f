//! AES-256-GCM sealing under a caller-held raw key.
//!
//! Two users: confidentiality-protected transaction payloads (sealed
//! under a pre-shared chain key) and the identity binding inside a
//! transaction certificate (sealed under the issuing authority's trace
//! key, so only the authority can link the certificate back to an
//! enrollment identity).

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::keys::CryptoError;

/// Nonce length for AES-256-GCM.
const NONCE_LEN: usize = 12;

/// A sealed blob: random nonce + ciphertext, serializable into
/// certificate payloads and transaction envelopes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SealedBox {
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Seal plaintext under a raw 256-bit key with a fresh random nonce.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<SealedBox, CryptoError> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from(nonce_bytes);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(SealedBox {
        nonce: nonce_bytes.to_vec(),
        ciphertext,
    })
}

/// Open a sealed blob. Fails if the key is wrong or the blob was altered.
pub fn open(key: &[u8; 32], sealed: &SealedBox) -> Result<Vec<u8>, CryptoError> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::Decryption(e.to_string()))?;

    let nonce_arr: [u8; NONCE_LEN] = sealed
        .nonce
        .clone()
        .try_into()
        .map_err(|_| CryptoError::Decryption("invalid nonce length".into()))?;
    let nonce = Nonce::from(nonce_arr);

    cipher
        .decrypt(&nonce, sealed.ciphertext.as_ref())
        .map_err(|_| CryptoError::Decryption("sealed blob did not open (wrong key?)".into()))
}

/// Generate a fresh random 256-bit sealing key.
pub fn generate_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);
    key
}
