//! ECDSA P-256 key generation and encryption at rest.
//!
//! Enrollment private keys are encrypted with Argon2id (KDF) + AES-256-GCM
//! before writing to disk. The node's enrollment secret is required to
//! decrypt after each restart.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use argon2::Argon2;
use p256::ecdsa::{SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::Path;
use zeroize::Zeroize;

/// Salt length for Argon2id key derivation.
const SALT_LEN: usize = 16;

/// Nonce length for AES-256-GCM.
const NONCE_LEN: usize = 12;

/// Encrypted key material stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedKey {
    pub ciphertext: Vec<u8>,
    pub salt: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// ECDSA P-256 signing key pair.
///
/// The inner scalar is zeroized by `p256` on drop.
pub struct NodeKeyPair {
    signing_key: SigningKey,
}

impl NodeKeyPair {
    /// Generate a fresh key pair from the OS CSPRNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Access the inner signing key.
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// The verifying (public) half of this key pair.
    pub fn verifying_key(&self) -> VerifyingKey {
        *self.signing_key.verifying_key()
    }

    /// Export the public key in PEM format.
    pub fn public_key_pem(&self) -> String {
        self.signing_key
            .verifying_key()
            .to_public_key_pem(p256::pkcs8::LineEnding::LF)
            .expect("public key PEM encoding should not fail")
    }

    /// Export the private key in PKCS#8 PEM format.
    /// The returned string zeroizes itself on drop.
    pub fn private_key_pem(&self) -> zeroize::Zeroizing<String> {
        self.signing_key
            .to_pkcs8_pem(p256::pkcs8::LineEnding::LF)
            .expect("private key PEM encoding should not fail")
    }

    /// Import a key pair from PKCS#8 PEM.
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, CryptoError> {
        let signing_key = SigningKey::from_pkcs8_pem(pem)
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?;
        Ok(Self { signing_key })
    }

    /// Import a key pair from PKCS#8 DER bytes.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, CryptoError> {
        let signing_key = SigningKey::from_pkcs8_der(der)
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?;
        Ok(Self { signing_key })
    }

    /// Export the private key as PKCS#8 DER bytes.
    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>, CryptoError> {
        let der = self
            .signing_key
            .to_pkcs8_der()
            .map_err(|e| CryptoError::KeyEncoding(e.to_string()))?;
        Ok(der.as_bytes().to_vec())
    }
}

/// Encrypt a key pair for storage at rest.
///
/// Argon2id derives an AES-256 key from the secret, then the PKCS#8
/// DER-encoded private key is encrypted with AES-256-GCM.
pub fn encrypt_key(key: &NodeKeyPair, secret: &str) -> Result<EncryptedKey, CryptoError> {
    let mut der = key.to_pkcs8_der()?;
    let encrypted = encrypt_bytes(&der, secret);
    der.zeroize();
    encrypted
}

/// Decrypt a key pair from encrypted storage.
pub fn decrypt_key(encrypted: &EncryptedKey, secret: &str) -> Result<NodeKeyPair, CryptoError> {
    let mut plaintext = decrypt_bytes(encrypted, secret)?;
    let key = NodeKeyPair::from_pkcs8_der(&plaintext);
    plaintext.zeroize();
    key
}

/// Save an encrypted key to a JSON file.
pub fn save_encrypted_key(path: &Path, encrypted: &EncryptedKey) -> Result<(), CryptoError> {
    let json = serde_json::to_string_pretty(encrypted)
        .map_err(|e| CryptoError::Serialization(e.to_string()))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::debug!(path = %path.display(), "Encrypted key saved");
    Ok(())
}

/// Load an encrypted key from a JSON file.
pub fn load_encrypted_key(path: &Path) -> Result<EncryptedKey, CryptoError> {
    let json = std::fs::read_to_string(path)?;
    let encrypted: EncryptedKey =
        serde_json::from_str(&json).map_err(|e| CryptoError::Serialization(e.to_string()))?;
    Ok(encrypted)
}

/// Encrypt arbitrary bytes with secret-derived AES-256-GCM.
pub fn encrypt_bytes(plaintext: &[u8], secret: &str) -> Result<EncryptedKey, CryptoError> {
    let mut salt = vec![0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let mut nonce_bytes = vec![0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);

    let mut aes_key = derive_aes_key(secret, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&aes_key)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    aes_key.zeroize();

    let nonce_arr: [u8; NONCE_LEN] = nonce_bytes
        .clone()
        .try_into()
        .expect("nonce is always NONCE_LEN bytes");
    let nonce = Nonce::from(nonce_arr);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(EncryptedKey {
        ciphertext,
        salt,
        nonce: nonce_bytes,
    })
}

/// Decrypt bytes encrypted with `encrypt_bytes`.
pub fn decrypt_bytes(encrypted: &EncryptedKey, secret: &str) -> Result<Vec<u8>, CryptoError> {
    let mut aes_key = derive_aes_key(secret, &encrypted.salt)?;
    let cipher = Aes256Gcm::new_from_slice(&aes_key)
        .map_err(|e| CryptoError::Decryption(e.to_string()))?;
    aes_key.zeroize();

    let nonce_arr: [u8; NONCE_LEN] = encrypted
        .nonce
        .clone()
        .try_into()
        .map_err(|_| CryptoError::Decryption("invalid nonce length".into()))?;
    let nonce = Nonce::from(nonce_arr);
    let plaintext = cipher
        .decrypt(&nonce, encrypted.ciphertext.as_ref())
        .map_err(|_| CryptoError::Decryption("decryption failed (wrong secret?)".into()))?;

    Ok(plaintext)
}

/// Derive a 256-bit AES key from a secret using Argon2id.
fn derive_aes_key(secret: &str, salt: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(secret.as_bytes(), salt, &mut key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key encoding: {0}")]
    KeyEncoding(String),
    #[error("encryption: {0}")]
    Encryption(String),
    #[error("decryption: {0}")]
    Decryption(String),
    #[error("key derivation: {0}")]
    KeyDerivation(String),
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
