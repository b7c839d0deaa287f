//! Per-node certificate and key storage.
//!
//! Each enrolled node owns a directory under `<data>/peers/<name>/`:
//! - `cert.pem` — enrollment certificate
//! - `ca.pem` — enrollment authority root certificate
//! - `tca-root.pem` — transaction authority root public key
//! - `key.enc` — enrollment private key, encrypted at rest
//! - `enrollment.json` — enrollment metadata
//!
//! Writes are serialized behind a lock so two near-simultaneous
//! registrations cannot interleave partial state; reads take no lock.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_ca::protocol::EnrollmentBundle;
use tally_common::persist;
use tally_crypto::keys::{self, NodeKeyPair};
use tally_crypto::pinning;

use crate::error::PeerError;

const CERT_FILENAME: &str = "cert.pem";
const CA_FILENAME: &str = "ca.pem";
const TCA_ROOT_FILENAME: &str = "tca-root.pem";
const KEY_FILENAME: &str = "key.enc";
const META_FILENAME: &str = "enrollment.json";

/// Enrollment metadata persisted alongside the certificates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentMeta {
    pub enrollment_id: String,
    pub fingerprint: String,
    pub enrolled_at: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

/// Everything `init` needs to bring a peer up.
pub struct EnrollmentMaterial {
    pub meta: EnrollmentMeta,
    pub cert_pem: String,
    pub ca_pem: String,
    pub tca_root_public_key_pem: String,
    pub keypair: NodeKeyPair,
}

/// Durable per-node key/cert store.
pub struct CertificateStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl CertificateStore {
    /// Open the store for `name` under the default data directory.
    pub fn open(name: &str) -> Self {
        Self::open_in(&tally_common::paths::peers_dir(), name)
    }

    /// Open the store for `name` under a specific root (test harnesses).
    pub fn open_in(root: &Path, name: &str) -> Self {
        Self {
            dir: root.join(name),
            write_lock: Mutex::new(()),
        }
    }

    /// Whether enrollment material exists for this node.
    pub fn is_enrolled(&self) -> bool {
        self.dir.join(KEY_FILENAME).exists()
    }

    /// Persist a fresh enrollment: certificates, encrypted key, metadata.
    pub fn save_enrollment(
        &self,
        bundle: &EnrollmentBundle,
        tca_root_public_key_pem: &str,
        secret: &str,
    ) -> Result<(), PeerError> {
        let _guard = self.write_lock.lock().expect("store write lock poisoned");

        std::fs::create_dir_all(&self.dir)?;

        std::fs::write(self.dir.join(CERT_FILENAME), &bundle.cert_pem)?;
        std::fs::write(self.dir.join(CA_FILENAME), &bundle.ca_pem)?;
        std::fs::write(self.dir.join(TCA_ROOT_FILENAME), tca_root_public_key_pem)?;

        let keypair = NodeKeyPair::from_pkcs8_pem(&bundle.key_pem)?;
        let encrypted = keys::encrypt_key(&keypair, secret)?;
        keys::save_encrypted_key(&self.dir.join(KEY_FILENAME), &encrypted)?;

        let meta = EnrollmentMeta {
            enrollment_id: bundle.enrollment_id.clone(),
            fingerprint: bundle.fingerprint.clone(),
            enrolled_at: Utc::now(),
            expires: bundle.expires,
        };
        persist::write_json_pretty(&self.dir.join(META_FILENAME), &meta)?;

        tracing::info!(
            path = %self.dir.display(),
            id = %bundle.enrollment_id,
            "Enrollment material persisted"
        );
        Ok(())
    }

    /// Load enrollment material, unwrapping the key with `secret`.
    ///
    /// Fails with `NotEnrolled` when no material exists for `name`, and
    /// with a crypto error when the stored certificate does not match the
    /// recorded fingerprint (tampered or partially written store).
    pub fn load_enrollment(&self, name: &str, secret: &str) -> Result<EnrollmentMaterial, PeerError> {
        if !self.is_enrolled() {
            return Err(PeerError::NotEnrolled(name.to_string()));
        }

        let cert_pem = std::fs::read_to_string(self.dir.join(CERT_FILENAME))?;
        let ca_pem = std::fs::read_to_string(self.dir.join(CA_FILENAME))?;
        let tca_root_public_key_pem =
            std::fs::read_to_string(self.dir.join(TCA_ROOT_FILENAME))?;
        let meta: EnrollmentMeta = persist::read_json(&self.dir.join(META_FILENAME))?;

        let parsed = pem::parse(&cert_pem)
            .map_err(|e| PeerError::Crypto(format!("stored certificate unparseable: {e}")))?;
        let fingerprint = pinning::fingerprint_sha256(parsed.contents());
        if !pinning::fingerprints_match(&fingerprint, &meta.fingerprint) {
            return Err(PeerError::Crypto(
                "stored certificate does not match recorded fingerprint".into(),
            ));
        }

        let encrypted = keys::load_encrypted_key(&self.dir.join(KEY_FILENAME))?;
        let keypair = keys::decrypt_key(&encrypted, secret)?;

        Ok(EnrollmentMaterial {
            meta,
            cert_pem,
            ca_pem,
            tca_root_public_key_pem,
            keypair,
        })
    }
}
