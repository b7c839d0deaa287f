//! In-process transaction authority.
//!
//! Exchanges a valid enrollment credential for batches of single-use
//! transaction certificates. Certificates are detached-signature
//! manifests over ephemeral P-256 keys: unlinkable to the enrollment
//! identity by outside observers, traceable by this authority through
//! the sealed binding.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use tally_crypto::keys::NodeKeyPair;
use tally_crypto::pinning;
use tally_crypto::sealing;
use tally_crypto::signing;

use crate::audit;
use crate::eca::Eca;
use crate::error::CaError;
use crate::protocol::{IssuedTcert, TcertPayload, TcertRequest, TransactionCertificate};

/// Lifetime of issued transaction certificates.
const TCERT_LIFETIME_HOURS: i64 = 24;

/// Serial length in bytes (rendered as 2× hex chars).
const SERIAL_LEN: usize = 8;

/// In-memory transaction authority state.
///
/// Built over the enrollment authority — only identities the ECA has
/// registered can obtain transaction certificates.
pub struct Tca {
    eca: Arc<Eca>,
    /// Root signing key; its public half is the validators' trust anchor.
    root_key: NodeKeyPair,
    root_public_pem: String,
    /// Seals enrollment identities into certificate bindings. Never
    /// leaves the authority.
    trace_key: [u8; 32],
}

impl Tca {
    /// Create a transaction authority bound to an enrollment authority.
    pub fn new(eca: Arc<Eca>) -> Self {
        let root_key = NodeKeyPair::generate();
        let root_public_pem = root_key.public_key_pem();

        tracing::info!("Transaction authority root created");

        Self {
            eca,
            root_key,
            root_public_pem,
            trace_key: sealing::generate_key(),
        }
    }

    /// The root public key (PEM) validators verify certificates against.
    pub fn root_public_key_pem(&self) -> &str {
        &self.root_public_pem
    }

    /// Issue a batch of transaction certificates.
    ///
    /// The requester proves possession of an enrolled identity: the
    /// presented certificate must fingerprint to a registered record that
    /// has not expired, and the request signature must verify under the
    /// recorded public key.
    pub fn issue(&self, request: &TcertRequest) -> Result<Vec<IssuedTcert>, CaError> {
        if request.count == 0 {
            return Err(CaError::InvalidRequest(
                "certificate count must be at least 1".into(),
            ));
        }

        let parsed = pem::parse(&request.enrollment_cert_pem)
            .map_err(|e| CaError::Unauthorized(format!("unparseable enrollment cert: {e}")))?;
        let fingerprint = pinning::fingerprint_sha256(parsed.contents());

        let record = self
            .eca
            .enrolled_by_fingerprint(&fingerprint)
            .ok_or_else(|| CaError::Unauthorized("enrollment certificate not recognized".into()))?;

        if record.expires <= Utc::now() {
            return Err(CaError::Unauthorized("enrollment certificate expired".into()));
        }

        let signed = TcertRequest::signable_bytes(
            &request.enrollment_cert_pem,
            request.count,
            &request.nonce,
        );
        if !signing::verify_signature(&record.public_key_pem, &signed, &request.signature) {
            return Err(CaError::Unauthorized("possession proof failed".into()));
        }

        let mut issued = Vec::with_capacity(request.count);
        for _ in 0..request.count {
            issued.push(self.mint(&fingerprint)?);
        }

        let count = issued.len().to_string();
        let _ = audit::append_entry(
            "tcerts_issued",
            &[("id", &record.enrollment_id), ("count", &count)],
        );
        tracing::debug!(id = %record.enrollment_id, count = issued.len(), "Transaction certificates issued");

        Ok(issued)
    }

    /// Recover the enrollment fingerprint a certificate was issued to.
    ///
    /// Authority-side only: the binding is sealed under the trace key, so
    /// no other party can make this link.
    pub fn trace(&self, certificate: &TransactionCertificate) -> Result<String, CaError> {
        let payload = certificate.payload()?;
        let opened = sealing::open(&self.trace_key, &payload.binding)
            .map_err(|e| CaError::Crypto(e.to_string()))?;
        String::from_utf8(opened)
            .map_err(|_| CaError::Certificate("binding is not a fingerprint".into()))
    }

    fn mint(&self, enrollment_fingerprint: &str) -> Result<IssuedTcert, CaError> {
        let ephemeral = NodeKeyPair::generate();

        let not_before = Utc::now();
        let payload = TcertPayload {
            serial: random_serial(),
            public_key_pem: ephemeral.public_key_pem(),
            not_before,
            not_after: not_before + Duration::hours(TCERT_LIFETIME_HOURS),
            binding: sealing::seal(&self.trace_key, enrollment_fingerprint.as_bytes())
                .map_err(|e| CaError::Crypto(e.to_string()))?,
        };

        let payload_json = serde_json::to_string(&payload)
            .map_err(|e| CaError::Internal(format!("payload serialization: {e}")))?;
        let signature = signing::sign_bytes(&self.root_key, payload_json.as_bytes());

        Ok(IssuedTcert {
            certificate: TransactionCertificate {
                payload_json,
                signature,
            },
            key_pem: ephemeral.private_key_pem().to_string(),
        })
    }
}

impl crate::authority::TransactionAuthority for Tca {
    fn issue_certificates(&self, request: &TcertRequest) -> Result<Vec<IssuedTcert>, CaError> {
        self.issue(request)
    }

    fn root_public_key_pem(&self) -> Result<String, CaError> {
        Ok(self.root_public_pem.clone())
    }
}

/// Random serial, not time-ordered — certificates minted in one batch
/// must not be correlatable by serial.
fn random_serial() -> String {
    let mut bytes = [0u8; SERIAL_LEN];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
