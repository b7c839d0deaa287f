//! Node identity.
//!
//! The canonical identity is the SHA-256 fingerprint of the enrollment
//! certificate DER — 32 bytes, never empty for an initialized peer.
//! Callers always receive a fresh copy; mutating it cannot touch the
//! peer's internal value.

use subtle::ConstantTimeEq;
use tally_crypto::pinning;

use crate::error::PeerError;

/// Immutable identity value: fingerprint bytes + the public key bound to
/// them.
#[derive(Debug, Clone)]
pub struct Identity {
    id: [u8; 32],
    public_key_pem: String,
}

impl Identity {
    /// Build an identity from the enrollment certificate PEM and the
    /// node's public key.
    pub fn from_cert_pem(cert_pem: &str, public_key_pem: String) -> Result<Self, PeerError> {
        let parsed = pem::parse(cert_pem)
            .map_err(|e| PeerError::Crypto(format!("certificate unparseable: {e}")))?;
        Ok(Self {
            id: pinning::fingerprint_bytes(parsed.contents()),
            public_key_pem,
        })
    }

    /// The identity bytes, as a fresh copy each call.
    pub fn id(&self) -> Vec<u8> {
        self.id.to_vec()
    }

    /// Compare against caller-supplied identity bytes in constant time.
    pub fn matches(&self, other: &[u8]) -> bool {
        other.len() == self.id.len() && bool::from(self.id.ct_eq(other))
    }

    /// The public key bound to this identity (PEM).
    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }

    /// Hex form for logs.
    pub fn hex(&self) -> String {
        self.id.iter().map(|b| format!("{b:02x}")).collect()
    }
}
