//! Certificate fingerprinting.
//!
//! The SHA-256 fingerprint of an enrollment certificate's DER encoding is
//! the node's canonical identity, and peers pin the authority roots they
//! received at enrollment by the same fingerprint.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Compute the SHA-256 fingerprint of a DER-encoded certificate as raw
/// bytes. This is the canonical node identity form.
pub fn fingerprint_bytes(cert_der: &[u8]) -> [u8; 32] {
    Sha256::digest(cert_der).into()
}

/// Compute a SHA-256 fingerprint of a DER-encoded certificate.
///
/// Returns the fingerprint as a lowercase hex string.
pub fn fingerprint_sha256(cert_der: &[u8]) -> String {
    hex_encode(&fingerprint_bytes(cert_der))
}

/// Compare two fingerprint strings in constant time.
///
/// Returns `true` if both fingerprints are equal. Uses `subtle::ConstantTimeEq`
/// to prevent timing side-channels.
pub fn fingerprints_match(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    if a_bytes.len() != b_bytes.len() {
        return false;
    }

    a_bytes.ct_eq(b_bytes).into()
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}
