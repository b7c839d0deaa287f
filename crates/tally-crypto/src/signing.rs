//! ECDSA P-256 signing and verification for transaction envelopes and
//! certificate manifests.
//!
//! Authorities sign certificate payloads and peers sign transaction
//! envelopes with the same primitive. Signatures are DER-encoded and
//! verification insists on the low-S form, so a relayed transaction
//! cannot be given a second "valid" signature by S-negation.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;

use crate::keys::NodeKeyPair;

/// Sign arbitrary bytes with a P-256 signing key.
///
/// Returns the DER-encoded signature bytes.
pub fn sign_bytes(key: &NodeKeyPair, data: &[u8]) -> Vec<u8> {
    let sig: Signature = key.signing_key().sign(data);
    // Emit the canonical low-S form so the paired verifier (which rejects
    // high-S as malleable) accepts honest signatures. normalize_s() returns
    // Some only when the signature was high-S.
    let sig = sig.normalize_s().unwrap_or(sig);
    sig.to_der().as_bytes().to_vec()
}

/// Verify a DER-encoded ECDSA P-256 signature against a public key in PEM
/// format.
///
/// Returns `true` only if the signature parses, is in low-S form, and is
/// valid for the given data and key. Malformed DER, truncated or extended
/// encodings, and high-S (malleated) signatures all return `false`.
pub fn verify_signature(public_key_pem: &str, data: &[u8], signature: &[u8]) -> bool {
    let verifying_key = match VerifyingKey::from_public_key_pem(public_key_pem) {
        Ok(k) => k,
        Err(_) => return false,
    };

    let sig = match Signature::from_der(signature) {
        Ok(s) => s,
        Err(_) => return false,
    };

    // normalize_s() returns Some only when the signature was in high-S
    // form — the malleated twin of a valid signature. Reject it.
    if sig.normalize_s().is_some() {
        return false;
    }

    verifying_key.verify(data, &sig).is_ok()
}
