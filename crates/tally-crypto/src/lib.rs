//! Tally Crypto — cryptographic primitives for the peer identity core.
//!
//! Provides ECDSA P-256 key management with encryption at rest,
//! DER signing/verification with malleability rejection, AES-256-GCM
//! payload sealing, and certificate fingerprinting.

pub mod keys;
pub mod pinning;
pub mod sealing;
pub mod signing;

pub use keys::CryptoError;
