//! Peer domain error types.

use tally_ca::CaError;

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("not enrolled: no local material for '{0}' — register first")]
    NotEnrolled(String),

    #[error("already enrolled: '{0}' has local material under different credentials")]
    AlreadyEnrolled(String),

    #[error(transparent)]
    Authority(#[from] CaError),

    #[error("signing failed: {0}")]
    Signature(String),

    #[error("signature verification failed: {0}")]
    Verification(String),

    #[error("identity is not known to this peer")]
    UnknownIdentity,

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tally_crypto::CryptoError> for PeerError {
    fn from(e: tally_crypto::CryptoError) -> Self {
        Self::Crypto(e.to_string())
    }
}
