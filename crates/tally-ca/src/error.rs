//! Authority domain error types.

use tally_common::error::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum CaError {
    #[error("bad enrollment credentials")]
    BadCredentials,

    #[error("already enrolled: {0}")]
    AlreadyEnrolled(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("authority unreachable: {0}")]
    Unavailable(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Internal(String),
}

impl From<tally_crypto::CryptoError> for CaError {
    fn from(e: tally_crypto::CryptoError) -> Self {
        Self::Crypto(e.to_string())
    }
}

impl From<&CaError> for ErrorCode {
    fn from(e: &CaError) -> Self {
        match e {
            CaError::BadCredentials => ErrorCode::BadCredentials,
            CaError::AlreadyEnrolled(_) => ErrorCode::AlreadyEnrolled,
            CaError::Unauthorized(_) => ErrorCode::Unauthorized,
            CaError::Unavailable(_) => ErrorCode::Unavailable,
            CaError::InvalidRequest(_) => ErrorCode::InvalidPayload,
            CaError::Crypto(_) | CaError::Certificate(_) => ErrorCode::Internal,
            CaError::Io(_) => ErrorCode::IoError,
            CaError::Internal(_) => ErrorCode::Internal,
        }
    }
}

impl CaError {
    /// Rebuild a typed error from a wire `{error, message}` pair.
    ///
    /// Used by the HTTP client to map authority responses back into the
    /// taxonomy. Unknown codes collapse to `Internal`.
    pub fn from_wire(code: &str, message: &str) -> Self {
        match code {
            "bad_credentials" => CaError::BadCredentials,
            "already_enrolled" => CaError::AlreadyEnrolled(message.to_string()),
            "unauthorized" => CaError::Unauthorized(message.to_string()),
            "unavailable" => CaError::Unavailable(message.to_string()),
            "invalid_payload" => CaError::InvalidRequest(message.to_string()),
            _ => CaError::Internal(format!("{code}: {message}")),
        }
    }
}
