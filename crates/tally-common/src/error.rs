use serde::{Deserialize, Serialize};

/// Machine-readable error codes for the authority wire protocol.
/// Shared by the HTTP client and both in-process authorities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidName,
    InvalidPayload,
    ParseError,
    BadCredentials,
    AlreadyEnrolled,
    NotEnrolled,
    Unauthorized,
    Unavailable,
    NotFound,
    Conflict,
    IoError,
    Internal,
}

impl ErrorCode {
    /// Suggested HTTP status code for this error.
    /// Transport-agnostic (returns u16, not a framework type).
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidName | Self::InvalidPayload | Self::ParseError => 400,
            Self::BadCredentials => 401,
            Self::Unauthorized => 403,
            Self::NotFound | Self::NotEnrolled => 404,
            Self::AlreadyEnrolled | Self::Conflict => 409,
            Self::Unavailable => 503,
            Self::IoError | Self::Internal => 500,
        }
    }
}
