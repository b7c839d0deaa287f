//! Authority trait seams.
//!
//! Peers consume two RPC contracts: enrollment (one-time identity
//! registration) and transaction-certificate issuance (per-transaction
//! pseudonymous credentials). Both are expressed as object-safe traits so
//! the registry can hold either the in-process authorities or the HTTP
//! client behind the same `Arc<dyn _>`.

use crate::error::CaError;
use crate::protocol::{EnrollRequest, EnrollmentBundle, IssuedTcert, TcertRequest};

/// The enrollment authority contract: register a node once, receive its
/// long-lived identity credential.
pub trait EnrollmentAuthority: Send + Sync {
    /// Register `enrollment_id` and issue the enrollment bundle.
    ///
    /// At-most-once per id: a repeated registration fails with
    /// `AlreadyEnrolled`; a credential mismatch fails with
    /// `BadCredentials`. Transport failures surface as `Unavailable` and
    /// are retryable by the caller.
    fn register(&self, request: &EnrollRequest) -> Result<EnrollmentBundle, CaError>;
}

/// The transaction authority contract: exchange a valid enrollment
/// credential for a batch of single-use transaction certificates.
pub trait TransactionAuthority: Send + Sync {
    /// Issue `request.count` fresh certificates (`count ≥ 1`).
    ///
    /// Fails with `Unauthorized` when the enrollment certificate is
    /// unknown, expired, or the possession proof does not verify;
    /// `Unavailable` when the authority cannot be reached.
    fn issue_certificates(&self, request: &TcertRequest) -> Result<Vec<IssuedTcert>, CaError>;

    /// The authority's root public key (PEM) — the trust anchor validators
    /// verify transaction certificates against.
    fn root_public_key_pem(&self) -> Result<String, CaError>;
}
