//! Tally CA — the authority contract consumed by peers.
//!
//! Defines the wire and credential types for enrollment and
//! transaction-certificate issuance, the `EnrollmentAuthority` /
//! `TransactionAuthority` seams, in-process reference authorities for
//! bootstrap and test harnesses, and a blocking HTTP client for remote
//! authority deployments.

pub mod audit;
pub mod authority;
pub mod client;
pub mod eca;
pub mod error;
pub mod protocol;
pub mod tca;

pub use authority::{EnrollmentAuthority, TransactionAuthority};
pub use error::CaError;
