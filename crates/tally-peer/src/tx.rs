//! Transaction model.
//!
//! A transaction is a chaincode deploy or invoke: a serialized spec
//! (optionally confidentiality-protected), a fresh transaction
//! certificate, and a signature over the whole envelope by the
//! certificate's ephemeral key. Transactions are never mutated after
//! signing — any field change invalidates the signature.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_ca::protocol::TransactionCertificate;

/// Implementation language of a chaincode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChaincodeLanguage {
    Golang,
    Java,
}

/// Identifies a chaincode by location and version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodeId {
    pub url: String,
    pub version: String,
}

/// What to run and how to call it.
///
/// `ctor_msg` may legitimately be absent — placeholder and test specs
/// deploy with no constructor arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChaincodeSpec {
    pub language: ChaincodeLanguage,
    pub chaincode_id: ChaincodeId,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ctor_msg: Option<Vec<u8>>,
}

/// A chaincode deployment: spec plus optional code package.
///
/// `code_package` may be absent for placeholder deployments whose code
/// is distributed out of band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    pub chaincode_spec: ChaincodeSpec,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub effective_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub code_package: Option<Vec<u8>>,
}

/// A chaincode invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationSpec {
    pub chaincode_spec: ChaincodeSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deploy,
    Invoke,
}

impl TransactionKind {
    fn tag(&self) -> &'static [u8] {
        match self {
            Self::Deploy => b"deploy",
            Self::Invoke => b"invoke",
        }
    }
}

/// Payload protection applied at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidentialityLevel {
    Public,
    Encrypted,
}

impl ConfidentialityLevel {
    fn tag(&self) -> &'static [u8] {
        match self {
            Self::Public => b"public",
            Self::Encrypted => b"encrypted",
        }
    }
}

/// A signed chaincode transaction, created by a client and consumed
/// read-only by validators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub kind: TransactionKind,
    pub uuid: String,
    pub confidentiality: ConfidentialityLevel,
    /// Serialized spec — sealed-box JSON when `confidentiality` is
    /// `Encrypted`, plain spec JSON otherwise.
    pub payload: Vec<u8>,
    pub certificate: TransactionCertificate,
    /// DER signature over `envelope_bytes()` by the certificate's
    /// ephemeral key.
    pub signature: Vec<u8>,
}

impl Transaction {
    /// The canonical envelope: every signed field, length-prefixed so no
    /// two distinct transactions serialize identically.
    pub fn envelope_bytes(
        kind: TransactionKind,
        uuid: &str,
        confidentiality: ConfidentialityLevel,
        payload: &[u8],
        certificate: &TransactionCertificate,
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        for field in [
            kind.tag(),
            uuid.as_bytes(),
            confidentiality.tag(),
            payload,
            certificate.payload_json.as_bytes(),
            &certificate.signature,
        ] {
            buf.extend_from_slice(&(field.len() as u64).to_be_bytes());
            buf.extend_from_slice(field);
        }
        buf
    }

    /// The envelope this transaction's signature covers.
    pub fn signed_envelope(&self) -> Vec<u8> {
        Self::envelope_bytes(
            self.kind,
            &self.uuid,
            self.confidentiality,
            &self.payload,
            &self.certificate,
        )
    }
}
