//! Role-polymorphic peers.
//!
//! Every peer carries the same identity capability: a canonical id,
//! enrollment-key signing, and verification of its own signatures. On top
//! of that, a `ClientPeer` builds signed chaincode transactions and a
//! `ValidatorPeer` runs the admission pipeline. Roles are composed at
//! construction — there is no inheritance, just a shared core.

use std::sync::Arc;

use tally_ca::protocol::{IssuedTcert, TcertRequest};
use tally_ca::TransactionAuthority;
use tally_common::id;
use tally_crypto::keys::NodeKeyPair;
use tally_crypto::sealing;
use tally_crypto::signing;

use crate::admission::{self, AdmissionError, PreExecuted, PreValidated};
use crate::error::PeerError;
use crate::identity::Identity;
use crate::tx::{
    ConfidentialityLevel, DeploymentSpec, InvocationSpec, Transaction, TransactionKind,
};

/// The identity capability every peer exposes.
pub trait Peer: Send + Sync {
    /// The canonical node id — a fresh copy each call, never empty for an
    /// initialized peer.
    fn id(&self) -> Vec<u8>;

    /// Sign a message with the enrollment key.
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, PeerError>;

    /// Verify a signature over `message` under the public key bound to
    /// `id`. A peer can vouch only for its own identity — any other id
    /// fails with `UnknownIdentity`.
    fn verify(&self, id: &[u8], signature: &[u8], message: &[u8]) -> Result<(), PeerError>;
}

/// State shared by both roles.
pub(crate) struct PeerCore {
    pub(crate) name: String,
    pub(crate) identity: Identity,
    pub(crate) keypair: NodeKeyPair,
    pub(crate) cert_pem: String,
    pub(crate) tca_root_public_key_pem: String,
    pub(crate) tca: Arc<dyn TransactionAuthority>,
    pub(crate) confidentiality: ConfidentialityLevel,
    pub(crate) chain_key: Option<[u8; 32]>,
}

impl PeerCore {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, PeerError> {
        Ok(signing::sign_bytes(&self.keypair, message))
    }

    fn verify(&self, id: &[u8], signature: &[u8], message: &[u8]) -> Result<(), PeerError> {
        if !self.identity.matches(id) {
            return Err(PeerError::UnknownIdentity);
        }
        if signing::verify_signature(self.identity.public_key_pem(), message, signature) {
            Ok(())
        } else {
            Err(PeerError::Verification(
                "signature does not match message".into(),
            ))
        }
    }

    /// Obtain one fresh transaction certificate from the authority,
    /// proving possession of the enrollment key.
    fn fresh_tcert(&self) -> Result<IssuedTcert, PeerError> {
        let nonce = id::generate_short_id();
        let signed = TcertRequest::signable_bytes(&self.cert_pem, 1, &nonce);
        let request = TcertRequest {
            enrollment_cert_pem: self.cert_pem.clone(),
            count: 1,
            nonce,
            signature: signing::sign_bytes(&self.keypair, &signed),
        };

        let mut issued = self.tca.issue_certificates(&request)?;
        issued.pop().ok_or_else(|| {
            PeerError::Authority(tally_ca::CaError::Internal(
                "authority returned an empty batch".into(),
            ))
        })
    }

    /// Build, protect, and sign a transaction envelope.
    ///
    /// No state is shared between calls — each obtains an independent
    /// certificate, so concurrent builders never collide.
    fn build_transaction(
        &self,
        kind: TransactionKind,
        plain_payload: Vec<u8>,
        uuid: &str,
    ) -> Result<Transaction, PeerError> {
        if uuid.is_empty() {
            return Err(PeerError::InvalidInput("empty transaction uuid".into()));
        }

        let tcert = self.fresh_tcert()?;

        let payload = match self.confidentiality {
            ConfidentialityLevel::Public => plain_payload,
            ConfidentialityLevel::Encrypted => {
                let key = self.chain_key.as_ref().ok_or_else(|| {
                    PeerError::InvalidInput(
                        "encrypted confidentiality requires a chain key".into(),
                    )
                })?;
                let sealed = sealing::seal(key, &plain_payload)
                    .map_err(|e| PeerError::Crypto(e.to_string()))?;
                serde_json::to_vec(&sealed)
                    .map_err(|e| PeerError::Crypto(format!("sealed payload encoding: {e}")))?
            }
        };

        let envelope = Transaction::envelope_bytes(
            kind,
            uuid,
            self.confidentiality,
            &payload,
            &tcert.certificate,
        );

        let tx_key = NodeKeyPair::from_pkcs8_pem(&tcert.key_pem)
            .map_err(|e| PeerError::Signature(format!("certificate key unusable: {e}")))?;
        let signature = signing::sign_bytes(&tx_key, &envelope);

        tracing::debug!(peer = %self.name, uuid, ?kind, "Transaction built");

        Ok(Transaction {
            kind,
            uuid: uuid.to_string(),
            confidentiality: self.confidentiality,
            payload,
            certificate: tcert.certificate,
            signature,
        })
    }
}

// ── Client role ─────────────────────────────────────────────────────

/// A client peer: identity plus transaction construction.
pub struct ClientPeer {
    pub(crate) core: PeerCore,
}

impl ClientPeer {
    /// The node name this peer was initialized as.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Build a signed chaincode-deploy transaction.
    ///
    /// `spec` sub-fields may legitimately be absent (no constructor
    /// message, no code package); `uuid` must be non-empty and unique —
    /// uniqueness is the caller's responsibility.
    pub fn new_chaincode_deploy_transaction(
        &self,
        spec: &DeploymentSpec,
        uuid: &str,
    ) -> Result<Transaction, PeerError> {
        let payload = serde_json::to_vec(spec)
            .map_err(|e| PeerError::InvalidInput(format!("deployment spec: {e}")))?;
        self.core
            .build_transaction(TransactionKind::Deploy, payload, uuid)
    }

    /// Build a signed chaincode-invoke transaction.
    pub fn new_chaincode_execute(
        &self,
        spec: &InvocationSpec,
        uuid: &str,
    ) -> Result<Transaction, PeerError> {
        let payload = serde_json::to_vec(spec)
            .map_err(|e| PeerError::InvalidInput(format!("invocation spec: {e}")))?;
        self.core
            .build_transaction(TransactionKind::Invoke, payload, uuid)
    }
}

impl Peer for ClientPeer {
    fn id(&self) -> Vec<u8> {
        self.core.identity.id()
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, PeerError> {
        self.core.sign(message)
    }

    fn verify(&self, id: &[u8], signature: &[u8], message: &[u8]) -> Result<(), PeerError> {
        self.core.verify(id, signature, message)
    }
}

// ── Validator role ──────────────────────────────────────────────────

/// A validator peer: identity plus the admission pipeline.
pub struct ValidatorPeer {
    pub(crate) core: PeerCore,
}

impl ValidatorPeer {
    /// The node name this peer was initialized as.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Stage one: structural/cryptographic admission gate.
    pub fn transaction_pre_validation(
        &self,
        tx: &Transaction,
    ) -> Result<PreValidated, AdmissionError> {
        admission::pre_validation(tx, &self.core.tca_root_public_key_pem)
    }

    /// Stage two: semantic admission gate, for transactions that passed
    /// pre-validation.
    pub fn transaction_pre_execution(
        &self,
        tx: &Transaction,
    ) -> Result<PreExecuted, AdmissionError> {
        admission::pre_execution(tx, self.core.chain_key.as_ref())
    }
}

impl Peer for ValidatorPeer {
    fn id(&self) -> Vec<u8> {
        self.core.identity.id()
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, PeerError> {
        self.core.sign(message)
    }

    fn verify(&self, id: &[u8], signature: &[u8], message: &[u8]) -> Result<(), PeerError> {
        self.core.verify(id, signature, message)
    }
}
