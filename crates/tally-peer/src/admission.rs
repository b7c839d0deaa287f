//! Validator-side admission pipeline.
//!
//! Two stages run in order on every inbound transaction before it may
//! reach consensus or execution:
//!
//! 1. **Pre-validation** — structural/cryptographic gate: required fields
//!    present, transaction certificate chains to the trusted transaction
//!    authority root, envelope signature verifies.
//! 2. **Pre-execution** — semantic gate: open confidentiality-protected
//!    payloads, parse and sanity-check the chaincode spec, hand back the
//!    parsed form ready for execution.
//!
//! Both stages are stateless and idempotent: re-running either on the
//! same transaction yields the same classification, and calls for
//! different transactions may run concurrently. Malformed or hostile
//! input produces a typed error, never a panic. Recoverable oddities
//! ride along as warnings inside the `Ok` value.

use chrono::Utc;
use tally_ca::protocol::TcertPayload;
use tally_crypto::sealing::{self, SealedBox};
use tally_crypto::signing;

use crate::tx::{
    ConfidentialityLevel, DeploymentSpec, InvocationSpec, Transaction, TransactionKind,
};

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("malformed transaction: {0}")]
    Malformed(String),

    #[error("transaction certificate not trusted: {0}")]
    UntrustedCertificate(String),

    #[error("transaction certificate outside its validity window")]
    CertificateExpired,

    #[error("transaction signature does not verify")]
    SignatureInvalid,

    #[error("confidentiality failure: {0}")]
    Confidentiality(String),
}

/// Outcome of pre-validation: the verified certificate payload plus any
/// non-fatal warnings.
#[derive(Debug)]
pub struct PreValidated {
    pub certificate: TcertPayload,
    pub warnings: Vec<String>,
}

/// Outcome of pre-execution: the parsed spec ready for hand-off.
#[derive(Debug)]
pub struct PreExecuted {
    pub spec: AdmittedSpec,
    pub warnings: Vec<String>,
}

/// The transaction's parsed payload, by kind.
#[derive(Debug)]
pub enum AdmittedSpec {
    Deploy(DeploymentSpec),
    Invoke(InvocationSpec),
}

/// Structural and cryptographic admission gate.
pub fn pre_validation(
    tx: &Transaction,
    tca_root_public_key_pem: &str,
) -> Result<PreValidated, AdmissionError> {
    let mut warnings = Vec::new();

    if tx.uuid.is_empty() {
        return Err(AdmissionError::Malformed("empty transaction uuid".into()));
    }
    if tx.signature.is_empty() {
        return Err(AdmissionError::Malformed("missing signature".into()));
    }
    if tx.payload.is_empty() {
        // A placeholder transaction is processable, but worth flagging.
        warnings.push("empty payload".to_string());
    }

    let certificate = tx
        .certificate
        .payload()
        .map_err(|e| AdmissionError::Malformed(e.to_string()))?;

    if !tx.certificate.verify(tca_root_public_key_pem) {
        return Err(AdmissionError::UntrustedCertificate(
            "authority signature mismatch".into(),
        ));
    }

    let now = Utc::now();
    if now < certificate.not_before || now > certificate.not_after {
        return Err(AdmissionError::CertificateExpired);
    }

    if !signing::verify_signature(
        &certificate.public_key_pem,
        &tx.signed_envelope(),
        &tx.signature,
    ) {
        return Err(AdmissionError::SignatureInvalid);
    }

    Ok(PreValidated {
        certificate,
        warnings,
    })
}

/// Semantic admission gate — run only on transactions that passed
/// pre-validation.
pub fn pre_execution(
    tx: &Transaction,
    chain_key: Option<&[u8; 32]>,
) -> Result<PreExecuted, AdmissionError> {
    let mut warnings = Vec::new();

    let plaintext = match tx.confidentiality {
        ConfidentialityLevel::Public => tx.payload.clone(),
        ConfidentialityLevel::Encrypted => {
            let key = chain_key.ok_or_else(|| {
                AdmissionError::Confidentiality(
                    "no chain key configured for this validator".into(),
                )
            })?;
            let sealed: SealedBox = serde_json::from_slice(&tx.payload).map_err(|e| {
                AdmissionError::Confidentiality(format!("payload is not a sealed box: {e}"))
            })?;
            sealing::open(key, &sealed)
                .map_err(|e| AdmissionError::Confidentiality(e.to_string()))?
        }
    };

    let spec = match tx.kind {
        TransactionKind::Deploy => {
            let spec: DeploymentSpec = serde_json::from_slice(&plaintext)
                .map_err(|e| AdmissionError::Malformed(format!("deployment spec: {e}")))?;
            check_chaincode_id(&spec.chaincode_spec, &mut warnings)?;
            AdmittedSpec::Deploy(spec)
        }
        TransactionKind::Invoke => {
            let spec: InvocationSpec = serde_json::from_slice(&plaintext)
                .map_err(|e| AdmissionError::Malformed(format!("invocation spec: {e}")))?;
            check_chaincode_id(&spec.chaincode_spec, &mut warnings)?;
            AdmittedSpec::Invoke(spec)
        }
    };

    Ok(PreExecuted { spec, warnings })
}

/// A chaincode id must name its target; an absent constructor message or
/// version string is placeholder-legitimate.
fn check_chaincode_id(
    spec: &crate::tx::ChaincodeSpec,
    warnings: &mut Vec<String>,
) -> Result<(), AdmissionError> {
    if spec.chaincode_id.url.is_empty() {
        return Err(AdmissionError::Malformed("empty chaincode url".into()));
    }
    if spec.chaincode_id.version.is_empty() {
        warnings.push("chaincode version not set".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::{ChaincodeId, ChaincodeLanguage, ChaincodeSpec};
    use chrono::Duration;
    use tally_ca::protocol::TransactionCertificate;
    use tally_crypto::keys::NodeKeyPair;

    /// A self-contained signing setup: a stand-in authority root and one
    /// issued certificate, no CA machinery required.
    struct TestRoot {
        root: NodeKeyPair,
    }

    struct TestCert {
        certificate: TransactionCertificate,
        key: NodeKeyPair,
    }

    impl TestRoot {
        fn new() -> Self {
            Self {
                root: NodeKeyPair::generate(),
            }
        }

        fn root_pem(&self) -> String {
            self.root.public_key_pem()
        }

        fn issue(&self, hours_ago: i64, hours_ahead: i64) -> TestCert {
            let key = NodeKeyPair::generate();
            let payload = TcertPayload {
                serial: "0011223344556677".to_string(),
                public_key_pem: key.public_key_pem(),
                not_before: Utc::now() - Duration::hours(hours_ago),
                not_after: Utc::now() + Duration::hours(hours_ahead),
                binding: sealing::seal(&sealing::generate_key(), b"fp").unwrap(),
            };
            let payload_json = serde_json::to_string(&payload).unwrap();
            let signature = signing::sign_bytes(&self.root, payload_json.as_bytes());
            TestCert {
                certificate: TransactionCertificate {
                    payload_json,
                    signature,
                },
                key,
            }
        }
    }

    fn invoke_spec() -> InvocationSpec {
        InvocationSpec {
            chaincode_spec: ChaincodeSpec {
                language: ChaincodeLanguage::Golang,
                chaincode_id: ChaincodeId {
                    url: "Contract001".to_string(),
                    version: "0.0.1".to_string(),
                },
                ctor_msg: None,
            },
        }
    }

    fn signed_tx(cert: &TestCert, kind: TransactionKind, payload: Vec<u8>) -> Transaction {
        let envelope = Transaction::envelope_bytes(
            kind,
            "uuid",
            ConfidentialityLevel::Public,
            &payload,
            &cert.certificate,
        );
        Transaction {
            kind,
            uuid: "uuid".to_string(),
            confidentiality: ConfidentialityLevel::Public,
            payload,
            certificate: cert.certificate.clone(),
            signature: signing::sign_bytes(&cert.key, &envelope),
        }
    }

    fn valid_invoke(root: &TestRoot) -> Transaction {
        let cert = root.issue(1, 23);
        signed_tx(
            &cert,
            TransactionKind::Invoke,
            serde_json::to_vec(&invoke_spec()).unwrap(),
        )
    }

    #[test]
    fn valid_transaction_passes_pre_validation() {
        let root = TestRoot::new();
        let tx = valid_invoke(&root);

        let result = pre_validation(&tx, &root.root_pem()).unwrap();
        assert!(result.warnings.is_empty());
        assert!(result.certificate.public_key_pem.contains("PUBLIC KEY"));
    }

    #[test]
    fn pre_validation_is_idempotent() {
        let root = TestRoot::new();
        let tx = valid_invoke(&root);

        for _ in 0..3 {
            assert!(pre_validation(&tx, &root.root_pem()).is_ok());
        }
    }

    #[test]
    fn empty_uuid_is_malformed() {
        let root = TestRoot::new();
        let mut tx = valid_invoke(&root);
        tx.uuid = String::new();

        let result = pre_validation(&tx, &root.root_pem());
        assert!(matches!(result, Err(AdmissionError::Malformed(_))));
    }

    #[test]
    fn missing_signature_is_malformed() {
        let root = TestRoot::new();
        let mut tx = valid_invoke(&root);
        tx.signature = Vec::new();

        let result = pre_validation(&tx, &root.root_pem());
        assert!(matches!(result, Err(AdmissionError::Malformed(_))));
    }

    #[test]
    fn empty_payload_is_a_warning_not_an_error() {
        let root = TestRoot::new();
        let cert = root.issue(1, 23);
        let tx = signed_tx(&cert, TransactionKind::Invoke, Vec::new());

        let result = pre_validation(&tx, &root.root_pem()).unwrap();
        assert_eq!(result.warnings, vec!["empty payload"]);
    }

    #[test]
    fn certificate_from_unknown_root_is_untrusted() {
        let root = TestRoot::new();
        let other = TestRoot::new();
        let tx = valid_invoke(&other);

        let result = pre_validation(&tx, &root.root_pem());
        assert!(matches!(result, Err(AdmissionError::UntrustedCertificate(_))));
    }

    #[test]
    fn expired_certificate_is_rejected() {
        let root = TestRoot::new();
        let cert = root.issue(48, -24); // expired a day ago
        let tx = signed_tx(
            &cert,
            TransactionKind::Invoke,
            serde_json::to_vec(&invoke_spec()).unwrap(),
        );

        let result = pre_validation(&tx, &root.root_pem());
        assert!(matches!(result, Err(AdmissionError::CertificateExpired)));
    }

    #[test]
    fn not_yet_valid_certificate_is_rejected() {
        let root = TestRoot::new();
        let cert = root.issue(-1, 24); // valid starting an hour from now
        let tx = signed_tx(
            &cert,
            TransactionKind::Invoke,
            serde_json::to_vec(&invoke_spec()).unwrap(),
        );

        let result = pre_validation(&tx, &root.root_pem());
        assert!(matches!(result, Err(AdmissionError::CertificateExpired)));
    }

    #[test]
    fn tampered_payload_invalidates_signature() {
        let root = TestRoot::new();
        let mut tx = valid_invoke(&root);
        tx.payload[0] ^= 0xFF;

        let result = pre_validation(&tx, &root.root_pem());
        assert!(matches!(result, Err(AdmissionError::SignatureInvalid)));
    }

    #[test]
    fn swapped_certificate_invalidates_signature() {
        let root = TestRoot::new();
        let mut tx = valid_invoke(&root);
        // A different, equally valid certificate from the same root — but
        // not the one the envelope was signed under.
        tx.certificate = root.issue(1, 23).certificate;

        let result = pre_validation(&tx, &root.root_pem());
        assert!(matches!(result, Err(AdmissionError::SignatureInvalid)));
    }

    #[test]
    fn garbage_certificate_payload_is_malformed_not_a_panic() {
        let root = TestRoot::new();
        let mut tx = valid_invoke(&root);
        tx.certificate.payload_json = "\u{0}\u{1}not json".to_string();

        let result = pre_validation(&tx, &root.root_pem());
        assert!(matches!(result, Err(AdmissionError::Malformed(_))));
    }

    #[test]
    fn pre_execution_parses_invoke_spec() {
        let root = TestRoot::new();
        let tx = valid_invoke(&root);

        let result = pre_execution(&tx, None).unwrap();
        assert!(result.warnings.is_empty());
        match result.spec {
            AdmittedSpec::Invoke(spec) => {
                assert_eq!(spec.chaincode_spec.chaincode_id.url, "Contract001");
            }
            other => panic!("expected invoke spec, got {other:?}"),
        }
    }

    #[test]
    fn pre_execution_parses_deploy_with_absent_options() {
        let root = TestRoot::new();
        let cert = root.issue(1, 23);
        let deploy = DeploymentSpec {
            chaincode_spec: invoke_spec().chaincode_spec,
            effective_date: None,
            code_package: None,
        };
        let tx = signed_tx(
            &cert,
            TransactionKind::Deploy,
            serde_json::to_vec(&deploy).unwrap(),
        );

        let result = pre_execution(&tx, None).unwrap();
        match result.spec {
            AdmittedSpec::Deploy(spec) => {
                assert!(spec.code_package.is_none());
                assert!(spec.chaincode_spec.ctor_msg.is_none());
            }
            other => panic!("expected deploy spec, got {other:?}"),
        }
    }

    #[test]
    fn pre_execution_is_idempotent() {
        let root = TestRoot::new();
        let tx = valid_invoke(&root);

        for _ in 0..3 {
            assert!(pre_execution(&tx, None).is_ok());
        }
    }

    #[test]
    fn unparseable_spec_is_malformed() {
        let root = TestRoot::new();
        let cert = root.issue(1, 23);
        let tx = signed_tx(&cert, TransactionKind::Invoke, b"not a spec".to_vec());

        let result = pre_execution(&tx, None);
        assert!(matches!(result, Err(AdmissionError::Malformed(_))));
    }

    #[test]
    fn empty_chaincode_url_is_malformed() {
        let root = TestRoot::new();
        let cert = root.issue(1, 23);
        let mut spec = invoke_spec();
        spec.chaincode_spec.chaincode_id.url = String::new();
        let tx = signed_tx(
            &cert,
            TransactionKind::Invoke,
            serde_json::to_vec(&spec).unwrap(),
        );

        let result = pre_execution(&tx, None);
        assert!(matches!(result, Err(AdmissionError::Malformed(_))));
    }

    #[test]
    fn empty_version_is_a_warning() {
        let root = TestRoot::new();
        let cert = root.issue(1, 23);
        let mut spec = invoke_spec();
        spec.chaincode_spec.chaincode_id.version = String::new();
        let tx = signed_tx(
            &cert,
            TransactionKind::Invoke,
            serde_json::to_vec(&spec).unwrap(),
        );

        let result = pre_execution(&tx, None).unwrap();
        assert_eq!(result.warnings, vec!["chaincode version not set"]);
    }

    #[test]
    fn encrypted_payload_opens_with_chain_key() {
        let root = TestRoot::new();
        let cert = root.issue(1, 23);
        let chain_key = sealing::generate_key();

        let plain = serde_json::to_vec(&invoke_spec()).unwrap();
        let sealed = sealing::seal(&chain_key, &plain).unwrap();
        let payload = serde_json::to_vec(&sealed).unwrap();

        let envelope = Transaction::envelope_bytes(
            TransactionKind::Invoke,
            "uuid",
            ConfidentialityLevel::Encrypted,
            &payload,
            &cert.certificate,
        );
        let tx = Transaction {
            kind: TransactionKind::Invoke,
            uuid: "uuid".to_string(),
            confidentiality: ConfidentialityLevel::Encrypted,
            payload,
            certificate: cert.certificate.clone(),
            signature: signing::sign_bytes(&cert.key, &envelope),
        };

        // With the key the spec opens and parses.
        let result = pre_execution(&tx, Some(&chain_key)).unwrap();
        assert!(matches!(result.spec, AdmittedSpec::Invoke(_)));

        // Without a key the stage reports a confidentiality failure.
        let result = pre_execution(&tx, None);
        assert!(matches!(result, Err(AdmissionError::Confidentiality(_))));

        // With the wrong key, likewise.
        let wrong = sealing::generate_key();
        let result = pre_execution(&tx, Some(&wrong));
        assert!(matches!(result, Err(AdmissionError::Confidentiality(_))));
    }
}
