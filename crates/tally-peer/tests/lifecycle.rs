//! End-to-end lifecycle suite: enrollment, identity, signing,
//! transaction construction, and the admission pipeline against
//! in-process authorities.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tally_ca::eca::Eca;
use tally_ca::tca::Tca;
use tally_common::id::generate_tx_uuid;
use tally_peer::config::{derive_enrollment_secret, NodeConfiguration, NodeType};
use tally_peer::tx::{
    ChaincodeId, ChaincodeLanguage, ChaincodeSpec, ConfidentialityLevel, DeploymentSpec,
    InvocationSpec,
};
use tally_peer::{Peer, PeerError, PeerRegistry, RegistryOptions};

struct Harness {
    registry: PeerRegistry,
    eca: Arc<Eca>,
    dir: PathBuf,
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn temp_dir(label: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("tally-lifecycle-{label}-{nanos}"))
}

/// Fresh authorities + registry with the given nodes provisioned.
fn harness(label: &str, names: &[&str], options: RegistryOptions) -> Harness {
    // Keep authority audit logs out of the real data dir.
    tally_common::test::ensure_data_dir("tally-lifecycle-tests");

    let dir = temp_dir(label);
    let eca = Arc::new(Eca::new().unwrap());
    for name in names {
        eca.provision(name, &derive_enrollment_secret(name));
    }
    let tca = Arc::new(Tca::new(Arc::clone(&eca)));

    let registry = PeerRegistry::new(
        Arc::clone(&eca) as Arc<dyn tally_ca::EnrollmentAuthority>,
        tca,
        RegistryOptions {
            data_dir: Some(dir.clone()),
            ..options
        },
    );

    Harness { registry, eca, dir }
}

fn register(registry: &PeerRegistry, conf: &NodeConfiguration) -> Result<(), PeerError> {
    match conf.node_type() {
        NodeType::Validator => registry.register_validator(
            conf.name(),
            conf.enrollment_id(),
            &conf.enrollment_secret(),
        ),
        NodeType::Client => registry.register_client(
            conf.name(),
            conf.enrollment_id(),
            &conf.enrollment_secret(),
        ),
    }
}

fn contract_spec() -> ChaincodeSpec {
    ChaincodeSpec {
        language: ChaincodeLanguage::Golang,
        chaincode_id: ChaincodeId {
            url: "Contract001".to_string(),
            version: "0.0.1".to_string(),
        },
        ctor_msg: None,
    }
}

fn deploy_spec() -> DeploymentSpec {
    DeploymentSpec {
        chaincode_spec: contract_spec(),
        effective_date: None,
        code_package: None,
    }
}

fn invoke_spec() -> InvocationSpec {
    InvocationSpec {
        chaincode_spec: contract_spec(),
    }
}

// ── Enrollment lifecycle ────────────────────────────────────────────

#[test]
fn register_and_init_validator() {
    let h = harness("reg-init", &["validator"], RegistryOptions::default());
    let conf = NodeConfiguration::new(NodeType::Validator, "validator");

    register(&h.registry, &conf).unwrap();

    // A second registration with identical credentials is a no-op.
    register(&h.registry, &conf).unwrap();

    let validator = h.registry.init_validator("validator").unwrap();

    // Registration remains callable after init (mirrors a restart path).
    register(&h.registry, &conf).unwrap();

    let id = validator.id();
    assert!(!id.is_empty());
    assert_eq!(id.len(), 32);
}

#[test]
fn id_copies_are_isolated() {
    let h = harness("id-copy", &["validator"], RegistryOptions::default());
    let conf = NodeConfiguration::new(NodeType::Validator, "validator");
    register(&h.registry, &conf).unwrap();
    let validator = h.registry.init_validator("validator").unwrap();

    let mut id = validator.id();
    id[0] = id[0].wrapping_add(1);

    let id2 = validator.id();
    assert_ne!(id2[0], id[0], "mutating a returned id must not stick");
}

#[test]
fn init_without_register_fails() {
    let h = harness("no-register", &["user4"], RegistryOptions::default());
    let result = h.registry.init_client("user4");
    assert!(matches!(result, Err(PeerError::NotEnrolled(_))));
}

#[test]
fn bad_credentials_abort_registration() {
    let h = harness("bad-creds", &["user4"], RegistryOptions::default());
    let result = h.registry.register_client("user4", "user4", "not-the-secret");
    assert!(matches!(
        result,
        Err(PeerError::Authority(tally_ca::CaError::BadCredentials))
    ));
}

// ── Signing ─────────────────────────────────────────────────────────

#[test]
fn sign_and_verify_hello_world() {
    let h = harness(
        "sign-verify",
        &["validator", "user4"],
        RegistryOptions::default(),
    );
    register(
        &h.registry,
        &NodeConfiguration::new(NodeType::Validator, "validator"),
    )
    .unwrap();
    register(&h.registry, &NodeConfiguration::new(NodeType::Client, "user4")).unwrap();

    let validator = h.registry.init_validator("validator").unwrap();
    let deployer = h.registry.init_client("user4").unwrap();

    let msg = b"Hello World!!!";
    let signature = validator.sign(msg).unwrap();

    validator.verify(&validator.id(), &signature, msg).unwrap();

    // A different message fails.
    let result = validator.verify(&validator.id(), &signature, b"Hello World???");
    assert!(matches!(result, Err(PeerError::Verification(_))));

    // A different signature fails.
    let other_sig = validator.sign(b"something else").unwrap();
    let result = validator.verify(&validator.id(), &other_sig, msg);
    assert!(matches!(result, Err(PeerError::Verification(_))));

    // A different identity fails.
    let result = validator.verify(&deployer.id(), &signature, msg);
    assert!(matches!(result, Err(PeerError::UnknownIdentity)));
}

// ── Transaction construction ────────────────────────────────────────

#[test]
fn new_chaincode_deploy_transaction() {
    let h = harness("deploy-tx", &["user4"], RegistryOptions::default());
    register(&h.registry, &NodeConfiguration::new(NodeType::Client, "user4")).unwrap();
    let deployer = h.registry.init_client("user4").unwrap();

    let uuid = generate_tx_uuid();
    let tx = deployer
        .new_chaincode_deploy_transaction(&deploy_spec(), &uuid)
        .unwrap();

    assert_eq!(tx.uuid, uuid);
    assert!(!tx.signature.is_empty());
    assert!(!tx.certificate.payload_json.is_empty());
}

#[test]
fn new_chaincode_invoke_transaction() {
    let h = harness("invoke-tx", &["user5"], RegistryOptions::default());
    register(&h.registry, &NodeConfiguration::new(NodeType::Client, "user5")).unwrap();
    let invoker = h.registry.init_client("user5").unwrap();

    let uuid = generate_tx_uuid();
    let tx = invoker.new_chaincode_execute(&invoke_spec(), &uuid).unwrap();

    assert_eq!(tx.uuid, uuid);
    assert!(!tx.signature.is_empty());
}

#[test]
fn empty_uuid_is_rejected() {
    let h = harness("empty-uuid", &["user4"], RegistryOptions::default());
    register(&h.registry, &NodeConfiguration::new(NodeType::Client, "user4")).unwrap();
    let deployer = h.registry.init_client("user4").unwrap();

    let result = deployer.new_chaincode_deploy_transaction(&deploy_spec(), "");
    assert!(matches!(result, Err(PeerError::InvalidInput(_))));
}

#[test]
fn concurrent_invokes_get_independent_certificates() {
    let h = harness("concurrent", &["user5", "validator"], RegistryOptions::default());
    register(&h.registry, &NodeConfiguration::new(NodeType::Client, "user5")).unwrap();
    register(
        &h.registry,
        &NodeConfiguration::new(NodeType::Validator, "validator"),
    )
    .unwrap();

    let invoker = h.registry.init_client("user5").unwrap();
    let validator = h.registry.init_validator("validator").unwrap();

    let mut handles = Vec::new();
    for _ in 0..24 {
        let invoker = Arc::clone(&invoker);
        handles.push(std::thread::spawn(move || {
            let uuid = generate_tx_uuid();
            invoker.new_chaincode_execute(&invoke_spec(), &uuid)
        }));
    }

    let txs: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap().unwrap())
        .collect();
    assert_eq!(txs.len(), 24);

    let mut uuids = std::collections::HashSet::new();
    let mut serials = std::collections::HashSet::new();
    for tx in &txs {
        uuids.insert(tx.uuid.clone());
        let payload = tx.certificate.payload().unwrap();
        serials.insert(payload.serial);

        // Every transaction carries an individually valid proof.
        validator.transaction_pre_validation(tx).unwrap();
    }
    assert_eq!(uuids.len(), 24, "uuids must be unique");
    assert_eq!(serials.len(), 24, "certificates must be unique per call");
}

// ── Admission pipeline ──────────────────────────────────────────────

#[test]
fn deploy_transaction_pre_validation_and_pre_execution() {
    let h = harness("deploy-admit", &["user4", "validator"], RegistryOptions::default());
    register(&h.registry, &NodeConfiguration::new(NodeType::Client, "user4")).unwrap();
    register(
        &h.registry,
        &NodeConfiguration::new(NodeType::Validator, "validator"),
    )
    .unwrap();

    let deployer = h.registry.init_client("user4").unwrap();
    let validator = h.registry.init_validator("validator").unwrap();

    let tx = deployer
        .new_chaincode_deploy_transaction(&deploy_spec(), &generate_tx_uuid())
        .unwrap();

    let validated = validator.transaction_pre_validation(&tx).unwrap();
    assert!(validated.warnings.is_empty());

    let executed = validator.transaction_pre_execution(&tx).unwrap();
    match executed.spec {
        tally_peer::admission::AdmittedSpec::Deploy(spec) => {
            assert_eq!(spec.chaincode_spec.chaincode_id.url, "Contract001");
            assert_eq!(spec.chaincode_spec.chaincode_id.version, "0.0.1");
            assert!(spec.chaincode_spec.ctor_msg.is_none());
            assert!(spec.code_package.is_none());
        }
        other => panic!("expected deploy spec, got {other:?}"),
    }
}

#[test]
fn invoke_transaction_pre_validation_and_pre_execution() {
    let h = harness("invoke-admit", &["user5", "validator"], RegistryOptions::default());
    register(&h.registry, &NodeConfiguration::new(NodeType::Client, "user5")).unwrap();
    register(
        &h.registry,
        &NodeConfiguration::new(NodeType::Validator, "validator"),
    )
    .unwrap();

    let invoker = h.registry.init_client("user5").unwrap();
    let validator = h.registry.init_validator("validator").unwrap();

    let tx = invoker
        .new_chaincode_execute(&invoke_spec(), &generate_tx_uuid())
        .unwrap();

    validator.transaction_pre_validation(&tx).unwrap();

    let executed = validator.transaction_pre_execution(&tx).unwrap();
    assert!(matches!(
        executed.spec,
        tally_peer::admission::AdmittedSpec::Invoke(_)
    ));
}

#[test]
fn tampered_transaction_is_rejected() {
    let h = harness("tamper", &["user5", "validator"], RegistryOptions::default());
    register(&h.registry, &NodeConfiguration::new(NodeType::Client, "user5")).unwrap();
    register(
        &h.registry,
        &NodeConfiguration::new(NodeType::Validator, "validator"),
    )
    .unwrap();

    let invoker = h.registry.init_client("user5").unwrap();
    let validator = h.registry.init_validator("validator").unwrap();

    let mut tx = invoker
        .new_chaincode_execute(&invoke_spec(), &generate_tx_uuid())
        .unwrap();
    tx.payload[0] ^= 0xFF;

    let result = validator.transaction_pre_validation(&tx);
    assert!(matches!(
        result,
        Err(tally_peer::admission::AdmissionError::SignatureInvalid)
    ));
}

#[test]
fn foreign_authority_certificate_is_rejected() {
    let h = harness("foreign", &["user5", "validator"], RegistryOptions::default());
    register(&h.registry, &NodeConfiguration::new(NodeType::Client, "user5")).unwrap();
    register(
        &h.registry,
        &NodeConfiguration::new(NodeType::Validator, "validator"),
    )
    .unwrap();
    let validator = h.registry.init_validator("validator").unwrap();

    // A parallel universe with its own authorities and a client that
    // builds a perfectly well-formed transaction there.
    let foreign = harness("foreign-other", &["user5"], RegistryOptions::default());
    register(&foreign.registry, &NodeConfiguration::new(NodeType::Client, "user5")).unwrap();
    let outsider = foreign.registry.init_client("user5").unwrap();
    let tx = outsider
        .new_chaincode_execute(&invoke_spec(), &generate_tx_uuid())
        .unwrap();

    let result = validator.transaction_pre_validation(&tx);
    assert!(matches!(
        result,
        Err(tally_peer::admission::AdmissionError::UntrustedCertificate(_))
    ));
}

// ── Confidentiality ─────────────────────────────────────────────────

#[test]
fn encrypted_payload_round_trips_through_pre_execution() {
    let chain_key = fresh_chain_key();

    let h = harness(
        "encrypted",
        &["user5", "validator"],
        RegistryOptions {
            data_dir: None,
            confidentiality: ConfidentialityLevel::Encrypted,
            chain_key: Some(chain_key),
        },
    );
    register(&h.registry, &NodeConfiguration::new(NodeType::Client, "user5")).unwrap();
    register(
        &h.registry,
        &NodeConfiguration::new(NodeType::Validator, "validator"),
    )
    .unwrap();

    let invoker = h.registry.init_client("user5").unwrap();
    let validator = h.registry.init_validator("validator").unwrap();

    let tx = invoker
        .new_chaincode_execute(&invoke_spec(), &generate_tx_uuid())
        .unwrap();
    assert_eq!(tx.confidentiality, ConfidentialityLevel::Encrypted);

    // The sealed payload is opaque — no spec fields in the clear.
    assert!(!String::from_utf8_lossy(&tx.payload).contains("Contract001"));

    validator.transaction_pre_validation(&tx).unwrap();
    let executed = validator.transaction_pre_execution(&tx).unwrap();
    assert!(matches!(
        executed.spec,
        tally_peer::admission::AdmittedSpec::Invoke(_)
    ));

    // A validator in the same network but without the chain key cannot
    // pre-execute the transaction.
    let blind = PeerRegistry::new(
        Arc::clone(&h.eca) as Arc<dyn tally_ca::EnrollmentAuthority>,
        blind_tca(&h),
        RegistryOptions {
            data_dir: Some(h.dir.clone()),
            ..RegistryOptions::default()
        },
    );
    let blind_validator = blind.init_validator("validator").unwrap();
    let result = blind_validator.transaction_pre_execution(&tx);
    assert!(matches!(
        result,
        Err(tally_peer::admission::AdmissionError::Confidentiality(_))
    ));
}

fn fresh_chain_key() -> [u8; 32] {
    tally_crypto::sealing::generate_key()
}

fn blind_tca(h: &Harness) -> Arc<Tca> {
    Arc::new(Tca::new(Arc::clone(&h.eca)))
}

// ── Teardown ────────────────────────────────────────────────────────

#[test]
fn close_all_releases_peers_and_allows_reinit() {
    let h = harness("teardown", &["user4", "validator"], RegistryOptions::default());
    register(&h.registry, &NodeConfiguration::new(NodeType::Client, "user4")).unwrap();
    register(
        &h.registry,
        &NodeConfiguration::new(NodeType::Validator, "validator"),
    )
    .unwrap();

    let client = h.registry.init_client("user4").unwrap();
    h.registry.init_validator("validator").unwrap();

    h.registry.close_all_clients();
    h.registry.close_all_validators();

    // Stored material survives teardown — only in-memory peers go away.
    let reopened = h.registry.init_client("user4").unwrap();
    assert!(!Arc::ptr_eq(&client, &reopened));
    assert_eq!(reopened.id(), client.id());
}
