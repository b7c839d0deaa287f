//! Owned peer registry.
//!
//! Replaces process-wide mutable maps with an explicitly owned value:
//! whoever owns peer lifecycle (service bootstrap, test harness)
//! constructs a `PeerRegistry` over a pair of authorities, registers and
//! initializes peers through it, and tears everything down with the
//! `close_all_*` entry points on shutdown.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use subtle::ConstantTimeEq;
use tally_ca::protocol::EnrollRequest;
use tally_ca::{EnrollmentAuthority, TransactionAuthority};

use crate::config::derive_enrollment_secret;
use crate::error::PeerError;
use crate::identity::Identity;
use crate::peer::{ClientPeer, PeerCore, ValidatorPeer};
use crate::store::CertificateStore;
use crate::tx::ConfidentialityLevel;

/// Registry-wide construction options.
pub struct RegistryOptions {
    /// Root for per-node certificate stores; the default data dir when
    /// unset.
    pub data_dir: Option<PathBuf>,
    /// Payload protection applied by clients built from this registry.
    pub confidentiality: ConfidentialityLevel,
    /// Pre-shared chain key for sealing/opening encrypted payloads.
    pub chain_key: Option<[u8; 32]>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            data_dir: None,
            confidentiality: ConfidentialityLevel::Public,
            chain_key: None,
        }
    }
}

/// Owns every initialized peer plus the authority handles they share.
pub struct PeerRegistry {
    eca: Arc<dyn EnrollmentAuthority>,
    tca: Arc<dyn TransactionAuthority>,
    options: RegistryOptions,
    clients: Mutex<HashMap<String, Arc<ClientPeer>>>,
    validators: Mutex<HashMap<String, Arc<ValidatorPeer>>>,
    /// Per-name registration locks: two near-simultaneous registrations
    /// of one node serialize here instead of interleaving store writes.
    enroll_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PeerRegistry {
    pub fn new(
        eca: Arc<dyn EnrollmentAuthority>,
        tca: Arc<dyn TransactionAuthority>,
        options: RegistryOptions,
    ) -> Self {
        Self {
            eca,
            tca,
            options,
            clients: Mutex::new(HashMap::new()),
            validators: Mutex::new(HashMap::new()),
            enroll_locks: Mutex::new(HashMap::new()),
        }
    }

    // ── Registration ────────────────────────────────────────────────

    /// Register a client node with the enrollment authority.
    pub fn register_client(
        &self,
        name: &str,
        enrollment_id: &str,
        enrollment_secret: &str,
    ) -> Result<(), PeerError> {
        self.register_node(name, enrollment_id, enrollment_secret)
    }

    /// Register a validator node with the enrollment authority.
    pub fn register_validator(
        &self,
        name: &str,
        enrollment_id: &str,
        enrollment_secret: &str,
    ) -> Result<(), PeerError> {
        self.register_node(name, enrollment_id, enrollment_secret)
    }

    /// The shared registration path. Role only matters at init time —
    /// the stored material is identical.
    ///
    /// Re-registering an enrolled node with its canonical credentials is
    /// an idempotent no-op; with different credentials it fails with
    /// `AlreadyEnrolled`. Both outcomes are deterministic.
    fn register_node(
        &self,
        name: &str,
        enrollment_id: &str,
        enrollment_secret: &str,
    ) -> Result<(), PeerError> {
        if name.is_empty() {
            return Err(PeerError::InvalidInput("empty node name".into()));
        }

        let lock = self.enroll_lock_for(name);
        let _guard = lock.lock().expect("enrollment lock poisoned");

        let store = self.store_for(name);
        let wrap_secret = derive_enrollment_secret(name);

        if store.is_enrolled() {
            let canonical = enrollment_id == name
                && bool::from(
                    enrollment_secret
                        .as_bytes()
                        .ct_eq(wrap_secret.as_bytes()),
                );
            if canonical && store.load_enrollment(name, &wrap_secret).is_ok() {
                tracing::info!(name, "Node already enrolled — registration is a no-op");
                return Ok(());
            }
            return Err(PeerError::AlreadyEnrolled(name.to_string()));
        }

        let bundle = self.eca.register(&EnrollRequest {
            enrollment_id: enrollment_id.to_string(),
            secret: enrollment_secret.to_string(),
        })?;
        let tca_root = self.tca.root_public_key_pem()?;

        store.save_enrollment(&bundle, &tca_root, &wrap_secret)?;
        tracing::info!(name, fingerprint = %bundle.fingerprint, "Node registered");
        Ok(())
    }

    // ── Initialization ──────────────────────────────────────────────

    /// Bring up a client peer from stored material.
    pub fn init_client(&self, name: &str) -> Result<Arc<ClientPeer>, PeerError> {
        if let Some(peer) = self
            .clients
            .lock()
            .expect("client map lock poisoned")
            .get(name)
        {
            return Ok(Arc::clone(peer));
        }

        let core = self.load_core(name)?;
        let peer = Arc::new(ClientPeer { core });
        self.clients
            .lock()
            .expect("client map lock poisoned")
            .insert(name.to_string(), Arc::clone(&peer));

        tracing::info!(name, "Client peer initialized");
        Ok(peer)
    }

    /// Bring up a validator peer from stored material.
    pub fn init_validator(&self, name: &str) -> Result<Arc<ValidatorPeer>, PeerError> {
        if let Some(peer) = self
            .validators
            .lock()
            .expect("validator map lock poisoned")
            .get(name)
        {
            return Ok(Arc::clone(peer));
        }

        let core = self.load_core(name)?;
        let peer = Arc::new(ValidatorPeer { core });
        self.validators
            .lock()
            .expect("validator map lock poisoned")
            .insert(name.to_string(), Arc::clone(&peer));

        tracing::info!(name, "Validator peer initialized");
        Ok(peer)
    }

    fn load_core(&self, name: &str) -> Result<PeerCore, PeerError> {
        let store = self.store_for(name);
        let material = store.load_enrollment(name, &derive_enrollment_secret(name))?;

        let identity = Identity::from_cert_pem(
            &material.cert_pem,
            material.keypair.public_key_pem(),
        )?;

        Ok(PeerCore {
            name: name.to_string(),
            identity,
            keypair: material.keypair,
            cert_pem: material.cert_pem,
            tca_root_public_key_pem: material.tca_root_public_key_pem,
            tca: Arc::clone(&self.tca),
            confidentiality: self.options.confidentiality,
            chain_key: self.options.chain_key,
        })
    }

    // ── Teardown ────────────────────────────────────────────────────

    /// Release every initialized client peer.
    pub fn close_all_clients(&self) {
        let count = {
            let mut clients = self.clients.lock().expect("client map lock poisoned");
            let count = clients.len();
            clients.clear();
            count
        };
        tracing::info!(count, "All client peers released");
    }

    /// Release every initialized validator peer.
    pub fn close_all_validators(&self) {
        let count = {
            let mut validators = self.validators.lock().expect("validator map lock poisoned");
            let count = validators.len();
            validators.clear();
            count
        };
        tracing::info!(count, "All validator peers released");
    }

    // ── Internals ───────────────────────────────────────────────────

    fn store_for(&self, name: &str) -> CertificateStore {
        match &self.options.data_dir {
            Some(root) => CertificateStore::open_in(root, name),
            None => CertificateStore::open(name),
        }
    }

    fn enroll_lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .enroll_locks
            .lock()
            .expect("enrollment lock table poisoned");
        Arc::clone(
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}
