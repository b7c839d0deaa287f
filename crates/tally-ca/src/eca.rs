//! In-process enrollment authority.
//!
//! Creates an ECDSA P-256 root certificate using `rcgen` and issues
//! X.509 enrollment certificates for pre-provisioned node identities.
//! Registration is at-most-once per enrollment id. Used by bootstrap and
//! test harnesses; production deployments talk to a remote authority
//! through `client::HttpCa` instead.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair, KeyUsagePurpose};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tally_crypto::keys::NodeKeyPair;
use tally_crypto::pinning;

use crate::audit;
use crate::error::CaError;
use crate::protocol::{EnrollRequest, EnrollmentBundle};

/// Lifetime of issued enrollment certificates.
const ENROLLMENT_CERT_LIFETIME_DAYS: i64 = 365;

/// Root certificate validity period.
const ROOT_VALIDITY_YEARS: i64 = 10;

/// A node identity recorded at registration time.
///
/// The authority never retains the private key — only the public half and
/// the fingerprint the transaction authority validates against.
#[derive(Debug, Clone)]
pub struct EnrolledRecord {
    pub enrollment_id: String,
    pub fingerprint: String,
    pub public_key_pem: String,
    pub enrolled_at: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

/// In-memory enrollment authority state.
pub struct Eca {
    /// Root key pair (tally-crypto type, zeroized on drop).
    #[allow(dead_code)]
    root_key: NodeKeyPair,
    /// The root's rcgen key for signing operations.
    rcgen_key: KeyPair,
    /// Self-signed root certificate, issuer for member certs.
    root_cert: rcgen::Certificate,
    /// Root certificate in PEM format.
    cert_pem: String,
    /// Pre-provisioned credentials: enrollment id → SHA-256(secret).
    provisioned: Mutex<HashMap<String, [u8; 32]>>,
    /// Registered identities, keyed by enrollment id.
    enrolled: Mutex<HashMap<String, EnrolledRecord>>,
}

impl Eca {
    /// Create a fresh authority with a self-signed root.
    pub fn new() -> Result<Self, CaError> {
        let root_key = NodeKeyPair::generate();
        let key_pem = root_key.private_key_pem();
        let rcgen_key =
            KeyPair::from_pem(&key_pem).map_err(|e| CaError::Certificate(e.to_string()))?;

        let root_params = build_root_params()?;
        let root_cert = root_params
            .self_signed(&rcgen_key)
            .map_err(|e| CaError::Certificate(e.to_string()))?;
        let cert_pem = root_cert.pem();

        tracing::info!("Enrollment authority root created");

        Ok(Self {
            root_key,
            rcgen_key,
            root_cert,
            cert_pem,
            provisioned: Mutex::new(HashMap::new()),
            enrolled: Mutex::new(HashMap::new()),
        })
    }

    /// Pre-provision credentials for a node, replacing any previous secret
    /// for the same id. Registration only succeeds for provisioned ids.
    pub fn provision(&self, enrollment_id: &str, secret: &str) {
        let digest: [u8; 32] = Sha256::digest(secret.as_bytes()).into();
        self.provisioned
            .lock()
            .expect("provisioned table lock poisoned")
            .insert(enrollment_id.to_string(), digest);
    }

    /// Root certificate in PEM format.
    pub fn root_certificate_pem(&self) -> &str {
        &self.cert_pem
    }

    /// Look up an enrolled identity by certificate fingerprint.
    pub fn enrolled_by_fingerprint(&self, fingerprint: &str) -> Option<EnrolledRecord> {
        self.enrolled
            .lock()
            .expect("enrolled table lock poisoned")
            .values()
            .find(|record| pinning::fingerprints_match(&record.fingerprint, fingerprint))
            .cloned()
    }

    /// Register a node: check credentials, issue the enrollment
    /// certificate, record the identity.
    ///
    /// 1. Credentials must match a provisioned record (constant-time).
    /// 2. The enrollment id must not already be registered.
    /// 3. Issue the X.509 certificate and remember its public material.
    pub fn register(&self, request: &EnrollRequest) -> Result<EnrollmentBundle, CaError> {
        if request.enrollment_id.is_empty() {
            return Err(CaError::InvalidRequest("empty enrollment id".into()));
        }

        self.check_credentials(request)?;

        // Issue outside the table lock — only the insert decides the race
        // between two concurrent registrations.
        let (bundle, record) = self.issue_enrollment_certificate(&request.enrollment_id)?;

        {
            let mut enrolled = self.enrolled.lock().expect("enrolled table lock poisoned");
            if enrolled.contains_key(&request.enrollment_id) {
                return Err(CaError::AlreadyEnrolled(request.enrollment_id.clone()));
            }
            enrolled.insert(request.enrollment_id.clone(), record);
        }

        let _ = audit::append_entry(
            "node_enrolled",
            &[
                ("id", &request.enrollment_id),
                ("fingerprint", &bundle.fingerprint),
            ],
        );
        tracing::info!(id = %request.enrollment_id, "Node enrolled");

        Ok(bundle)
    }

    fn check_credentials(&self, request: &EnrollRequest) -> Result<(), CaError> {
        let provisioned = self
            .provisioned
            .lock()
            .expect("provisioned table lock poisoned");

        let expected = provisioned
            .get(&request.enrollment_id)
            .ok_or(CaError::BadCredentials)?;

        let presented: [u8; 32] = Sha256::digest(request.secret.as_bytes()).into();
        if bool::from(presented.ct_eq(expected)) {
            Ok(())
        } else {
            Err(CaError::BadCredentials)
        }
    }

    fn issue_enrollment_certificate(
        &self,
        enrollment_id: &str,
    ) -> Result<(EnrollmentBundle, EnrolledRecord), CaError> {
        // Generate a fresh key pair for the node
        let member_key = KeyPair::generate().map_err(|e| CaError::Certificate(e.to_string()))?;

        let mut cert_params = CertificateParams::default();
        cert_params
            .distinguished_name
            .push(DnType::CommonName, enrollment_id);

        let not_before = Utc::now();
        let not_after = not_before + Duration::days(ENROLLMENT_CERT_LIFETIME_DAYS);
        cert_params.not_before = to_offset_datetime(not_before);
        cert_params.not_after = to_offset_datetime(not_after);

        let member_cert = cert_params
            .signed_by(&member_key, &self.root_cert, &self.rcgen_key)
            .map_err(|e| CaError::Certificate(e.to_string()))?;

        let fingerprint = pinning::fingerprint_sha256(member_cert.der());
        let enrolled_at = not_before;

        let bundle = EnrollmentBundle {
            enrollment_id: enrollment_id.to_string(),
            cert_pem: member_cert.pem(),
            key_pem: member_key.serialize_pem(),
            ca_pem: self.cert_pem.clone(),
            fingerprint: fingerprint.clone(),
            expires: not_after,
        };

        let record = EnrolledRecord {
            enrollment_id: enrollment_id.to_string(),
            fingerprint,
            public_key_pem: member_key.public_key_pem(),
            enrolled_at,
            expires: not_after,
        };

        Ok((bundle, record))
    }
}

impl crate::authority::EnrollmentAuthority for Eca {
    fn register(&self, request: &EnrollRequest) -> Result<EnrollmentBundle, CaError> {
        Eca::register(self, request)
    }
}

/// Build the root's CertificateParams (rcgen 0.13 style: key passed at
/// signing time, not in the params).
fn build_root_params() -> Result<CertificateParams, CaError> {
    let mut params = CertificateParams::default();
    params
        .distinguished_name
        .push(DnType::CommonName, "Tally Enrollment Authority");
    params
        .distinguished_name
        .push(DnType::OrganizationName, "Tally");

    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

    let not_before = Utc::now();
    let not_after = not_before + Duration::days(ROOT_VALIDITY_YEARS * 365);
    params.not_before = to_offset_datetime(not_before);
    params.not_after = to_offset_datetime(not_after);

    Ok(params)
}

fn to_offset_datetime(dt: DateTime<Utc>) -> time::OffsetDateTime {
    time::OffsetDateTime::from_unix_timestamp(dt.timestamp())
        .unwrap_or(time::OffsetDateTime::now_utc())
}
