//! Node configuration.
//!
//! A node is a role tag plus a name. The enrollment credentials are
//! derived deterministically from the name — both the node and whoever
//! provisions the enrollment authority compute the same pair, which is
//! the "pre-shared out-of-band secret" used once at registration.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Domain-separation label for the secret derivation. Changing it
/// invalidates every provisioned credential, so it is versioned.
const SECRET_LABEL: &str = "tally/enrollment-secret/v1:";

/// Derived secrets are hex-truncated to this many characters.
const SECRET_LEN: usize = 32;

/// Role of a node in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Validator,
    Client,
}

/// Immutable node configuration: role + name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfiguration {
    node_type: NodeType,
    name: String,
}

impl NodeConfiguration {
    pub fn new(node_type: NodeType, name: impl Into<String>) -> Self {
        Self {
            node_type,
            name: name.into(),
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The enrollment id presented to the authority. The node name is
    /// canonical.
    pub fn enrollment_id(&self) -> &str {
        &self.name
    }

    /// The pre-shared enrollment secret for this node.
    pub fn enrollment_secret(&self) -> String {
        derive_enrollment_secret(&self.name)
    }
}

/// Deterministically derive the enrollment secret for a node name.
///
/// SHA-256 over a versioned, domain-separated label, hex-truncated.
/// `init(name)` re-derives the same value to unwrap stored key material,
/// so no extra input is needed after registration.
pub fn derive_enrollment_secret(name: &str) -> String {
    let digest = Sha256::digest(format!("{SECRET_LABEL}{name}").as_bytes());
    let mut secret = String::with_capacity(SECRET_LEN);
    for b in digest {
        if secret.len() >= SECRET_LEN {
            break;
        }
        secret.push_str(&format!("{b:02x}"));
    }
    secret.truncate(SECRET_LEN);
    secret
}
