//! HTTP client for remote authority deployments.
//!
//! Uses blocking `ureq` — no async runtime dependency on the peer path.
//! Enrollment routes live under `/v1/ca/`. Errors come back as
//! `{error, message}` JSON bodies carrying the wire `ErrorCode`, which
//! map losslessly onto `CaError`; transport failures become
//! `Unavailable` so callers can apply their own retry policy.

use std::time::Duration;

use crate::authority::{EnrollmentAuthority, TransactionAuthority};
use crate::error::CaError;
use crate::protocol::{EnrollRequest, EnrollmentBundle, IssuedTcert, TcertRequest};

/// TCP connection timeout for authority requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Read timeout for authority requests. Registration includes a key
/// generation on the server side, so this is generous.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking client for a remote ECA/TCA pair.
pub struct HttpCa {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpCa {
    pub fn new(endpoint: &str) -> Self {
        let clean = endpoint.trim_end_matches('/');
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build();
        Self {
            endpoint: clean.to_string(),
            agent,
        }
    }

    fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, CaError> {
        let url = format!("{}{path}", self.endpoint);
        let resp = self.agent.post(&url).send_json(body).map_err(map_error)?;
        resp.into_json()
            .map_err(|e| CaError::Internal(format!("invalid response body: {e}")))
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, CaError> {
        let url = format!("{}{path}", self.endpoint);
        let resp = self.agent.get(&url).call().map_err(map_error)?;
        resp.into_json()
            .map_err(|e| CaError::Internal(format!("invalid response body: {e}")))
    }
}

impl EnrollmentAuthority for HttpCa {
    fn register(&self, request: &EnrollRequest) -> Result<EnrollmentBundle, CaError> {
        let body = serde_json::to_value(request)
            .map_err(|e| CaError::Internal(format!("request serialization: {e}")))?;
        self.post_json("/v1/ca/register", body)
    }
}

impl TransactionAuthority for HttpCa {
    fn issue_certificates(&self, request: &TcertRequest) -> Result<Vec<IssuedTcert>, CaError> {
        let body = serde_json::to_value(request)
            .map_err(|e| CaError::Internal(format!("request serialization: {e}")))?;
        self.post_json("/v1/ca/tcerts", body)
    }

    fn root_public_key_pem(&self) -> Result<String, CaError> {
        let json: serde_json::Value = self.get_json("/v1/ca/tca-root")?;
        json.get("public_key_pem")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| CaError::Internal("missing 'public_key_pem' in response".into()))
    }
}

fn map_error(e: ureq::Error) -> CaError {
    match e {
        ureq::Error::Status(_status, resp) => {
            let body = resp.into_string().unwrap_or_default();
            match serde_json::from_str::<serde_json::Value>(&body) {
                Ok(json) => {
                    let code = json.get("error").and_then(|v| v.as_str()).unwrap_or("");
                    let message = json
                        .get("message")
                        .and_then(|v| v.as_str())
                        .unwrap_or(&body);
                    CaError::from_wire(code, message)
                }
                Err(_) => CaError::Internal(body),
            }
        }
        ureq::Error::Transport(t) => CaError::Unavailable(t.to_string()),
    }
}
