//! Remote issuance clients.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use credmint_core::{
    ErrorResponse, IdentityAssertion, RoleCertificateRequest, RoleCertificateResponse,
};

use crate::error::ManagerError;

/// Default timeout for a single issuance request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Submits an identity assertion and CSR to a certificate authority.
#[async_trait]
pub trait IssuanceClient: Send + Sync {
    /// Returns the signed certificate (PEM).
    async fn request_certificate(
        &self,
        assertion: &IdentityAssertion,
        csr_pem: &str,
    ) -> Result<String, ManagerError>;
}

/// Talks to the authority's `POST /v1/role-cert` endpoint.
pub struct HttpIssuanceClient {
    inner: reqwest::Client,
    endpoint: String,
}

impl HttpIssuanceClient {
    /// Create a client for the authority at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, ManagerError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ManagerError> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ManagerError::RemoteIssuance(e.to_string()))?;
        Ok(Self {
            inner,
            endpoint: format!("{}/v1/role-cert", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl IssuanceClient for HttpIssuanceClient {
    async fn request_certificate(
        &self,
        assertion: &IdentityAssertion,
        csr_pem: &str,
    ) -> Result<String, ManagerError> {
        debug!(url = %self.endpoint, scope = %assertion.capability_scope, "Requesting role certificate");

        let request = RoleCertificateRequest {
            identity_assertion: assertion.clone(),
            csr_pem: csr_pem.to_string(),
        };
        let response = self
            .inner
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| ManagerError::RemoteIssuance(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorResponse>().await {
                Ok(body) => body.error,
                Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
            };
            warn!(status = %status, error = %message, "Authority refused role certificate");
            return Err(ManagerError::RemoteIssuance(format!(
                "HTTP {}: {}",
                status.as_u16(),
                message
            )));
        }

        let body: RoleCertificateResponse = response
            .json()
            .await
            .map_err(|e| ManagerError::RemoteIssuance(format!("unexpected response: {}", e)))?;
        Ok(body.certificate_pem)
    }
}
