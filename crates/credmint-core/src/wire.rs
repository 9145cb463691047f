//! JSON bodies exchanged between the certificate client and the authority.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::IdentityAssertion;

/// Request body for the role certificate endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleCertificateRequest {
    /// Proof of who the caller is.
    pub identity_assertion: IdentityAssertion,

    /// Certificate Signing Request carrying the caller's public key (PEM).
    pub csr_pem: String,
}

/// Response body for the role certificate endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleCertificateResponse {
    /// Signed certificate (PEM encoded).
    pub certificate_pem: String,

    /// Certificate expiration time.
    pub expires_at: DateTime<Utc>,
}

/// Error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
