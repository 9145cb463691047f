//! HTTP request and response types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use credmint_core::{ErrorResponse, RoleCertificateRequest, RoleCertificateResponse};

// ============================================================================
// Bootstrap OTP types
// ============================================================================

/// Request body for the bootstrap OTP endpoint.
#[derive(Debug, Deserialize)]
pub struct NewBootstrapOtpRequest {
    /// Target user.
    pub username: String,

    /// Requested lifetime (e.g. "6h", "30m"). Defaults to 6 hours.
    #[serde(default)]
    pub duration: Option<String>,
}

/// Response body for the bootstrap OTP endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct NewBootstrapOtpResponse {
    pub username: String,

    pub expires_at: DateTime<Utc>,

    /// First 4 bytes of the secret hash, hex encoded.
    pub fingerprint: String,

    /// Present only when no delivery channel is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_otp_value: Option<String>,
}

// ============================================================================
// User management types
// ============================================================================

/// Request body naming a single user.
#[derive(Debug, Deserialize)]
pub struct UsernameRequest {
    pub username: String,
}

/// Response for the user list.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserListResponse {
    pub users: Vec<String>,
}

// ============================================================================
// Error helper
// ============================================================================

/// Build a JSON error response.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}
