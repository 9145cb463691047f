//! Role certificate handler.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info, warn};

use crate::crypto::CaError;
use crate::http::responses::{error_response, RoleCertificateRequest, RoleCertificateResponse};
use crate::state::AppState;
use crate::verifier::VerifyError;

/// Role certificate endpoint.
///
/// Verifies the identity assertion out-of-band, then signs the CSR with the
/// verified identity.
pub async fn issue_role_certificate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RoleCertificateRequest>,
) -> Response {
    // Check if CA is configured
    let ca = match &state.ca {
        Some(ca) => ca,
        None => {
            error!("Role certificate requested but CA is not configured");
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Certificate authority not configured",
            );
        }
    };

    let identity = match state.verifier.verify(&req.identity_assertion).await {
        Ok(identity) => identity,
        Err(VerifyError::Transport(msg)) => {
            error!(error = %msg, "Identity provider unreachable");
            return error_response(
                StatusCode::BAD_GATEWAY,
                format!("failed to reach identity provider: {}", msg),
            );
        }
        Err(e) => {
            warn!(
                principal = %req.identity_assertion.principal,
                scope = %req.identity_assertion.capability_scope,
                error = %e,
                "Identity assertion rejected"
            );
            return error_response(StatusCode::FORBIDDEN, e.to_string());
        }
    };

    match ca.sign_role_csr(&req.csr_pem, &identity) {
        Ok(signed) => {
            info!(
                principal = %signed.principal,
                scope = %identity.capability_scope,
                expires_at = %signed.expires_at,
                "Role certificate issued"
            );
            (
                StatusCode::OK,
                Json(RoleCertificateResponse {
                    certificate_pem: signed.cert_pem,
                    expires_at: signed.expires_at,
                }),
            )
                .into_response()
        }
        Err(e @ (CaError::ParseCsr(_) | CaError::InvalidIdentity(_))) => {
            warn!(error = %e, "Rejected role certificate request");
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => {
            error!(error = %e, "Failed to sign role certificate");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
