//! Admin handlers: bootstrap OTPs and user management.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info, warn};

use crate::auth::{authenticated_admin, AuthError, AuthInfo};
use crate::bootstrap::BootstrapError;
use crate::http::responses::{
    error_response, NewBootstrapOtpRequest, NewBootstrapOtpResponse, UserListResponse,
    UsernameRequest,
};
use crate::state::AppState;
use crate::users::UserError;

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<AuthInfo, Response> {
    authenticated_admin(headers, &state.admin_users).map_err(|e| {
        if let AuthError::NotAdmin(user) = &e {
            warn!(username = %user, "Admin endpoint called by non-admin");
        }
        error_response(StatusCode::UNAUTHORIZED, e.to_string())
    })
}

fn bootstrap_error_status(e: &BootstrapError) -> StatusCode {
    match e {
        BootstrapError::InvalidUsername(_)
        | BootstrapError::InvalidDuration(_)
        | BootstrapError::DurationTooLong { .. }
        | BootstrapError::UserNotFound(_) => StatusCode::BAD_REQUEST,
        BootstrapError::AlreadyEnrolled(_) => StatusCode::PRECONDITION_FAILED,
        BootstrapError::ProfileStoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        BootstrapError::Generation(_) | BootstrapError::Delivery(_) | BootstrapError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn user_error_status(e: &UserError) -> StatusCode {
    match e {
        UserError::InvalidUsername(_) | UserError::UserNotFound(_) => StatusCode::BAD_REQUEST,
        UserError::UserExists(_) => StatusCode::CONFLICT,
        UserError::ProfileStoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        UserError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Issue a bootstrap OTP for a user without second factors.
pub async fn new_bootstrap_otp(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<NewBootstrapOtpRequest>,
) -> Response {
    let admin = match require_admin(&state, &headers) {
        Ok(admin) => admin,
        Err(response) => return response,
    };

    match state
        .bootstrap
        .issue(&admin.username, &req.username, req.duration.as_deref())
        .await
    {
        Ok(issued) => {
            let expires_at = issued.otp.expires_at;
            (
                StatusCode::OK,
                Json(NewBootstrapOtpResponse {
                    bootstrap_otp_value: issued.plaintext().map(str::to_string),
                    username: issued.username,
                    expires_at,
                    fingerprint: issued.fingerprint,
                }),
            )
                .into_response()
        }
        Err(e) => {
            let status = bootstrap_error_status(&e);
            if status.is_server_error() {
                error!(username = %req.username, error = %e, "Failed to issue bootstrap OTP");
            } else {
                info!(username = %req.username, error = %e, "Bootstrap OTP request refused");
            }
            error_response(status, e.to_string())
        }
    }
}

/// Add a user with an empty profile.
pub async fn add_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<UsernameRequest>,
) -> Response {
    let admin = match require_admin(&state, &headers) {
        Ok(admin) => admin,
        Err(response) => return response,
    };

    match state.users.add_user(&admin.username, &req.username).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(user_error_status(&e), e.to_string()),
    }
}

/// Delete a user.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<UsernameRequest>,
) -> Response {
    let admin = match require_admin(&state, &headers) {
        Ok(admin) => admin,
        Err(response) => return response,
    };

    match state.users.delete_user(&admin.username, &req.username).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(user_error_status(&e), e.to_string()),
    }
}

/// List known users.
pub async fn list_users(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }

    match state.users.list_users().await {
        Ok(users) => Json(UserListResponse { users }).into_response(),
        Err(e) => error_response(user_error_status(&e), e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handlers::test_support::{admin_headers, body_json, state_with_store};
    use crate::store::{MemoryProfileStore, ProfileStore};
    use credmint_core::{U2fRegistration, UserProfile};

    fn otp_request(username: &str, duration: Option<&str>) -> Json<NewBootstrapOtpRequest> {
        Json(NewBootstrapOtpRequest {
            username: username.to_string(),
            duration: duration.map(str::to_string),
        })
    }

    #[tokio::test]
    async fn test_new_bootstrap_otp() {
        let store = Arc::new(MemoryProfileStore::with_users(["alice"]));
        let state = state_with_store(store.clone());

        let response =
            new_bootstrap_otp(State(state), admin_headers(), otp_request("alice", Some("1h"))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body: NewBootstrapOtpResponse = body_json(response).await;
        assert_eq!(body.username, "alice");
        assert_eq!(body.fingerprint.len(), 8);
        let secret = body.bootstrap_otp_value.unwrap();

        let saved = store.load("alice").await.unwrap().profile.bootstrap_otp.unwrap();
        assert!(saved.matches_secret(&secret));
        assert_eq!(saved.expires_at, body.expires_at);
    }

    #[tokio::test]
    async fn test_new_bootstrap_otp_requires_admin() {
        let state = state_with_store(Arc::new(MemoryProfileStore::with_users(["alice"])));

        let response =
            new_bootstrap_otp(State(state.clone()), HeaderMap::new(), otp_request("alice", None))
                .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        headers.insert(crate::auth::AUTHENTICATED_USER_HEADER, "alice".parse().unwrap());
        let response = new_bootstrap_otp(State(state), headers, otp_request("alice", None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_new_bootstrap_otp_status_codes() {
        let store = Arc::new(MemoryProfileStore::with_users(["alice"]));
        let enrolled = UserProfile {
            u2f_registrations: vec![U2fRegistration {
                name: "key".to_string(),
                registered_at: chrono::Utc::now(),
                enabled: true,
            }],
            ..UserProfile::default()
        };
        store.save("bob", &enrolled).await.unwrap();
        let state = state_with_store(store.clone());

        let response = new_bootstrap_otp(
            State(state.clone()),
            admin_headers(),
            otp_request("ghost", None),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response =
            new_bootstrap_otp(State(state.clone()), admin_headers(), otp_request("bob", None))
                .await;
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);

        let response = new_bootstrap_otp(
            State(state.clone()),
            admin_headers(),
            otp_request("alice", Some("48h")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        store.set_disconnected(true);
        let response =
            new_bootstrap_otp(State(state), admin_headers(), otp_request("alice", None)).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_user_management() {
        let state = state_with_store(Arc::new(MemoryProfileStore::new()));

        let response = add_user(
            State(state.clone()),
            admin_headers(),
            Json(UsernameRequest {
                username: "carol".to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = add_user(
            State(state.clone()),
            admin_headers(),
            Json(UsernameRequest {
                username: "carol".to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = list_users(State(state.clone()), admin_headers()).await;
        let body: UserListResponse = body_json(response).await;
        assert_eq!(body.users, vec!["carol"]);

        let response = delete_user(
            State(state.clone()),
            admin_headers(),
            Json(UsernameRequest {
                username: "carol".to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = list_users(State(state), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
