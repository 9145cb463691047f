//! HTTP server for the authority.
//!
//! Provides endpoints for:
//! - Bootstrap OTP issuance (`/admin/newBootstrapOTP`)
//! - User management (`/admin/addUser`, `/admin/deleteUser`, `/users`)
//! - Role certificates (`/v1/role-cert`)
//! - Health check (`/health`)

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod handlers;
pub mod responses;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Admin routes
        .route("/admin/newBootstrapOTP", post(handlers::new_bootstrap_otp))
        .route("/admin/addUser", post(handlers::add_user))
        .route("/admin/deleteUser", post(handlers::delete_user))
        .route("/users", get(handlers::list_users))
        // Role certificate issuance
        .route("/v1/role-cert", post(handlers::issue_role_certificate))
        // Observability routes
        .route("/health", get(handlers::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
