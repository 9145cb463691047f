//! Shared fixtures for handler tests.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use serde::de::DeserializeOwned;

use credmint_core::IdentityAssertion;

use crate::auth::AUTHENTICATED_USER_HEADER;
use crate::state::AppState;
use crate::store::ProfileStore;
use crate::verifier::{AssertionVerifier, VerifiedIdentity, VerifyError};

/// Accepts every assertion whose scope matches `accepted_scope`.
pub struct StubVerifier {
    pub accepted_scope: String,
}

#[async_trait]
impl AssertionVerifier for StubVerifier {
    async fn verify(&self, assertion: &IdentityAssertion) -> Result<VerifiedIdentity, VerifyError> {
        if assertion.capability_scope != self.accepted_scope {
            return Err(VerifyError::ScopeMismatch {
                claimed: assertion.capability_scope.clone(),
                actual: self.accepted_scope.clone(),
            });
        }
        Ok(VerifiedIdentity {
            principal: "aws:123456789012:deploy".to_string(),
            capability_scope: assertion.capability_scope.clone(),
        })
    }
}

pub const DEPLOY_ROLE: &str = "arn:aws:iam::123456789012:role/deploy";

pub fn stub_verifier() -> Arc<StubVerifier> {
    Arc::new(StubVerifier {
        accepted_scope: DEPLOY_ROLE.to_string(),
    })
}

pub fn state_with_store(store: Arc<dyn ProfileStore>) -> Arc<AppState> {
    AppState::new(store, stub_verifier(), ["root".to_string()])
}

pub fn admin_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHENTICATED_USER_HEADER, HeaderValue::from_static("root"));
    headers
}

pub async fn body_json<T: DeserializeOwned>(response: Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
