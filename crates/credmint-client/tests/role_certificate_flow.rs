//! End-to-end: certificate manager against a running authority.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::net::TcpListener;

use credmint_authority::verifier::VerifyError;
use credmint_authority::{
    AppState, AssertionVerifier, CertificateAuthority, MemoryProfileStore, VerifiedIdentity,
};
use credmint_client::{
    fetch_role_certificate, CertificateManager, HttpIssuanceClient, IdentityProofProvider,
    LocalKey, ManagerConfig, ManagerError, ProofError,
};
use credmint_core::IdentityAssertion;

const DEPLOY_ROLE: &str = "arn:aws:iam::123456789012:role/deploy";

/// Trusts whatever role the proof bytes name.
struct ProofNamesRole;

#[async_trait]
impl AssertionVerifier for ProofNamesRole {
    async fn verify(&self, assertion: &IdentityAssertion) -> Result<VerifiedIdentity, VerifyError> {
        if assertion.proof != assertion.capability_scope.as_bytes() {
            return Err(VerifyError::ScopeMismatch {
                claimed: assertion.capability_scope.clone(),
                actual: String::from_utf8_lossy(&assertion.proof).into_owned(),
            });
        }
        Ok(VerifiedIdentity {
            principal: "aws:123456789012:deploy".to_string(),
            capability_scope: assertion.capability_scope.clone(),
        })
    }
}

struct FixedProof {
    scope: String,
    proof: String,
}

#[async_trait]
impl IdentityProofProvider for FixedProof {
    async fn identity_assertion(&self) -> Result<IdentityAssertion, ProofError> {
        Ok(IdentityAssertion::new(
            "i-0abc",
            self.scope.clone(),
            self.proof.as_bytes().to_vec(),
            Utc::now() + chrono::Duration::minutes(5),
        ))
    }
}

async fn start_authority() -> String {
    let ca = CertificateAuthority::generate("Test Role CA", Duration::from_secs(3600)).unwrap();
    let state = AppState::builder(
        Arc::new(MemoryProfileStore::new()),
        Arc::new(ProofNamesRole),
        Vec::new(),
    )
    .with_ca(ca)
    .build();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, credmint_authority::http::create_router(state))
            .await
            .unwrap();
    });

    format!("http://{}", addr)
}

#[tokio::test]
async fn test_manager_obtains_role_certificate() {
    let base_url = start_authority().await;
    let proof = Arc::new(FixedProof {
        scope: DEPLOY_ROLE.to_string(),
        proof: DEPLOY_ROLE.to_string(),
    });
    let issuer = Arc::new(HttpIssuanceClient::new(&base_url).unwrap());
    let manager = CertificateManager::new(ManagerConfig::default(), proof, issuer).unwrap();

    let cert = manager.get_certificate().await.unwrap();
    assert_eq!(cert.subject_identity(), "aws:123456789012:deploy");
    assert_eq!(cert.lifetime(), chrono::Duration::seconds(3600));

    // Served from cache the second time
    assert_eq!(manager.get_certificate().await.unwrap(), cert);

    let identity = (manager.client_certificate_adapter())().await.unwrap();
    assert_eq!(identity.cert_pem, cert.raw());
}

#[tokio::test]
async fn test_rejected_assertion_surfaces_remote_error() {
    let base_url = start_authority().await;
    let proof = FixedProof {
        scope: DEPLOY_ROLE.to_string(),
        proof: "arn:aws:iam::123456789012:role/other".to_string(),
    };
    let issuer = HttpIssuanceClient::new(&base_url).unwrap();
    let key = LocalKey::generate("client").unwrap();

    match fetch_role_certificate(&proof, &issuer, &key).await {
        Err(ManagerError::RemoteIssuance(message)) => {
            assert!(message.starts_with("HTTP 403"), "{}", message);
        }
        other => panic!("expected remote issuance error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_authority() {
    let proof = FixedProof {
        scope: DEPLOY_ROLE.to_string(),
        proof: DEPLOY_ROLE.to_string(),
    };
    let issuer =
        HttpIssuanceClient::with_timeout("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
    let key = LocalKey::generate("client").unwrap();

    let result = fetch_role_certificate(&proof, &issuer, &key).await;
    assert!(matches!(result, Err(ManagerError::RemoteIssuance(_))));
}
