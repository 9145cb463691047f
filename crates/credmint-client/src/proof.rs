//! Identity proof providers.

use async_trait::async_trait;
use thiserror::Error;

use credmint_core::IdentityAssertion;

/// Failure to produce an identity assertion.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ProofError(pub String);

/// Produces bounded-lifetime identity assertions (e.g. a presigned cloud
/// provider identity call) for a single issuance attempt each.
#[async_trait]
pub trait IdentityProofProvider: Send + Sync {
    async fn identity_assertion(&self) -> Result<IdentityAssertion, ProofError>;
}
