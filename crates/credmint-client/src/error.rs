//! Error types for the certificate client.

use thiserror::Error;

/// Errors surfaced by the certificate manager.
///
/// `Clone` so one refresh outcome can be handed to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ManagerError {
    /// The identity proof provider could not produce an assertion.
    #[error("identity proof unavailable: {0}")]
    IdentityProofUnavailable(String),

    /// The authority refused or could not be reached.
    #[error("remote issuance failed: {0}")]
    RemoteIssuance(String),

    /// The authority answered with something unusable.
    #[error("issued certificate is expired or invalid: {0}")]
    CertificateExpiredOrInvalid(String),

    /// Local key or CSR generation failed.
    #[error("failed to generate key material: {0}")]
    KeyGeneration(String),

    #[error("certificate manager has been shut down")]
    Shutdown,
}
