//! Credmint Client Library
//!
//! Keeps a role certificate fresh for a long-running process:
//! - `CertificateManager` caches the certificate, renews it in the
//!   background and lets concurrent callers share one in-flight refresh.
//! - `IdentityProofProvider` produces the identity assertion the authority
//!   verifies out-of-band.
//! - `HttpIssuanceClient` talks to the authority's role certificate endpoint.
//! - `LocalKey` holds the private key and the CSR sent with every request.

pub mod error;
pub mod issuance;
pub mod keys;
pub mod manager;
pub mod proof;

pub use error::ManagerError;
pub use issuance::{HttpIssuanceClient, IssuanceClient};
pub use keys::LocalKey;
pub use manager::{
    fetch_role_certificate, CertificateManager, ClientCertificateFn, ClientIdentity,
    ManagerConfig, ManagerStatus,
};
pub use proof::{IdentityProofProvider, ProofError};
