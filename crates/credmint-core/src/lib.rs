//! Credmint Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Subprocesses or the filesystem
//! - Runtime specifics
//!
//! Both the issuing authority and the certificate client build on these
//! types.

pub mod certificate;
pub mod error;
pub mod identity;
pub mod profile;
pub mod signing;
pub mod wire;

// Re-export commonly used types
pub use certificate::Certificate;
pub use error::CoreError;
pub use identity::IdentityAssertion;
pub use profile::{validate_username, BootstrapOtp, TotpRegistration, U2fRegistration, UserProfile};
pub use signing::{SigningRequest, DEFAULT_SSH_CERT_VALIDITY};
pub use wire::{ErrorResponse, RoleCertificateRequest, RoleCertificateResponse};
