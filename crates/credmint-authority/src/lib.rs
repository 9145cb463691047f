//! Credmint Authority Library
//!
//! The issuing side of credmint: SSH user certificate signing through an
//! external signing backend, single-use bootstrap OTP issuance for users
//! without second factors, and X.509 role certificates for callers that
//! prove their identity with a presigned identity call.

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod crypto;
pub mod delivery;
pub mod http;
pub mod signer;
pub mod state;
pub mod store;
pub mod users;
pub mod verifier;

pub use bootstrap::{BootstrapError, BootstrapIssuer, IssuedBootstrapOtp, SecretHandoff};
pub use config::Config;
pub use crypto::CertificateAuthority;
pub use signer::{CertSigner, SignerError, SigningBackend, SshKeygenBackend};
pub use state::AppState;
pub use store::{LoadedProfile, MemoryProfileStore, ProfileStore, StoreError};
pub use verifier::{AssertionVerifier, StsPresignedUrlVerifier, VerifiedIdentity};
