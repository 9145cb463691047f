//! Cryptographic utilities for bootstrap secrets and role certificates.

mod ca;
mod token;

pub use ca::{CaError, CertificateAuthority, SignedCertificate};
pub use token::{generate_bootstrap_secret, TokenError};
