//! Core domain errors.

use thiserror::Error;

/// Core domain errors for credmint.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Certificate bytes could not be parsed.
    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Username contains characters outside the allowed set.
    #[error("Invalid username: '{0}'")]
    InvalidUsername(String),
}
