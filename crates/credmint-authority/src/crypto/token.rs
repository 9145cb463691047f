//! Bootstrap secret generation.
//!
//! Bootstrap secrets are single-use, time-limited values that let a user
//! without any second factor enroll their first one. Only the SHA-512 hash
//! is ever stored (see `credmint_core::BootstrapOtp`).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// Number of random bytes in a bootstrap secret.
const SECRET_BYTES: usize = 32;

#[derive(Debug, Error)]
#[error("failed to generate random secret: {0}")]
pub struct TokenError(String);

/// Generate a new plaintext bootstrap secret.
///
/// 256 bits from the OS RNG, URL-safe base64 without padding.
pub fn generate_bootstrap_secret() -> Result<String, TokenError> {
    let mut secret_bytes = [0u8; SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut secret_bytes)
        .map_err(|e| TokenError(e.to_string()))?;

    Ok(URL_SAFE_NO_PAD.encode(secret_bytes))
}
