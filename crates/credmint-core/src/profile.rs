//! User profiles and bootstrap one-time passwords.
//!
//! The profile itself is persisted by an external store; this module only
//! defines its shape and the invariants on the bootstrap secret it carries.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::error::CoreError;

static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\-_.]+$").expect("username regex is valid"));

/// Check that a username only uses `[A-Za-z0-9-_.]`.
pub fn validate_username(username: &str) -> Result<(), CoreError> {
    if USERNAME_REGEX.is_match(username) {
        Ok(())
    } else {
        Err(CoreError::InvalidUsername(username.to_string()))
    }
}

/// A registered U2F security key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct U2fRegistration {
    pub name: String,
    pub registered_at: DateTime<Utc>,
    pub enabled: bool,
}

/// A registered TOTP authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotpRegistration {
    pub name: String,
    pub registered_at: DateTime<Utc>,
    pub enabled: bool,
}

/// Per-user profile as kept by the profile store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Registered U2F keys.
    #[serde(default)]
    pub u2f_registrations: Vec<U2fRegistration>,

    /// Registered TOTP authenticators.
    #[serde(default)]
    pub totp_registrations: Vec<TotpRegistration>,

    /// Outstanding bootstrap OTP, if one was issued.
    #[serde(default)]
    pub bootstrap_otp: Option<BootstrapOtp>,
}

impl UserProfile {
    /// Number of second-factor credentials of any kind.
    pub fn second_factor_count(&self) -> usize {
        self.u2f_registrations.len() + self.totp_registrations.len()
    }

    /// Whether the user already enrolled any second factor.
    pub fn has_second_factor(&self) -> bool {
        self.second_factor_count() > 0
    }
}

/// A single-use enrollment secret.
///
/// Only the SHA-512 hash of the secret is stored. The plaintext exists in
/// memory at issuance time and nowhere else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapOtp {
    /// SHA-512 of the plaintext secret.
    pub secret_hash: Vec<u8>,

    /// Permanently invalid from this instant on.
    pub expires_at: DateTime<Utc>,
}

impl BootstrapOtp {
    /// Hash a plaintext secret for storage.
    pub fn from_secret(secret: &str, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret_hash: hash_secret(secret),
            expires_at,
        }
    }

    /// Short verification fingerprint: the first 4 hash bytes, hex encoded.
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.secret_hash[..self.secret_hash.len().min(4)])
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Compare a candidate secret against the stored hash in constant time.
    pub fn matches_secret(&self, candidate: &str) -> bool {
        let candidate_hash = hash_secret(candidate);
        if candidate_hash.len() != self.secret_hash.len() {
            return false;
        }
        candidate_hash
            .iter()
            .zip(self.secret_hash.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// SHA-512 of a secret.
pub fn hash_secret(secret: &str) -> Vec<u8> {
    Sha512::digest(secret.as_bytes()).to_vec()
}
