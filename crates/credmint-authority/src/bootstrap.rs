//! Bootstrap OTP issuance.
//!
//! An administrator mints a single-use secret for a user who has no second
//! factor yet. Only the SHA-512 hash and the expiry are stored on the
//! profile. The plaintext is either returned for display or routed to an
//! out-of-band delivery channel, never both.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use credmint_core::{validate_username, BootstrapOtp};

use crate::crypto::generate_bootstrap_secret;
use crate::delivery::{BootstrapOtpNotice, DeliveryError, OtpDelivery};
use crate::store::{ProfileStore, StoreError};

/// Lifetime used when none is requested.
pub const DEFAULT_BOOTSTRAP_OTP_DURATION: Duration = Duration::from_secs(6 * 60 * 60);

/// Shorter requests are raised to this.
pub const MIN_BOOTSTRAP_OTP_DURATION: Duration = Duration::from_secs(60);

/// Longer requests are rejected.
pub const MAX_BOOTSTRAP_OTP_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors that can occur while issuing a bootstrap OTP.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("invalid username '{0}'")]
    InvalidUsername(String),

    #[error("invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("duration {} over {} not allowed", human(.requested), human(.max))]
    DurationTooLong { requested: Duration, max: Duration },

    #[error("profile store unavailable, try again later: {0}")]
    ProfileStoreUnavailable(String),

    #[error("user '{0}' does not exist")]
    UserNotFound(String),

    #[error("user '{0}' already has second factor credentials registered")]
    AlreadyEnrolled(String),

    #[error("failed to generate secret: {0}")]
    Generation(String),

    #[error("failed to deliver bootstrap OTP: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("failed to save profile: {0}")]
    Store(StoreError),
}

/// Parse and clamp a requested duration.
///
/// Absent means the default; below one minute is raised to one minute;
/// above 24 hours is rejected.
pub fn bootstrap_otp_duration(requested: Option<&str>) -> Result<Duration, BootstrapError> {
    let duration = match requested.map(str::trim) {
        None | Some("") => DEFAULT_BOOTSTRAP_OTP_DURATION,
        Some(raw) => humantime::parse_duration(raw)
            .map_err(|_| BootstrapError::InvalidDuration(raw.to_string()))?,
    };
    clamp_bootstrap_otp_duration(duration)
}

/// Apply the floor and ceiling to an already-parsed duration.
pub fn clamp_bootstrap_otp_duration(duration: Duration) -> Result<Duration, BootstrapError> {
    let duration = duration.max(MIN_BOOTSTRAP_OTP_DURATION);
    if duration > MAX_BOOTSTRAP_OTP_DURATION {
        return Err(BootstrapError::DurationTooLong {
            requested: duration,
            max: MAX_BOOTSTRAP_OTP_DURATION,
        });
    }
    Ok(duration)
}

/// How the plaintext secret left the issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretHandoff {
    /// Returned to the caller for display.
    Plaintext(String),

    /// Sent through the delivery channel; only the fingerprint is returned.
    Delivered,
}

/// Outcome of a successful issuance.
#[derive(Debug, Clone)]
pub struct IssuedBootstrapOtp {
    pub username: String,

    /// What was stored on the profile.
    pub otp: BootstrapOtp,

    /// First 4 hash bytes, hex encoded.
    pub fingerprint: String,

    pub issued_at: DateTime<Utc>,

    /// Effective (clamped) duration.
    pub duration: Duration,

    pub handoff: SecretHandoff,
}

impl IssuedBootstrapOtp {
    /// The plaintext secret, when it was not delivered out-of-band.
    pub fn plaintext(&self) -> Option<&str> {
        match &self.handoff {
            SecretHandoff::Plaintext(secret) => Some(secret),
            SecretHandoff::Delivered => None,
        }
    }
}

/// Issues bootstrap OTPs against a profile store.
pub struct BootstrapIssuer {
    store: Arc<dyn ProfileStore>,
    delivery: Option<Arc<dyn OtpDelivery>>,
}

impl BootstrapIssuer {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self {
            store,
            delivery: None,
        }
    }

    /// Route secrets through an out-of-band channel instead of returning them.
    pub fn with_delivery(mut self, delivery: Arc<dyn OtpDelivery>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    /// Whether secrets are delivered out-of-band.
    pub fn delivers_out_of_band(&self) -> bool {
        self.delivery.is_some()
    }

    /// Issue a bootstrap OTP for `username` on behalf of `requested_by`.
    ///
    /// Preconditions are checked in order: store availability, user
    /// existence, then absence of second factors. The profile is saved only
    /// after the secret was generated and, if configured, delivered.
    pub async fn issue(
        &self,
        requested_by: &str,
        username: &str,
        requested_duration: Option<&str>,
    ) -> Result<IssuedBootstrapOtp, BootstrapError> {
        validate_username(username)
            .map_err(|_| BootstrapError::InvalidUsername(username.to_string()))?;
        let duration = bootstrap_otp_duration(requested_duration)?;

        let loaded = self.store.load(username).await.map_err(|e| match e {
            StoreError::Unreachable(msg) => BootstrapError::ProfileStoreUnavailable(msg),
            other => BootstrapError::Store(other),
        })?;
        if loaded.from_cache {
            warn!(username = %username, "Refusing bootstrap OTP while working from cached profiles");
            return Err(BootstrapError::ProfileStoreUnavailable(
                "working in db disconnected mode".to_string(),
            ));
        }
        if !loaded.exists {
            return Err(BootstrapError::UserNotFound(username.to_string()));
        }
        let mut profile = loaded.profile;
        if profile.has_second_factor() {
            return Err(BootstrapError::AlreadyEnrolled(username.to_string()));
        }
        debug!(username = %username, "Profile eligible for bootstrap OTP");

        let secret =
            generate_bootstrap_secret().map_err(|e| BootstrapError::Generation(e.to_string()))?;
        let issued_at = Utc::now();
        let expires_at = issued_at
            + chrono::Duration::from_std(duration)
                .map_err(|e| BootstrapError::InvalidDuration(e.to_string()))?;
        let otp = BootstrapOtp::from_secret(&secret, expires_at);
        let fingerprint = otp.fingerprint();

        let handoff = match &self.delivery {
            None => SecretHandoff::Plaintext(secret),
            Some(delivery) => {
                let notice = BootstrapOtpNotice {
                    target_username: username,
                    requested_by,
                    secret: &secret,
                    fingerprint: &fingerprint,
                    duration,
                    expires_at,
                };
                delivery.deliver(&notice).await?;
                SecretHandoff::Delivered
            }
        };

        profile.bootstrap_otp = Some(otp.clone());
        self.store
            .save(username, &profile)
            .await
            .map_err(|e| match e {
                StoreError::Unreachable(msg) => BootstrapError::ProfileStoreUnavailable(msg),
                other => BootstrapError::Store(other),
            })?;

        info!(
            admin = %requested_by,
            username = %username,
            duration = %humantime::format_duration(duration),
            hash = %hex_prefix(&otp.secret_hash),
            delivered = matches!(handoff, SecretHandoff::Delivered),
            "Generated bootstrap OTP"
        );

        Ok(IssuedBootstrapOtp {
            username: username.to_string(),
            otp,
            fingerprint,
            issued_at,
            duration,
            handoff,
        })
    }
}

fn human(duration: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*duration)
}

fn hex_prefix(hash: &[u8]) -> String {
    hex::encode(&hash[..hash.len().min(8)])
}
