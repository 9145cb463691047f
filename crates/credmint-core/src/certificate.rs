//! Issued certificate value type.
//!
//! A `Certificate` is immutable once issued. It carries the encoded bytes
//! (an SSH certificate line or an X.509 PEM block) together with the parsed
//! validity window, so consumers never have to re-parse to decide freshness.

use std::time::Duration;

use chrono::{DateTime, Utc};
use x509_parser::prelude::*;

use crate::error::CoreError;

/// A signed, time-bounded certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// Encoded certificate (PEM or SSH certificate text).
    raw: Vec<u8>,

    /// Start of the validity window.
    not_before: DateTime<Utc>,

    /// End of the validity window.
    not_after: DateTime<Utc>,

    /// Identity the certificate was issued to.
    subject_identity: String,
}

impl Certificate {
    /// Create a certificate from already-known validity bounds.
    pub fn new(
        raw: impl Into<Vec<u8>>,
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
        subject_identity: impl Into<String>,
    ) -> Self {
        Self {
            raw: raw.into(),
            not_before,
            not_after,
            subject_identity: subject_identity.into(),
        }
    }

    /// Parse a PEM-encoded X.509 certificate.
    ///
    /// The subject identity is taken from the Common Name.
    pub fn from_x509_pem(pem_bytes: &[u8]) -> Result<Self, CoreError> {
        let block =
            ::pem::parse(pem_bytes).map_err(|e| CoreError::InvalidCertificate(e.to_string()))?;
        if block.tag() != "CERTIFICATE" {
            return Err(CoreError::InvalidCertificate(format!(
                "expected CERTIFICATE block, got '{}'",
                block.tag()
            )));
        }

        let (_, cert) = X509Certificate::from_der(block.contents())
            .map_err(|e| CoreError::InvalidCertificate(format!("{:?}", e)))?;

        let validity = cert.validity();
        let not_before = asn1_to_utc(validity.not_before.timestamp())?;
        let not_after = asn1_to_utc(validity.not_after.timestamp())?;

        let subject_identity = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                CoreError::InvalidCertificate(
                    "certificate does not contain a Common Name (CN)".to_string(),
                )
            })?;

        Ok(Self {
            raw: pem_bytes.to_vec(),
            not_before,
            not_after,
            subject_identity,
        })
    }

    /// Encoded certificate bytes.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Encoded certificate as text, when it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.raw).ok()
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.not_after
    }

    pub fn subject_identity(&self) -> &str {
        &self.subject_identity
    }

    /// Total validity window.
    pub fn lifetime(&self) -> chrono::Duration {
        self.not_after - self.not_before
    }

    /// True once `now` has reached `not_after`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.not_after
    }

    /// True once `now` is inside the refresh margin before expiry.
    pub fn needs_refresh_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::MAX);
        match self.not_after.checked_sub_signed(margin) {
            Some(deadline) => now >= deadline,
            None => true,
        }
    }

    /// Point in time at which a proactive renewal should start.
    ///
    /// This is `fraction` of the way through the lifetime, but never later
    /// than the start of the refresh margin.
    pub fn renewal_time(&self, fraction: f64, margin: Duration) -> DateTime<Utc> {
        let fraction = fraction.clamp(0.0, 1.0);
        let lifetime_ms = self.lifetime().num_milliseconds().max(0) as f64;
        let by_fraction =
            self.not_before + chrono::Duration::milliseconds((lifetime_ms * fraction) as i64);

        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::MAX);
        let by_margin = self
            .not_after
            .checked_sub_signed(margin)
            .unwrap_or(self.not_before);

        by_fraction.min(by_margin)
    }
}

fn asn1_to_utc(timestamp: i64) -> Result<DateTime<Utc>, CoreError> {
    DateTime::from_timestamp(timestamp, 0).ok_or_else(|| {
        CoreError::InvalidCertificate(format!("timestamp {} out of range", timestamp))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

    fn generate_test_cert(cn: &str, lifetime: ::time::Duration) -> String {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, cn);
        params.distinguished_name = dn;

        let now = ::time::OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + lifetime;

        let key_pair = KeyPair::generate().unwrap();
        params.self_signed(&key_pair).unwrap().pem()
    }

    #[test]
    fn test_parse_x509_pem() {
        let pem = generate_test_cert("role:deploy", ::time::Duration::hours(1));
        let cert = Certificate::from_x509_pem(pem.as_bytes()).unwrap();

        assert_eq!(cert.subject_identity(), "role:deploy");
        assert_eq!(cert.raw(), pem.as_bytes());
        assert_eq!(cert.lifetime().num_minutes(), 60);
        assert!(!cert.is_expired_at(Utc::now()));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let result = Certificate::from_x509_pem(b"not a certificate");
        assert!(matches!(result, Err(CoreError::InvalidCertificate(_))));
    }

    #[test]
    fn test_parse_rejects_wrong_block() {
        let key = KeyPair::generate().unwrap();
        let result = Certificate::from_x509_pem(key.serialize_pem().as_bytes());
        assert!(matches!(result, Err(CoreError::InvalidCertificate(_))));
    }

    #[test]
    fn test_refresh_margin() {
        let now = Utc::now();
        let cert = Certificate::new(
            b"ssh-ed25519-cert-v01@openssh.com AAAA".to_vec(),
            now,
            now + chrono::Duration::hours(1),
            "alice",
        );

        assert!(!cert.needs_refresh_at(now, Duration::from_secs(300)));
        assert!(cert.needs_refresh_at(
            now + chrono::Duration::minutes(56),
            Duration::from_secs(300)
        ));
        assert!(cert.is_expired_at(now + chrono::Duration::hours(1)));
    }

    #[test]
    fn test_renewal_time() {
        let now = Utc::now();
        let cert = Certificate::new(Vec::new(), now, now + chrono::Duration::hours(2), "svc");

        // Half-way through a two hour lifetime.
        assert_eq!(
            cert.renewal_time(0.5, Duration::from_secs(60)),
            now + chrono::Duration::hours(1)
        );

        // A large margin pulls the renewal earlier.
        assert_eq!(
            cert.renewal_time(0.5, Duration::from_secs(90 * 60)),
            now + chrono::Duration::minutes(30)
        );
    }
}
