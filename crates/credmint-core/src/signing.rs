//! Signing requests for user certificates.

use std::time::Duration;

/// Validity used when the caller does not ask for one.
pub const DEFAULT_SSH_CERT_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);

/// A request to bind a public key to a principal for a bounded window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningRequest {
    /// The only principal the certificate will authorize.
    pub principal: String,

    /// Public key to certify, in the backend's native encoding.
    pub public_key: Vec<u8>,

    /// Requested validity window.
    pub validity: Duration,

    /// Audit label embedded in the certificate (`<issuer>_<principal>`).
    pub key_identity_label: String,
}

impl SigningRequest {
    /// Build a request with the default validity and an audit label
    /// derived from the issuing instance.
    pub fn new(
        issuer_instance_id: &str,
        principal: impl Into<String>,
        public_key: impl Into<Vec<u8>>,
    ) -> Self {
        let principal = principal.into();
        Self {
            key_identity_label: format!("{}_{}", issuer_instance_id, principal),
            principal,
            public_key: public_key.into(),
            validity: DEFAULT_SSH_CERT_VALIDITY,
        }
    }

    /// Builder method to set the validity window.
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Clamp the validity to a policy maximum.
    ///
    /// The result is whole seconds and never shorter than one second, the
    /// finest window a relative `ssh-keygen -V` time can express.
    pub fn clamped(mut self, max: Duration) -> Self {
        let secs = self.validity.min(max).as_secs().max(1);
        self.validity = Duration::from_secs(secs);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_and_default_validity() {
        let req = SigningRequest::new("keymaster-1", "alice", b"ssh-ed25519 AAAA".to_vec());
        assert_eq!(req.key_identity_label, "keymaster-1_alice");
        assert_eq!(req.validity, DEFAULT_SSH_CERT_VALIDITY);
    }

    #[test]
    fn test_clamped() {
        let req = SigningRequest::new("ca", "bob", Vec::new())
            .with_validity(Duration::from_secs(7 * 24 * 3600))
            .clamped(Duration::from_secs(12 * 3600));
        assert_eq!(req.validity, Duration::from_secs(12 * 3600));

        let short = SigningRequest::new("ca", "bob", Vec::new())
            .with_validity(Duration::from_secs(600))
            .clamped(Duration::from_secs(12 * 3600));
        assert_eq!(short.validity, Duration::from_secs(600));
    }

    #[test]
    fn test_clamped_to_whole_seconds() {
        let zero = SigningRequest::new("ca", "bob", Vec::new())
            .with_validity(Duration::ZERO)
            .clamped(Duration::from_secs(3600));
        assert_eq!(zero.validity, Duration::from_secs(1));

        let fractional = SigningRequest::new("ca", "bob", Vec::new())
            .with_validity(Duration::from_millis(90_500))
            .clamped(Duration::from_secs(3600));
        assert_eq!(fractional.validity, Duration::from_secs(90));
    }
}
