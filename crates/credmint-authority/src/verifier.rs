//! Identity assertion verification.
//!
//! Role callers prove who they are with a presigned STS `GetCallerIdentity`
//! URL. The authority replays the URL itself; AWS answers with the caller's
//! ARN, and no credential ever reaches the authority.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use credmint_core::IdentityAssertion;

/// Errors that can occur while verifying an assertion.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("identity proof has expired")]
    Expired,

    #[error("malformed identity proof: {0}")]
    Malformed(String),

    #[error("identity proof targets untrusted host '{0}'")]
    UntrustedHost(String),

    #[error("identity provider rejected the proof: {0}")]
    Rejected(String),

    #[error("claimed scope '{claimed}' does not match verified identity '{actual}'")]
    ScopeMismatch { claimed: String, actual: String },

    #[error("failed to reach identity provider: {0}")]
    Transport(String),
}

/// Identity established by a verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Simplified principal used as certificate CN.
    pub principal: String,

    /// Full capability scope (role ARN).
    pub capability_scope: String,
}

/// Something that can check an identity assertion out-of-band.
#[async_trait]
pub trait AssertionVerifier: Send + Sync {
    async fn verify(&self, assertion: &IdentityAssertion) -> Result<VerifiedIdentity, VerifyError>;
}

/// Verifies presigned STS `GetCallerIdentity` URLs.
pub struct StsPresignedUrlVerifier {
    client: reqwest::Client,
    allowed_hosts: Vec<String>,
}

impl StsPresignedUrlVerifier {
    pub fn new(allowed_hosts: Vec<String>, timeout: Duration) -> Result<Self, VerifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerifyError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            allowed_hosts,
        })
    }

    /// Check the proof URL without contacting the provider.
    fn parse_proof_url(&self, assertion: &IdentityAssertion) -> Result<reqwest::Url, VerifyError> {
        let raw = std::str::from_utf8(&assertion.proof)
            .map_err(|_| VerifyError::Malformed("proof is not UTF-8".to_string()))?;
        let url = reqwest::Url::parse(raw).map_err(|e| VerifyError::Malformed(e.to_string()))?;

        if url.scheme() != "https" {
            return Err(VerifyError::Malformed(format!(
                "proof URL must use https, got '{}'",
                url.scheme()
            )));
        }

        let host = url.host_str().unwrap_or_default().to_string();
        if !self.allowed_hosts.iter().any(|h| h.eq_ignore_ascii_case(&host)) {
            return Err(VerifyError::UntrustedHost(host));
        }

        let is_caller_identity = url
            .query_pairs()
            .any(|(k, v)| k == "Action" && v == "GetCallerIdentity");
        if !is_caller_identity {
            return Err(VerifyError::Malformed(
                "proof URL is not a GetCallerIdentity call".to_string(),
            ));
        }

        Ok(url)
    }
}

#[async_trait]
impl AssertionVerifier for StsPresignedUrlVerifier {
    async fn verify(&self, assertion: &IdentityAssertion) -> Result<VerifiedIdentity, VerifyError> {
        if assertion.is_expired_at(Utc::now()) {
            return Err(VerifyError::Expired);
        }

        let url = self.parse_proof_url(assertion)?;
        debug!(host = ?url.host_str(), claimed = %assertion.capability_scope, "Verifying identity proof");

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| VerifyError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "Identity provider rejected presigned URL");
            return Err(VerifyError::Rejected(format!("HTTP {}", response.status())));
        }

        let body: StsEnvelope = response
            .json()
            .await
            .map_err(|e| VerifyError::Rejected(format!("unexpected response: {}", e)))?;
        let caller_arn = body.response.result.arn;

        let caller = CallerArn::parse(&caller_arn)
            .ok_or_else(|| VerifyError::Rejected(format!("unexpected caller ARN '{}'", caller_arn)))?;

        if !caller.matches_role_arn(&assertion.capability_scope) {
            return Err(VerifyError::ScopeMismatch {
                claimed: assertion.capability_scope.clone(),
                actual: caller_arn,
            });
        }

        Ok(VerifiedIdentity {
            principal: caller.simplified(),
            capability_scope: assertion.capability_scope.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct StsEnvelope {
    #[serde(rename = "GetCallerIdentityResponse")]
    response: StsResponse,
}

#[derive(Debug, Deserialize)]
struct StsResponse {
    #[serde(rename = "GetCallerIdentityResult")]
    result: StsResult,
}

#[derive(Debug, Deserialize)]
struct StsResult {
    #[serde(rename = "Arn")]
    arn: String,
}

/// The parts of a caller ARN that identify a role.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CallerArn {
    partition: String,
    account: String,
    role_name: String,
}

impl CallerArn {
    /// Parse `arn:<partition>:sts::<account>:assumed-role/<role>/<session>`
    /// or `arn:<partition>:iam::<account>:role/<path>/<role>`.
    fn parse(arn: &str) -> Option<Self> {
        let parts: Vec<&str> = arn.splitn(6, ':').collect();
        let [prefix, partition, service, _region, account, resource] = parts.as_slice() else {
            return None;
        };
        if *prefix != "arn" || account.is_empty() {
            return None;
        }

        let role_name = match *service {
            "sts" => {
                let rest = resource.strip_prefix("assumed-role/")?;
                rest.split('/').next()?
            }
            "iam" => {
                let rest = resource.strip_prefix("role/")?;
                rest.rsplit('/').next()?
            }
            _ => return None,
        };
        if role_name.is_empty() {
            return None;
        }

        Some(Self {
            partition: partition.to_string(),
            account: account.to_string(),
            role_name: role_name.to_string(),
        })
    }

    /// Whether a claimed IAM role ARN names the same role.
    fn matches_role_arn(&self, claimed: &str) -> bool {
        match CallerArn::parse(claimed) {
            Some(other) => {
                claimed.contains(":iam::")
                    && other.partition == self.partition
                    && other.account == self.account
                    && other.role_name == self.role_name
            }
            None => false,
        }
    }

    /// Short form placed in certificate CNs.
    fn simplified(&self) -> String {
        format!("aws:{}:{}", self.account, self.role_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> StsPresignedUrlVerifier {
        StsPresignedUrlVerifier::new(
            vec!["sts.amazonaws.com".to_string()],
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn assertion(proof: &str) -> IdentityAssertion {
        IdentityAssertion::new(
            "i-0abc",
            "arn:aws:iam::123456789012:role/deploy",
            proof.as_bytes().to_vec(),
            Utc::now() + chrono::Duration::minutes(5),
        )
    }

    #[test]
    fn test_parse_assumed_role_arn() {
        let arn = CallerArn::parse("arn:aws:sts::123456789012:assumed-role/deploy/i-0abc").unwrap();
        assert_eq!(arn.account, "123456789012");
        assert_eq!(arn.role_name, "deploy");
        assert_eq!(arn.simplified(), "aws:123456789012:deploy");
    }

    #[test]
    fn test_role_arn_matching() {
        let caller = CallerArn::parse("arn:aws:sts::123456789012:assumed-role/deploy/s").unwrap();
        assert!(caller.matches_role_arn("arn:aws:iam::123456789012:role/deploy"));
        assert!(caller.matches_role_arn("arn:aws:iam::123456789012:role/team/deploy"));
        assert!(!caller.matches_role_arn("arn:aws:iam::999999999999:role/deploy"));
        assert!(!caller.matches_role_arn("arn:aws:iam::123456789012:role/admin"));
        assert!(!caller.matches_role_arn("arn:aws:sts::123456789012:assumed-role/deploy/s"));
        assert!(!caller.matches_role_arn("not-an-arn"));
    }

    #[test]
    fn test_rejects_untrusted_host() {
        let result = verifier().parse_proof_url(&assertion(
            "https://evil.example.com/?Action=GetCallerIdentity&Version=2011-06-15",
        ));
        assert!(matches!(result, Err(VerifyError::UntrustedHost(h)) if h == "evil.example.com"));
    }

    #[test]
    fn test_rejects_other_actions() {
        let result = verifier()
            .parse_proof_url(&assertion("https://sts.amazonaws.com/?Action=AssumeRole"));
        assert!(matches!(result, Err(VerifyError::Malformed(_))));

        let result = verifier()
            .parse_proof_url(&assertion("http://sts.amazonaws.com/?Action=GetCallerIdentity"));
        assert!(matches!(result, Err(VerifyError::Malformed(_))));
    }

    #[test]
    fn test_accepts_presigned_url() {
        let url = verifier()
            .parse_proof_url(&assertion(
                "https://sts.amazonaws.com/?Action=GetCallerIdentity&Version=2011-06-15&X-Amz-Signature=abc",
            ))
            .unwrap();
        assert_eq!(url.host_str(), Some("sts.amazonaws.com"));
    }

    #[tokio::test]
    async fn test_expired_proof() {
        let mut expired = assertion("https://sts.amazonaws.com/?Action=GetCallerIdentity");
        expired.proof_expiry = Utc::now() - chrono::Duration::seconds(1);

        let result = verifier().verify(&expired).await;
        assert!(matches!(result, Err(VerifyError::Expired)));
    }
}
