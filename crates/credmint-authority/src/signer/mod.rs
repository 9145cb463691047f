//! SSH user certificate signing.
//!
//! `CertSigner` turns a `SigningRequest` into a signed certificate by
//! handing the public key to a signing backend (normally `ssh-keygen -s`).
//! The backend reports where it wrote the certificate on stderr; exactly one
//! `Signed user key <path>:` line is accepted as proof of success.
//!
//! Both the scratch public key file and the produced certificate artifact
//! are scoped to a single call and removed on every exit path.

mod ssh_keygen;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};

use credmint_core::{Certificate, SigningRequest, DEFAULT_SSH_CERT_VALIDITY};

pub use ssh_keygen::{lookup_authorized_key, ssh_validity_spec, SshKeygenBackend};

static SIGNED_KEY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Signed user key ([^:]+):").expect("signed key regex is valid")
});

/// Errors that can occur while signing.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("failed to prepare scratch key file: {0}")]
    ScratchFile(#[source] std::io::Error),

    #[error("signing backend failed: {message}; stderr: {stderr}")]
    Backend { message: String, stderr: String },

    #[error("cannot find signed key name in backend output ({matches} matches)")]
    OutputUnparseable { matches: usize },

    #[error("failed to read signed certificate '{}': {source}", path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Arguments passed to a signing backend.
#[derive(Debug, Clone)]
pub struct SignInvocation<'a> {
    /// CA private key reference.
    pub ca_key: &'a Path,

    /// Audit label embedded in the certificate.
    pub key_identity_label: &'a str,

    /// Sole principal the certificate authorizes.
    pub principal: &'a str,

    /// Relative validity spec, e.g. `+1d`.
    pub validity: &'a str,

    /// File holding exactly one public key.
    pub public_key_path: &'a Path,
}

/// Captured backend output.
#[derive(Debug, Clone, Default)]
pub struct BackendOutput {
    pub stderr: String,
}

/// A certificate signing backend.
///
/// A successful return only means the backend ran; the caller still
/// requires the artifact line on stderr.
#[async_trait]
pub trait SigningBackend: Send + Sync {
    async fn run(&self, invocation: &SignInvocation<'_>) -> Result<BackendOutput, SignerError>;
}

/// Signs user public keys with a CA key.
pub struct CertSigner {
    backend: Arc<dyn SigningBackend>,
    ca_key: PathBuf,
    max_validity: Duration,
    scratch_dir: PathBuf,
}

impl CertSigner {
    /// Create a signer using `ca_key` with the backend.
    pub fn new(backend: Arc<dyn SigningBackend>, ca_key: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            ca_key: ca_key.into(),
            max_validity: DEFAULT_SSH_CERT_VALIDITY,
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Set the policy maximum validity.
    pub fn with_max_validity(mut self, max_validity: Duration) -> Self {
        self.max_validity = max_validity;
        self
    }

    /// Set the directory scratch key files are created in.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Sign a request and return the certificate.
    ///
    /// Nothing is retried here; retry policy belongs to the caller.
    pub async fn sign(&self, request: SigningRequest) -> Result<Certificate, SignerError> {
        let request = request.clamped(self.max_validity);
        let validity = ssh_validity_spec(request.validity);

        let mut scratch = tempfile::Builder::new()
            .prefix("userkey")
            .tempfile_in(&self.scratch_dir)
            .map_err(SignerError::ScratchFile)?;
        write_public_key(scratch.as_file_mut(), &request.public_key)
            .map_err(SignerError::ScratchFile)?;

        let invocation = SignInvocation {
            ca_key: &self.ca_key,
            key_identity_label: &request.key_identity_label,
            principal: &request.principal,
            validity: &validity,
            public_key_path: scratch.path(),
        };

        // ssh-keygen writes `<key>-cert.pub` next to its input; remove it
        // whatever the backend reports.
        let _expected_artifact = ArtifactGuard(expected_artifact_path(scratch.path()));

        let not_before = Utc::now();
        let output = self.backend.run(&invocation).await?;
        debug!(stderr = %output.stderr.trim(), "Signing backend finished");

        let artifact = ArtifactGuard(parse_signed_key_path(&output.stderr)?);
        let raw = tokio::fs::read(&artifact.0)
            .await
            .map_err(|source| SignerError::Artifact {
                path: artifact.0.clone(),
                source,
            })?;
        artifact.remove().await;

        let not_after = not_before
            + chrono::Duration::from_std(request.validity).unwrap_or(chrono::Duration::zero());

        info!(
            principal = %request.principal,
            key_id = %request.key_identity_label,
            validity = %validity,
            "Signed user certificate"
        );

        Ok(Certificate::new(raw, not_before, not_after, request.principal))
    }
}

/// Write a single newline-terminated public key.
fn write_public_key(file: &mut std::fs::File, public_key: &[u8]) -> std::io::Result<()> {
    file.write_all(public_key)?;
    if !public_key.ends_with(b"\n") {
        file.write_all(b"\n")?;
    }
    file.flush()
}

/// Path ssh-keygen derives for the certificate of `public_key_path`.
fn expected_artifact_path(public_key_path: &Path) -> PathBuf {
    let mut path = public_key_path.as_os_str().to_owned();
    path.push("-cert.pub");
    PathBuf::from(path)
}

/// Find the certificate path in backend stderr.
///
/// Exactly one line must start with `Signed user key <path>:`.
pub fn parse_signed_key_path(stderr: &str) -> Result<PathBuf, SignerError> {
    let paths: Vec<&str> = stderr
        .lines()
        .filter_map(|line| SIGNED_KEY_REGEX.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect();

    match paths.as_slice() {
        [path] => Ok(PathBuf::from(path)),
        _ => {
            warn!(matches = paths.len(), "Unexpected signing backend output");
            Err(SignerError::OutputUnparseable {
                matches: paths.len(),
            })
        }
    }
}

/// Removes the signed artifact when dropped.
///
/// The success path removes it with `remove`; `Drop` covers error returns
/// with a single blocking unlink.
struct ArtifactGuard(PathBuf);

impl ArtifactGuard {
    async fn remove(self) {
        if let Err(e) = tokio::fs::remove_file(&self.0).await {
            log_removal_failure(&self.0, &e);
        }
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            log_removal_failure(&self.0, &e);
        }
    }
}

fn log_removal_failure(path: &Path, e: &std::io::Error) {
    if e.kind() != std::io::ErrorKind::NotFound {
        warn!(path = %path.display(), error = %e, "Failed to remove signed artifact");
    }
}
