//! `ssh-keygen` signing backend and public key lookup.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use super::{BackendOutput, SignInvocation, SignerError, SigningBackend};

/// Runs `ssh-keygen -s <ca> -I <id> -n <principal> -V <validity> <key>`.
#[derive(Debug, Clone)]
pub struct SshKeygenBackend {
    /// Path to the executable.
    program: String,

    /// Arguments placed before the signing arguments (e.g. a wrapper script).
    leading_args: Vec<String>,
}

impl SshKeygenBackend {
    /// Create a backend for the given executable.
    ///
    /// The path can be just "ssh-keygen" to use PATH lookup, or a full path.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Builder method to prepend an argument.
    pub fn with_leading_arg(mut self, arg: impl Into<String>) -> Self {
        self.leading_args.push(arg.into());
        self
    }
}

impl Default for SshKeygenBackend {
    fn default() -> Self {
        Self::new("ssh-keygen")
    }
}

#[async_trait]
impl SigningBackend for SshKeygenBackend {
    async fn run(&self, inv: &SignInvocation<'_>) -> Result<BackendOutput, SignerError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg("-s")
            .arg(inv.ca_key)
            .arg("-I")
            .arg(inv.key_identity_label)
            .arg("-n")
            .arg(inv.principal)
            .arg("-V")
            .arg(inv.validity)
            .arg(inv.public_key_path);

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(command = ?cmd, "Running signing backend");

        let output = cmd.output().await.map_err(|e| {
            error!(program = %self.program, error = %e, "Failed to spawn signing backend");
            SignerError::Backend {
                message: format!("failed to spawn '{}': {}", self.program, e),
                stderr: String::new(),
            }
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        debug!(
            stdout = %String::from_utf8_lossy(&output.stdout).trim(),
            stderr = %stderr.trim(),
            "Signing backend output"
        );

        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            error!(exit_code, stderr = %stderr.trim(), "Signing backend failed");
            return Err(SignerError::Backend {
                message: format!("'{}' exited with code {}", self.program, exit_code),
                stderr,
            });
        }

        Ok(BackendOutput { stderr })
    }
}

/// Format a validity window as an ssh-keygen relative time spec.
///
/// Uses the largest unit that divides the window exactly (`+1d`, `+8h`,
/// `+90m`, `+45s`).
pub fn ssh_validity_spec(validity: Duration) -> String {
    let secs = validity.as_secs().max(1);
    let (value, unit) = if secs % 86_400 == 0 {
        (secs / 86_400, "d")
    } else if secs % 3_600 == 0 {
        (secs / 3_600, "h")
    } else if secs % 60 == 0 {
        (secs / 60, "m")
    } else {
        (secs, "s")
    };
    format!("+{}{}", value, unit)
}

/// Look up a user's SSH public key via an authorized-keys command
/// (e.g. `sss_ssh_authorizedkeys <user>`).
///
/// Returns the first key line.
pub async fn lookup_authorized_key(program: &str, username: &str) -> Result<String, SignerError> {
    let output = Command::new(program)
        .arg(username)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| SignerError::Backend {
            message: format!("failed to spawn '{}': {}", program, e),
            stderr: String::new(),
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        return Err(SignerError::Backend {
            message: format!(
                "'{}' exited with code {}",
                program,
                output.status.code().unwrap_or(-1)
            ),
            stderr,
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let key = stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .ok_or_else(|| SignerError::Backend {
            message: format!("no public key found for '{}'", username),
            stderr: stderr.clone(),
        })?;

    info!(username = %username, key_type = %key.split_whitespace().next().unwrap_or(""), "Found user public key");
    Ok(key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::CertSigner;
    use credmint_core::SigningRequest;
    use std::sync::Arc;

    /// Stand-in for ssh-keygen: copies the key to `<key>-cert.pub` with a
    /// header built from its arguments and reports it like the real tool.
    const FAKE_SSH_KEYGEN: &str = r#"
key="$9"
cert="$key-cert.pub"
printf 'CERT id=%s principal=%s validity=%s ' "$4" "$6" "$8" > "$cert"
cat "$key" >> "$cert"
echo "Signed user key $cert: id \"$4\" serial 0 for $6 valid from now" >&2
"#;

    #[test]
    fn test_ssh_validity_spec() {
        assert_eq!(ssh_validity_spec(Duration::from_secs(86_400)), "+1d");
        assert_eq!(ssh_validity_spec(Duration::from_secs(8 * 3_600)), "+8h");
        assert_eq!(ssh_validity_spec(Duration::from_secs(90 * 60)), "+90m");
        assert_eq!(ssh_validity_spec(Duration::from_secs(45)), "+45s");
        assert_eq!(ssh_validity_spec(Duration::ZERO), "+1s");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sign_with_fake_ssh_keygen() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-ssh-keygen.sh");
        std::fs::write(&script, FAKE_SSH_KEYGEN).unwrap();

        let backend = SshKeygenBackend::new("sh").with_leading_arg(script.display().to_string());
        let signer = CertSigner::new(Arc::new(backend), "/etc/credmint/users_ca")
            .with_scratch_dir(dir.path());

        let request = SigningRequest::new("mon-sre-dev", "alice", b"ssh-ed25519 AAAAkey".to_vec());
        let cert = signer.sign(request).await.unwrap();

        assert_eq!(
            cert.as_str().unwrap(),
            "CERT id=mon-sre-dev_alice principal=alice validity=+1d ssh-ed25519 AAAAkey\n"
        );

        // Only the script itself is left behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("fake-ssh-keygen.sh")]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_backend_exit_failure() {
        let backend = SshKeygenBackend::new("sh")
            .with_leading_arg("-c")
            .with_leading_arg("echo 'Load key failed' >&2; exit 255");
        let signer = CertSigner::new(Arc::new(backend), "/missing/ca");

        let request = SigningRequest::new("ca", "alice", b"ssh-ed25519 AAAA".to_vec());
        match signer.sign(request).await {
            Err(SignerError::Backend { message, stderr }) => {
                assert!(message.contains("255"));
                assert!(stderr.contains("Load key failed"));
            }
            other => panic!("expected backend error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_lookup_authorized_key() {
        let key = lookup_authorized_key("echo", "ssh-ed25519").await.unwrap();
        assert_eq!(key, "ssh-ed25519");

        let result = lookup_authorized_key("false", "alice").await;
        assert!(matches!(result, Err(SignerError::Backend { .. })));
    }
}
