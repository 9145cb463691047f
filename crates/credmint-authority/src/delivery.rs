//! Out-of-band delivery of bootstrap secrets.
//!
//! When a delivery channel is configured the plaintext bootstrap secret is
//! handed to it instead of being shown to the administrator who requested
//! it.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

/// Errors that can occur while delivering a secret.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to start delivery command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("delivery command failed: {0}")]
    Failed(String),
}

/// Everything a delivery channel needs to notify the target user.
#[derive(Debug, Clone)]
pub struct BootstrapOtpNotice<'a> {
    /// User the secret was issued for.
    pub target_username: &'a str,

    /// Administrator who requested it.
    pub requested_by: &'a str,

    /// The plaintext secret.
    pub secret: &'a str,

    /// Short hash fingerprint shown to the administrator.
    pub fingerprint: &'a str,

    /// Requested lifetime.
    pub duration: Duration,

    pub expires_at: DateTime<Utc>,
}

impl BootstrapOtpNotice<'_> {
    /// Render the notice as a plain-text mail message.
    pub fn render(&self) -> String {
        format!(
            "To: {target}\n\
             Subject: Bootstrap OTP for {target}\n\
             \n\
             {admin} generated a bootstrap OTP for {target}.\n\
             \n\
             Value: {secret}\n\
             Fingerprint: {fingerprint}\n\
             Valid for: {duration}\n\
             Expires at: {expires}\n",
            target = self.target_username,
            admin = self.requested_by,
            secret = self.secret,
            fingerprint = self.fingerprint,
            duration = humantime::format_duration(self.duration),
            expires = self.expires_at.to_rfc3339(),
        )
    }
}

/// A channel that can deliver bootstrap secrets.
#[async_trait]
pub trait OtpDelivery: Send + Sync {
    async fn deliver(&self, notice: &BootstrapOtpNotice<'_>) -> Result<(), DeliveryError>;
}

/// Delivers notices by piping them into a mailer command (e.g. `sendmail -t`).
#[derive(Debug, Clone)]
pub struct CommandDelivery {
    program: String,
    args: Vec<String>,
}

impl CommandDelivery {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Builder method to add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

#[async_trait]
impl OtpDelivery for CommandDelivery {
    async fn deliver(&self, notice: &BootstrapOtpNotice<'_>) -> Result<(), DeliveryError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DeliveryError::Spawn {
                command: self.program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(notice.render().as_bytes())
                .await
                .map_err(|e| DeliveryError::Failed(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| DeliveryError::Failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                command = %self.program,
                exit_code = output.status.code().unwrap_or(-1),
                stderr = %stderr.trim(),
                "Bootstrap OTP delivery failed"
            );
            return Err(DeliveryError::Failed(format!(
                "'{}' exited with code {}",
                self.program,
                output.status.code().unwrap_or(-1)
            )));
        }

        info!(
            target_username = %notice.target_username,
            fingerprint = %notice.fingerprint,
            "Bootstrap OTP delivered"
        );
        Ok(())
    }
}
