//! Authority configuration.

use std::path::PathBuf;
use std::time::Duration;

use credmint_core::DEFAULT_SSH_CERT_VALIDITY;

/// Authority configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server bind address.
    pub http_bind_addr: String,

    /// Path to the role CA certificate.
    pub ca_cert_path: String,

    /// Path to the role CA private key.
    pub ca_key_path: String,

    /// Validity of issued role certificates.
    pub role_cert_validity: Duration,

    /// Path to the SSH user CA private key.
    pub ssh_ca_key_path: String,

    /// Path to ssh-keygen.
    pub ssh_keygen_path: String,

    /// Command printing a user's authorized keys.
    pub authorized_keys_command: String,

    /// Identifies this issuer in SSH key identity labels.
    pub issuer_instance_id: String,

    /// Upper bound on SSH certificate validity.
    pub max_ssh_cert_validity: Duration,

    /// Where unsigned keys are staged for the signing backend.
    pub scratch_dir: PathBuf,

    /// Users allowed to call admin endpoints.
    pub admin_users: Vec<String>,

    /// Hosts a presigned identity URL may point at.
    pub sts_allowed_hosts: Vec<String>,

    /// Timeout for identity provider calls.
    pub sts_timeout: Duration,

    /// Mailer command for out-of-band bootstrap OTP delivery (e.g. "sendmail -t").
    pub delivery_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_bind_addr: "[::1]:8443".to_string(),
            ca_cert_path: "certs/ca.crt".to_string(),
            ca_key_path: "certs/ca.key".to_string(),
            role_cert_validity: Duration::from_secs(60 * 60),
            ssh_ca_key_path: "/etc/credmint/users_ca".to_string(),
            ssh_keygen_path: "ssh-keygen".to_string(),
            authorized_keys_command: "/usr/bin/sss_ssh_authorizedkeys".to_string(),
            issuer_instance_id: std::env::var("HOSTNAME").unwrap_or_else(|_| "credmint".to_string()),
            max_ssh_cert_validity: DEFAULT_SSH_CERT_VALIDITY,
            scratch_dir: std::env::temp_dir(),
            admin_users: Vec::new(),
            sts_allowed_hosts: vec!["sts.amazonaws.com".to_string()],
            sts_timeout: Duration::from_secs(10),
            delivery_command: None,
        }
    }
}
