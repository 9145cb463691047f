//! Credmint Authority Server

use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use credmint_authority::delivery::CommandDelivery;
use credmint_authority::http;
use credmint_authority::signer::lookup_authorized_key;
use credmint_authority::{
    AppState, CertSigner, CertificateAuthority, Config, MemoryProfileStore, SshKeygenBackend,
    StsPresignedUrlVerifier,
};
use credmint_core::SigningRequest;

/// Credmint certificate authority.
#[derive(Parser, Debug)]
#[command(name = "credmint-authority", about = "Short-lived credential authority")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// HTTP server address
        #[arg(long)]
        http_addr: Option<String>,

        /// Path to role CA certificate
        #[arg(long)]
        ca_cert: Option<String>,

        /// Path to role CA private key
        #[arg(long)]
        ca_key: Option<String>,

        /// Role certificate validity (e.g. "1h")
        #[arg(long, value_parser = humantime::parse_duration)]
        role_cert_validity: Option<Duration>,

        /// User allowed to call admin endpoints (repeatable)
        #[arg(long = "admin")]
        admins: Vec<String>,

        /// User known to the profile store at startup (repeatable)
        #[arg(long = "user")]
        users: Vec<String>,

        /// Mailer command for bootstrap OTP delivery (e.g. "sendmail -t")
        #[arg(long)]
        delivery_command: Option<String>,
    },

    /// Sign a user's SSH public key and print the certificate
    #[command(name = "sign-user-cert")]
    SignUserCert {
        /// User to certify
        #[arg(short, long)]
        user: String,

        /// Public key file; looked up with the authorized keys command when absent
        #[arg(long)]
        pubkey_file: Option<PathBuf>,

        /// Path to SSH CA private key
        #[arg(long)]
        ca_key: Option<String>,

        /// Certificate validity (e.g. "8h")
        #[arg(long, value_parser = humantime::parse_duration)]
        validity: Option<Duration>,
    },

    /// Generate a role CA certificate and key
    #[command(name = "init-ca")]
    InitCa {
        /// Where to write the CA certificate
        #[arg(long)]
        cert: Option<String>,

        /// Where to write the CA private key
        #[arg(long)]
        key: Option<String>,

        /// CA common name
        #[arg(long, default_value = "credmint role CA")]
        common_name: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("credmint_authority=info,tower_http=info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::default();

    match cli.command {
        Commands::Serve {
            http_addr,
            ca_cert,
            ca_key,
            role_cert_validity,
            admins,
            users,
            delivery_command,
        } => {
            if let Some(addr) = http_addr {
                config.http_bind_addr = addr;
            }
            if let Some(path) = ca_cert {
                config.ca_cert_path = path;
            }
            if let Some(path) = ca_key {
                config.ca_key_path = path;
            }
            if let Some(validity) = role_cert_validity {
                config.role_cert_validity = validity;
            }
            config.admin_users.extend(admins);
            if delivery_command.is_some() {
                config.delivery_command = delivery_command;
            }
            serve(config, users).await
        }
        Commands::SignUserCert {
            user,
            pubkey_file,
            ca_key,
            validity,
        } => {
            if let Some(path) = ca_key {
                config.ssh_ca_key_path = path;
            }
            sign_user_cert(&config, &user, pubkey_file, validity).await
        }
        Commands::InitCa {
            cert,
            key,
            common_name,
        } => {
            let cert = cert.unwrap_or(config.ca_cert_path);
            let key = key.unwrap_or(config.ca_key_path);
            let ca = CertificateAuthority::generate(&common_name, config.role_cert_validity)?;
            ca.write_files(&cert, &key)?;
            info!(cert = %cert, key = %key, "Wrote role CA");
            Ok(())
        }
    }
}

async fn serve(config: Config, users: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let http_addr: SocketAddr = config.http_bind_addr.parse()?;

    // Load CA for role certificates (optional - role issuance won't work without it)
    let ca = match CertificateAuthority::from_files(
        &config.ca_cert_path,
        &config.ca_key_path,
        config.role_cert_validity,
    ) {
        Ok(ca) => {
            info!(
                ca_cert = %config.ca_cert_path,
                validity = %humantime::format_duration(config.role_cert_validity),
                "Certificate Authority loaded"
            );
            Some(ca)
        }
        Err(e) => {
            warn!(error = %e, "Failed to load CA - role certificate endpoint will not work");
            None
        }
    };

    let verifier = Arc::new(StsPresignedUrlVerifier::new(
        config.sts_allowed_hosts.clone(),
        config.sts_timeout,
    )?);
    let store = Arc::new(MemoryProfileStore::with_users(users));

    let mut builder = AppState::builder(store, verifier, config.admin_users.clone());
    if let Some(ca) = ca {
        builder = builder.with_ca(ca);
    }
    if let Some(command) = &config.delivery_command {
        let mut parts = command.split_whitespace();
        if let Some(program) = parts.next() {
            let delivery = parts.fold(CommandDelivery::new(program), |d, arg| d.with_arg(arg));
            info!(command = %command, "Bootstrap OTPs will be delivered out-of-band");
            builder = builder.with_delivery(Arc::new(delivery));
        }
    }
    let state = builder.build();

    if config.admin_users.is_empty() {
        warn!("No admin users configured - admin endpoints will refuse every request");
    }

    let listener = TcpListener::bind(http_addr).await?;
    info!(http_addr = %http_addr, "Starting credmint authority");

    axum::serve(listener, http::create_router(state)).await?;
    Ok(())
}

async fn sign_user_cert(
    config: &Config,
    user: &str,
    pubkey_file: Option<PathBuf>,
    validity: Option<Duration>,
) -> Result<(), Box<dyn std::error::Error>> {
    let public_key = match pubkey_file {
        Some(path) => tokio::fs::read(&path).await?,
        None => lookup_authorized_key(&config.authorized_keys_command, user)
            .await?
            .into_bytes(),
    };

    let backend = SshKeygenBackend::new(&config.ssh_keygen_path);
    let signer = CertSigner::new(Arc::new(backend), &config.ssh_ca_key_path)
        .with_max_validity(config.max_ssh_cert_validity)
        .with_scratch_dir(&config.scratch_dir);

    let mut request = SigningRequest::new(&config.issuer_instance_id, user, public_key);
    if let Some(validity) = validity {
        request = request.with_validity(validity);
    }

    let cert = signer.sign(request).await?;
    info!(
        user = %user,
        expires_at = %cert.not_after(),
        "Signed user certificate"
    );

    std::io::stdout().write_all(cert.raw())?;
    Ok(())
}
