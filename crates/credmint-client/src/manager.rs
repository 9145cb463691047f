//! Certificate manager for role certificate caching and rotation.
//!
//! The `CertificateManager` provides:
//! - A cached certificate served without contention while it is fresh
//! - At most one refresh in flight; concurrent callers join it
//! - Rotation waiters released by the next successful refresh
//! - A background loop renewing ahead of expiry, with backoff on failure
//! - Cache retention during refresh failures
//!
//! # Example
//!
//! ```ignore
//! use credmint_client::{CertificateManager, HttpIssuanceClient, ManagerConfig};
//! use std::sync::Arc;
//!
//! let issuer = Arc::new(HttpIssuanceClient::new("https://credmint.internal:8443")?);
//! let manager = CertificateManager::new(ManagerConfig::default(), proof_provider, issuer)?;
//! manager.spawn_refresh_loop();
//!
//! // In async context:
//! let cert = manager.get_certificate().await?;
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::{oneshot, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use credmint_core::Certificate;

use crate::error::ManagerError;
use crate::issuance::IssuanceClient;
use crate::keys::LocalKey;
use crate::proof::IdentityProofProvider;

/// Manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// A certificate this close to expiry is no longer served from cache.
    pub refresh_margin: Duration,

    /// Fraction of the lifetime after which the background loop renews.
    pub refresh_fraction: f64,

    /// First retry delay after a failed background refresh.
    pub retry_initial: Duration,

    /// Upper bound for the retry delay.
    pub retry_max: Duration,

    /// CN placed in the locally generated CSR.
    pub key_common_name: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            refresh_margin: Duration::from_secs(5 * 60),
            refresh_fraction: 0.5,
            retry_initial: Duration::from_secs(5),
            retry_max: Duration::from_secs(5 * 60),
            key_common_name: "credmint-client".to_string(),
        }
    }
}

impl ManagerConfig {
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn with_refresh_fraction(mut self, fraction: f64) -> Self {
        self.refresh_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn with_retry_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.retry_initial = initial;
        self.retry_max = max.max(initial);
        self
    }

    pub fn with_key_common_name(mut self, common_name: impl Into<String>) -> Self {
        self.key_common_name = common_name.into();
        self
    }
}

/// Observable manager state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerStatus {
    /// No certificate yet and no refresh running.
    Empty,
    /// A refresh is in flight.
    Refreshing,
    /// A certificate is cached and the last refresh succeeded.
    Valid,
    /// The last refresh failed.
    Failed,
    /// `shutdown` was called.
    Shutdown,
}

/// Certificate and private key for a TLS client identity.
#[derive(Clone)]
pub struct ClientIdentity {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

impl ClientIdentity {
    /// The `(cert, key)` PEM pair transport layers take.
    pub fn into_pem_pair(self) -> (Vec<u8>, Vec<u8>) {
        (self.cert_pem, self.key_pem)
    }
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("cert_pem", &String::from_utf8_lossy(&self.cert_pem))
            .field("key_pem", &"<redacted>")
            .finish()
    }
}

/// Certificate supply hook for a transport-security layer.
pub type ClientCertificateFn =
    Arc<dyn Fn() -> BoxFuture<'static, Result<ClientIdentity, ManagerError>> + Send + Sync>;

type Outcome = Result<Certificate, ManagerError>;

/// A registered one-shot notification.
enum Waiter {
    /// `get_certificate`: served the cached certificate if a failed refresh
    /// leaves one usable.
    Caller(oneshot::Sender<Outcome>),
    /// `refresh`: gets the raw outcome of the attempt.
    Attempt(oneshot::Sender<Outcome>),
    /// `wait_for_refresh`: only a successful refresh, or a failure with
    /// nothing usable cached, releases it.
    Rotation(oneshot::Sender<Outcome>),
}

#[derive(Default)]
struct ManagerState {
    cached: Option<Certificate>,
    last_error: Option<ManagerError>,
    refreshing: bool,
    shut_down: bool,
    /// Bumped whenever a new certificate is installed.
    generation: u64,
    waiters: Vec<Waiter>,
}

impl ManagerState {
    fn fresh_certificate(&self, margin: Duration) -> Option<&Certificate> {
        self.cached
            .as_ref()
            .filter(|cert| !cert.needs_refresh_at(Utc::now(), margin))
    }

    fn usable_certificate(&self) -> Option<&Certificate> {
        self.cached
            .as_ref()
            .filter(|cert| !cert.is_expired_at(Utc::now()))
    }
}

/// Keeps one role certificate fresh for this process.
pub struct CertificateManager {
    config: ManagerConfig,
    proof: Arc<dyn IdentityProofProvider>,
    issuer: Arc<dyn IssuanceClient>,
    key: LocalKey,
    state: RwLock<ManagerState>,
    shutdown: watch::Sender<bool>,
}

impl CertificateManager {
    /// Create a manager with a freshly generated key.
    pub fn new(
        config: ManagerConfig,
        proof: Arc<dyn IdentityProofProvider>,
        issuer: Arc<dyn IssuanceClient>,
    ) -> Result<Arc<Self>, ManagerError> {
        let key = LocalKey::generate(&config.key_common_name)?;
        Ok(Self::with_key(config, proof, issuer, key))
    }

    /// Create a manager around existing key material.
    pub fn with_key(
        config: ManagerConfig,
        proof: Arc<dyn IdentityProofProvider>,
        issuer: Arc<dyn IssuanceClient>,
        key: LocalKey,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);

        Arc::new(Self {
            config,
            proof,
            issuer,
            key,
            state: RwLock::new(ManagerState::default()),
            shutdown: shutdown_tx,
        })
    }

    /// Returns the cached certificate while it is outside the refresh
    /// margin. Otherwise starts a refresh, or joins the one in flight, and
    /// waits for its outcome.
    pub async fn get_certificate(self: &Arc<Self>) -> Result<Certificate, ManagerError> {
        // Fast path: shared lock only
        {
            let state = self.state.read().await;
            if state.shut_down {
                return Err(ManagerError::Shutdown);
            }
            if let Some(cert) = state.fresh_certificate(self.config.refresh_margin) {
                return Ok(cert.clone());
            }
        }

        let rx = {
            let mut state = self.state.write().await;
            if state.shut_down {
                return Err(ManagerError::Shutdown);
            }
            // Another caller may have installed one while we waited for the lock
            if let Some(cert) = state.fresh_certificate(self.config.refresh_margin) {
                return Ok(cert.clone());
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push(Waiter::Caller(tx));
            self.start_refresh(&mut state);
            rx
        };

        rx.await.unwrap_or(Err(ManagerError::Shutdown))
    }

    /// Force a refresh (or join the one in flight) and return its outcome.
    pub async fn refresh(self: &Arc<Self>) -> Result<Certificate, ManagerError> {
        let rx = {
            let mut state = self.state.write().await;
            if state.shut_down {
                return Err(ManagerError::Shutdown);
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push(Waiter::Attempt(tx));
            self.start_refresh(&mut state);
            rx
        };

        rx.await.unwrap_or(Err(ManagerError::Shutdown))
    }

    /// Wait for the next successful refresh, not the current cached value.
    ///
    /// Does not start a refresh itself. A refresh already in flight when
    /// this is called satisfies it. Returns an error if a refresh fails
    /// while no usable certificate is cached.
    pub async fn wait_for_refresh(&self) -> Result<Certificate, ManagerError> {
        let rx = {
            let mut state = self.state.write().await;
            if state.shut_down {
                return Err(ManagerError::Shutdown);
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push(Waiter::Rotation(tx));
            rx
        };

        rx.await.unwrap_or(Err(ManagerError::Shutdown))
    }

    /// A hook with the same contract as `get_certificate`, yielding the
    /// certificate together with the private key.
    pub fn client_certificate_adapter(self: &Arc<Self>) -> ClientCertificateFn {
        let manager = self.clone();
        Arc::new(move || {
            let manager = manager.clone();
            async move {
                let cert = manager.get_certificate().await?;
                Ok(ClientIdentity {
                    cert_pem: cert.raw().to_vec(),
                    key_pem: manager.key.key_pem().as_bytes().to_vec(),
                })
            }
            .boxed()
        })
    }

    /// Install a certificate obtained elsewhere (e.g. restored from disk).
    pub async fn install_certificate(&self, cert: Certificate) -> Result<(), ManagerError> {
        if cert.is_expired_at(Utc::now()) {
            return Err(ManagerError::CertificateExpiredOrInvalid(format!(
                "certificate expired at {}",
                cert.not_after()
            )));
        }
        let mut state = self.state.write().await;
        if state.shut_down {
            return Err(ManagerError::Shutdown);
        }
        state.cached = Some(cert);
        state.last_error = None;
        state.generation += 1;
        Ok(())
    }

    pub async fn status(&self) -> ManagerStatus {
        let state = self.state.read().await;
        if state.shut_down {
            ManagerStatus::Shutdown
        } else if state.refreshing {
            ManagerStatus::Refreshing
        } else if state.last_error.is_some() {
            ManagerStatus::Failed
        } else if state.usable_certificate().is_some() {
            ManagerStatus::Valid
        } else {
            ManagerStatus::Empty
        }
    }

    /// Error of the last failed refresh, cleared by the next success.
    pub async fn last_error(&self) -> Option<ManagerError> {
        self.state.read().await.last_error.clone()
    }

    /// Private key matching the certificates this manager obtains.
    pub fn key(&self) -> &LocalKey {
        &self.key
    }

    /// Start the background refresh loop.
    pub fn spawn_refresh_loop(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.clone().run_refresh_loop())
    }

    /// Background refresh loop.
    ///
    /// Renews at `refresh_fraction` of the cached certificate's lifetime (or
    /// `refresh_margin` before expiry, whichever is earlier) and retries
    /// failures with exponential backoff. Exits on shutdown.
    pub async fn run_refresh_loop(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut backoff = self.config.retry_initial;
        let (mut seen, mut delay) = self.schedule().await;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            debug!(delay = ?delay, "Next certificate refresh scheduled");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                    continue;
                }
            }

            // A caller may have rotated the certificate while we slept
            let (generation, due) = self.schedule().await;
            if generation != seen {
                seen = generation;
                delay = due;
                backoff = self.config.retry_initial;
                continue;
            }

            let outcome = self.refresh().await;
            seen = self.state.read().await.generation;
            match outcome {
                Ok(cert) => {
                    backoff = self.config.retry_initial;
                    delay = self.renewal_delay(&cert);
                }
                Err(ManagerError::Shutdown) => break,
                Err(e) => {
                    warn!(error = %e, retry_in = ?backoff, "Background certificate refresh failed");
                    delay = backoff;
                    backoff = (backoff * 2).min(self.config.retry_max);
                }
            }
        }

        info!("certificate manager refresh loop shutting down");
    }

    /// Stop the refresh loop and release every waiter with `Shutdown`.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);

        let mut state = self.state.write().await;
        state.shut_down = true;
        for waiter in state.waiters.drain(..) {
            let tx = match waiter {
                Waiter::Caller(tx) | Waiter::Attempt(tx) | Waiter::Rotation(tx) => tx,
            };
            let _ = tx.send(Err(ManagerError::Shutdown));
        }
    }

    /// Set the in-flight flag and spawn the attempt, unless one is running.
    ///
    /// Must be called with the state write lock held.
    fn start_refresh(self: &Arc<Self>, state: &mut ManagerState) {
        if state.refreshing {
            debug!("Joining in-flight certificate refresh");
            return;
        }
        state.refreshing = true;

        let manager = self.clone();
        tokio::spawn(async move {
            let attempt =
                fetch_role_certificate(manager.proof.as_ref(), manager.issuer.as_ref(), &manager.key);
            // settle must run even if a collaborator panics, or the flag stays set
            let outcome = match AssertUnwindSafe(attempt).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => Err(ManagerError::RemoteIssuance(format!(
                    "refresh attempt panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            };
            manager.settle(outcome).await;
        });
    }

    /// Install the outcome of a refresh and release waiters.
    async fn settle(&self, outcome: Outcome) {
        let mut state = self.state.write().await;
        state.refreshing = false;
        if state.shut_down {
            return;
        }

        let waiters = std::mem::take(&mut state.waiters);
        match outcome {
            Ok(cert) => {
                info!(
                    subject = %cert.subject_identity(),
                    not_after = %cert.not_after(),
                    waiters = waiters.len(),
                    "Installed refreshed certificate"
                );
                state.cached = Some(cert.clone());
                state.last_error = None;
                state.generation += 1;
                for waiter in waiters {
                    let tx = match waiter {
                        Waiter::Caller(tx) | Waiter::Attempt(tx) | Waiter::Rotation(tx) => tx,
                    };
                    let _ = tx.send(Ok(cert.clone()));
                }
            }
            Err(e) => {
                let usable = state.usable_certificate().cloned();
                warn!(error = %e, serving_cached = usable.is_some(), "Certificate refresh failed");
                state.last_error = Some(e.clone());

                for waiter in waiters {
                    match (waiter, &usable) {
                        (Waiter::Caller(tx), Some(cert)) => {
                            let _ = tx.send(Ok(cert.clone()));
                        }
                        (Waiter::Rotation(tx), Some(_)) => state.waiters.push(Waiter::Rotation(tx)),
                        (Waiter::Caller(tx) | Waiter::Attempt(tx) | Waiter::Rotation(tx), _) => {
                            let _ = tx.send(Err(e.clone()));
                        }
                    }
                }
            }
        }
    }

    /// Current generation and the delay until its certificate is due.
    async fn schedule(&self) -> (u64, Duration) {
        let state = self.state.read().await;
        let delay = match &state.cached {
            Some(cert) => self.renewal_delay(cert),
            None => Duration::ZERO,
        };
        (state.generation, delay)
    }

    fn renewal_delay(&self, cert: &Certificate) -> Duration {
        delay_until(cert.renewal_time(self.config.refresh_fraction, self.config.refresh_margin))
    }

    #[cfg(test)]
    async fn waiter_count(&self) -> usize {
        self.state.read().await.waiters.len()
    }
}

impl std::fmt::Debug for CertificateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateManager")
            .field("config", &self.config)
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

fn delay_until(at: DateTime<Utc>) -> Duration {
    (at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

/// Run the refresh algorithm once, without a manager.
///
/// Obtains an identity assertion, submits it with the CSR and validates
/// that the returned certificate is not already expired.
pub async fn fetch_role_certificate(
    proof: &dyn IdentityProofProvider,
    issuer: &dyn IssuanceClient,
    key: &LocalKey,
) -> Result<Certificate, ManagerError> {
    let assertion = proof
        .identity_assertion()
        .await
        .map_err(|e| ManagerError::IdentityProofUnavailable(e.to_string()))?;
    if assertion.is_expired_at(Utc::now()) {
        return Err(ManagerError::IdentityProofUnavailable(
            "identity proof expired before use".to_string(),
        ));
    }

    let cert_pem = issuer.request_certificate(&assertion, key.csr_pem()).await?;

    let cert = Certificate::from_x509_pem(cert_pem.as_bytes())
        .map_err(|e| ManagerError::CertificateExpiredOrInvalid(e.to_string()))?;
    if cert.is_expired_at(Utc::now()) {
        return Err(ManagerError::CertificateExpiredOrInvalid(format!(
            "certificate expired at {}",
            cert.not_after()
        )));
    }

    debug!(subject = %cert.subject_identity(), not_after = %cert.not_after(), "Fetched role certificate");
    Ok(cert)
}
