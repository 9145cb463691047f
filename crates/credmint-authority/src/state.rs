//! Shared application state.

use std::collections::HashSet;
use std::sync::Arc;

use crate::bootstrap::BootstrapIssuer;
use crate::crypto::CertificateAuthority;
use crate::delivery::OtpDelivery;
use crate::store::ProfileStore;
use crate::users::UserDirectory;
use crate::verifier::AssertionVerifier;

/// Shared application state.
pub struct AppState {
    /// Users allowed to call admin endpoints.
    pub admin_users: HashSet<String>,

    /// Bootstrap OTP issuance.
    pub bootstrap: BootstrapIssuer,

    /// User management.
    pub users: UserDirectory,

    /// Certificate authority for role certificates.
    pub ca: Option<CertificateAuthority>,

    /// Checks role callers' identity assertions.
    pub verifier: Arc<dyn AssertionVerifier>,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new(
        store: Arc<dyn ProfileStore>,
        verifier: Arc<dyn AssertionVerifier>,
        admin_users: impl IntoIterator<Item = String>,
    ) -> Arc<Self> {
        Self::builder(store, verifier, admin_users).build()
    }

    /// Start building state with optional parts.
    pub fn builder(
        store: Arc<dyn ProfileStore>,
        verifier: Arc<dyn AssertionVerifier>,
        admin_users: impl IntoIterator<Item = String>,
    ) -> AppStateBuilder {
        AppStateBuilder {
            store,
            verifier,
            admin_users: admin_users.into_iter().collect(),
            ca: None,
            delivery: None,
        }
    }
}

/// Builder for [`AppState`].
pub struct AppStateBuilder {
    store: Arc<dyn ProfileStore>,
    verifier: Arc<dyn AssertionVerifier>,
    admin_users: HashSet<String>,
    ca: Option<CertificateAuthority>,
    delivery: Option<Arc<dyn OtpDelivery>>,
}

impl AppStateBuilder {
    pub fn with_ca(mut self, ca: CertificateAuthority) -> Self {
        self.ca = Some(ca);
        self
    }

    pub fn with_delivery(mut self, delivery: Arc<dyn OtpDelivery>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    pub fn build(self) -> Arc<AppState> {
        let mut bootstrap = BootstrapIssuer::new(self.store.clone());
        if let Some(delivery) = self.delivery {
            bootstrap = bootstrap.with_delivery(delivery);
        }

        Arc::new(AppState {
            admin_users: self.admin_users,
            bootstrap,
            users: UserDirectory::new(self.store),
            ca: self.ca,
            verifier: self.verifier,
        })
    }
}
