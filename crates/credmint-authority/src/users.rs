//! Administrative user management.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use credmint_core::{validate_username, UserProfile};

use crate::store::{ProfileStore, StoreError};

/// Errors from user management operations.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("invalid username '{0}'")]
    InvalidUsername(String),

    #[error("user '{0}' already exists")]
    UserExists(String),

    #[error("user '{0}' does not exist")]
    UserNotFound(String),

    #[error("profile store unavailable, try again later: {0}")]
    ProfileStoreUnavailable(String),

    #[error("profile store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for UserError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unreachable(msg) => UserError::ProfileStoreUnavailable(msg),
            other => UserError::Store(other),
        }
    }
}

/// Adds, removes and lists users in a profile store.
pub struct UserDirectory {
    store: Arc<dyn ProfileStore>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Create an empty profile for a new user.
    pub async fn add_user(&self, requested_by: &str, username: &str) -> Result<(), UserError> {
        validate_username(username).map_err(|_| UserError::InvalidUsername(username.to_string()))?;

        let loaded = self.store.load(username).await?;
        if loaded.from_cache {
            return Err(UserError::ProfileStoreUnavailable(
                "working in db disconnected mode".to_string(),
            ));
        }
        if loaded.exists {
            return Err(UserError::UserExists(username.to_string()));
        }

        self.store.save(username, &UserProfile::default()).await?;
        info!(admin = %requested_by, username = %username, "Added user");
        Ok(())
    }

    /// Remove a user and their profile.
    pub async fn delete_user(&self, requested_by: &str, username: &str) -> Result<(), UserError> {
        validate_username(username).map_err(|_| UserError::InvalidUsername(username.to_string()))?;

        let loaded = self.store.load(username).await?;
        if loaded.from_cache {
            return Err(UserError::ProfileStoreUnavailable(
                "working in db disconnected mode".to_string(),
            ));
        }
        if !loaded.exists {
            return Err(UserError::UserNotFound(username.to_string()));
        }

        self.store.delete(username).await?;
        info!(admin = %requested_by, username = %username, "Deleted user");
        Ok(())
    }

    pub async fn list_users(&self) -> Result<Vec<String>, UserError> {
        Ok(self.store.list_users().await?)
    }
}
