//! User profile store interface.
//!
//! Persistent profile storage lives outside the authority. Implementations
//! report whether a loaded profile came from a stale local cache because the
//! backing database was unreachable; mutating operations refuse to proceed
//! on such data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use credmint_core::UserProfile;

/// Errors returned by a profile store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("profile store unreachable: {0}")]
    Unreachable(String),

    #[error("profile store operation failed: {0}")]
    Backend(String),
}

/// Result of loading a profile.
#[derive(Debug, Clone, Default)]
pub struct LoadedProfile {
    /// The profile, or an empty one when the user does not exist.
    pub profile: UserProfile,

    /// Whether the user exists.
    pub exists: bool,

    /// Whether the profile was served from a stale cache.
    pub from_cache: bool,
}

/// Storage for user profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Load a user's profile.
    async fn load(&self, username: &str) -> Result<LoadedProfile, StoreError>;

    /// Create or replace a user's profile.
    async fn save(&self, username: &str, profile: &UserProfile) -> Result<(), StoreError>;

    /// Remove a user.
    async fn delete(&self, username: &str) -> Result<(), StoreError>;

    /// List all known usernames.
    async fn list_users(&self) -> Result<Vec<String>, StoreError>;
}

/// In-memory profile store.
///
/// Can be switched into disconnected mode, where loads are answered from the
/// local copy flagged as cached and writes fail.
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<HashMap<String, UserProfile>>,
    disconnected: AtomicBool,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with empty profiles for `usernames`.
    pub fn with_users<I, S>(usernames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let profiles = usernames
            .into_iter()
            .map(|u| (u.into(), UserProfile::default()))
            .collect();
        Self {
            profiles: RwLock::new(profiles),
            disconnected: AtomicBool::new(false),
        }
    }

    /// Toggle disconnected (stale cache) mode.
    pub fn set_disconnected(&self, disconnected: bool) {
        self.disconnected.store(disconnected, Ordering::SeqCst);
    }

    fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn load(&self, username: &str) -> Result<LoadedProfile, StoreError> {
        let profiles = self.profiles.read().await;
        let from_cache = self.is_disconnected();
        debug!(username = %username, from_cache, "Loading profile");

        Ok(match profiles.get(username) {
            Some(profile) => LoadedProfile {
                profile: profile.clone(),
                exists: true,
                from_cache,
            },
            None => LoadedProfile {
                profile: UserProfile::default(),
                exists: false,
                from_cache,
            },
        })
    }

    async fn save(&self, username: &str, profile: &UserProfile) -> Result<(), StoreError> {
        if self.is_disconnected() {
            return Err(StoreError::Unreachable("store is disconnected".to_string()));
        }
        self.profiles
            .write()
            .await
            .insert(username.to_string(), profile.clone());
        Ok(())
    }

    async fn delete(&self, username: &str) -> Result<(), StoreError> {
        if self.is_disconnected() {
            return Err(StoreError::Unreachable("store is disconnected".to_string()));
        }
        self.profiles.write().await.remove(username);
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<String>, StoreError> {
        let mut users: Vec<String> = self.profiles.read().await.keys().cloned().collect();
        users.sort();
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_missing_user() {
        let store = MemoryProfileStore::new();
        let loaded = store.load("nobody").await.unwrap();
        assert!(!loaded.exists);
        assert!(!loaded.from_cache);
    }

    #[tokio::test]
    async fn test_save_and_list() {
        let store = MemoryProfileStore::with_users(["bob"]);
        store.save("alice", &UserProfile::default()).await.unwrap();

        assert!(store.load("alice").await.unwrap().exists);
        assert_eq!(store.list_users().await.unwrap(), vec!["alice", "bob"]);

        store.delete("bob").await.unwrap();
        assert_eq!(store.list_users().await.unwrap(), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_disconnected_mode() {
        let store = MemoryProfileStore::with_users(["alice"]);
        store.set_disconnected(true);

        let loaded = store.load("alice").await.unwrap();
        assert!(loaded.exists);
        assert!(loaded.from_cache);

        let result = store.save("alice", &UserProfile::default()).await;
        assert!(matches!(result, Err(StoreError::Unreachable(_))));
    }
}
