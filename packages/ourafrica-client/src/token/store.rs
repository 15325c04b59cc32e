//! Token Store: access/refresh tokens, last-known user and the temporary
//! registration token, written through to a durable `KeyValueStore`.
//!
//! Reads are served from memory so `is_authenticated()` can stay
//! synchronous; every write goes to durable storage before returning.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::is_expired;
use crate::auth::{CurrentUser, TokenPair};
use crate::storage::{KeyValueStore, StorageError};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const CURRENT_USER_KEY: &str = "current_user";
pub const REGISTRATION_TOKEN_KEY: &str = "registration_token";

#[derive(Debug, Default)]
struct Cached {
    access: Option<String>,
    refresh: Option<String>,
    user: Option<CurrentUser>,
    registration: Option<String>,
}

#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn KeyValueStore>,
    cache: Arc<RwLock<Cached>>,
}

impl TokenStore {
    /// Open the store, priming the in-memory copy from durable storage.
    pub async fn load(storage: Arc<dyn KeyValueStore>) -> Result<Self, StorageError> {
        let user = match storage.get(CURRENT_USER_KEY).await? {
            Some(raw) => serde_json::from_str(&raw).ok(),
            None => None,
        };

        let cached = Cached {
            access: storage.get(ACCESS_TOKEN_KEY).await?,
            refresh: storage.get(REFRESH_TOKEN_KEY).await?,
            user,
            registration: storage.get(REGISTRATION_TOKEN_KEY).await?,
        };

        debug!(
            has_access = cached.access.is_some(),
            has_refresh = cached.refresh.is_some(),
            "Token store loaded"
        );

        Ok(Self {
            storage,
            cache: Arc::new(RwLock::new(cached)),
        })
    }

    fn read<R>(&self, f: impl FnOnce(&Cached) -> R) -> R {
        f(&self.cache.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write(&self, f: impl FnOnce(&mut Cached)) {
        f(&mut self.cache.write().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(|c| c.access.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(|c| c.refresh.clone())
    }

    pub fn cached_user(&self) -> Option<CurrentUser> {
        self.read(|c| c.user.clone())
    }

    pub fn registration_token(&self) -> Option<String> {
        self.read(|c| c.registration.clone())
    }

    pub async fn set_tokens(&self, tokens: &TokenPair) -> Result<(), StorageError> {
        self.write(|c| {
            c.access = Some(tokens.access_token.clone());
            c.refresh = Some(tokens.refresh_token.clone());
        });
        self.storage.set(ACCESS_TOKEN_KEY, &tokens.access_token).await?;
        self.storage.set(REFRESH_TOKEN_KEY, &tokens.refresh_token).await
    }

    /// Drops both tokens. The cached user record stays.
    pub async fn clear_tokens(&self) -> Result<(), StorageError> {
        self.write(|c| {
            c.access = None;
            c.refresh = None;
        });
        self.storage.remove(ACCESS_TOKEN_KEY).await?;
        self.storage.remove(REFRESH_TOKEN_KEY).await
    }

    pub async fn set_user(&self, user: &CurrentUser) -> Result<(), StorageError> {
        self.write(|c| c.user = Some(user.clone()));
        self.storage
            .set(CURRENT_USER_KEY, &serde_json::to_string(user)?)
            .await
    }

    pub async fn set_registration_token(&self, token: &str) -> Result<(), StorageError> {
        self.write(|c| c.registration = Some(token.to_string()));
        self.storage.set(REGISTRATION_TOKEN_KEY, token).await
    }

    pub async fn clear_registration_token(&self) -> Result<(), StorageError> {
        self.write(|c| c.registration = None);
        self.storage.remove(REGISTRATION_TOKEN_KEY).await
    }

    /// Absent tokens count as expired.
    pub fn is_access_token_expired(&self) -> bool {
        self.access_token().map(|t| is_expired(&t)).unwrap_or(true)
    }

    pub fn is_refresh_token_expired(&self) -> bool {
        self.refresh_token().map(|t| is_expired(&t)).unwrap_or(true)
    }

    /// A live access token, or a live refresh token to renew one from.
    pub fn has_valid_session(&self) -> bool {
        !self.is_access_token_expired() || !self.is_refresh_token_expired()
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.read(|c| {
            f.debug_struct("TokenStore")
                .field("has_access", &c.access.is_some())
                .field("has_refresh", &c.refresh.is_some())
                .field("has_user", &c.user.is_some())
                .finish()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::testing::{sample_user, token_expiring_in};

    #[tokio::test]
    async fn test_round_trip_is_byte_identical() {
        let store = TokenStore::load(Arc::new(MemoryStore::new())).await.unwrap();
        let pair = TokenPair {
            access_token: token_expiring_in(900),
            refresh_token: "opaque.refresh-token.ÿ".to_string(),
        };

        store.set_tokens(&pair).await.unwrap();

        assert_eq!(store.access_token().unwrap().as_bytes(), pair.access_token.as_bytes());
        assert_eq!(store.refresh_token().unwrap().as_bytes(), pair.refresh_token.as_bytes());
    }

    #[tokio::test]
    async fn test_reload_from_durable_storage() {
        let storage = Arc::new(MemoryStore::new());
        let store = TokenStore::load(storage.clone()).await.unwrap();
        store
            .set_tokens(&TokenPair {
                access_token: token_expiring_in(900),
                refresh_token: token_expiring_in(9000),
            })
            .await
            .unwrap();
        store.set_user(&sample_user("u1", "ada@example.com")).await.unwrap();

        let reopened = TokenStore::load(storage).await.unwrap();
        assert_eq!(reopened.access_token(), store.access_token());
        assert_eq!(reopened.cached_user().unwrap().id, "u1");
        assert!(reopened.has_valid_session());
    }

    #[tokio::test]
    async fn test_clear_tokens_keeps_user() {
        let storage = Arc::new(MemoryStore::new());
        let store = TokenStore::load(storage.clone()).await.unwrap();
        store
            .set_tokens(&TokenPair {
                access_token: token_expiring_in(900),
                refresh_token: token_expiring_in(9000),
            })
            .await
            .unwrap();
        store.set_user(&sample_user("u1", "ada@example.com")).await.unwrap();

        store.clear_tokens().await.unwrap();

        assert!(store.access_token().is_none());
        assert!(!store.has_valid_session());
        assert!(storage.get(ACCESS_TOKEN_KEY).await.unwrap().is_none());
        assert!(store.cached_user().is_some());
    }

    #[tokio::test]
    async fn test_refresh_token_keeps_session_valid() {
        let store = TokenStore::load(Arc::new(MemoryStore::new())).await.unwrap();
        store
            .set_tokens(&TokenPair {
                access_token: token_expiring_in(-60),
                refresh_token: token_expiring_in(3600),
            })
            .await
            .unwrap();

        assert!(store.is_access_token_expired());
        assert!(!store.is_refresh_token_expired());
        assert!(store.has_valid_session());
    }
}
