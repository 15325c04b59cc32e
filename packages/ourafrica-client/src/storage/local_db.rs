//! Embedded local database port.
//!
//! The client only needs a handful of record operations from the embedded
//! database, so it is modelled as a trait and the schema stays behind it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{KeyValueStore, StorageError};
use crate::auth::{CurrentUser, TokenPair};
use crate::token;

const TOKENS_KEY: &str = "db.auth_tokens";
const USERS_KEY: &str = "db.users";
const CURRENT_USER_KEY: &str = "db.current_user_id";

/// A token row as kept by the local database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    pub token_type: String,
    /// RFC 3339; empty when the token carries no readable `exp`
    pub expires_at: String,
    pub created_at: String,
    pub is_refresh_token: bool,
}

impl StoredToken {
    pub fn new(token: &str, is_refresh_token: bool) -> Self {
        Self {
            token: token.to_string(),
            token_type: "Bearer".to_string(),
            expires_at: token::expires_at(token)
                .map(|exp| exp.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            is_refresh_token,
        }
    }

    /// Unknown or malformed expiry counts as expired.
    pub fn is_expired(&self) -> bool {
        token::is_expiry_passed(&self.expires_at).unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access: Option<StoredToken>,
    pub refresh: Option<StoredToken>,
}

impl StoredTokens {
    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }
}

#[async_trait]
pub trait LocalDatabase: Send + Sync {
    async fn get_auth_tokens(&self) -> Result<StoredTokens, StorageError>;

    /// Replaces any previously saved pair.
    async fn save_auth_tokens(&self, tokens: &TokenPair) -> Result<(), StorageError>;

    /// Removes tokens only. User records are kept for offline sign-in.
    async fn clear_auth_tokens(&self) -> Result<(), StorageError>;

    async fn get_current_user(&self) -> Result<Option<CurrentUser>, StorageError>;

    /// Insert or replace by id; also marks the user as current.
    async fn save_user(&self, user: &CurrentUser) -> Result<(), StorageError>;

    async fn get_user_by_email(&self, email: &str) -> Result<Option<CurrentUser>, StorageError>;
}

/// `LocalDatabase` laid over any `KeyValueStore`.
#[derive(Debug, Clone)]
pub struct KvDatabase<S> {
    store: S,
}

impl<S: KeyValueStore> KvDatabase<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    async fn users(&self) -> Result<Vec<CurrentUser>, StorageError> {
        match self.store.get(USERS_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl<S: KeyValueStore> LocalDatabase for KvDatabase<S> {
    async fn get_auth_tokens(&self) -> Result<StoredTokens, StorageError> {
        match self.store.get(TOKENS_KEY).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(StoredTokens::default()),
        }
    }

    async fn save_auth_tokens(&self, tokens: &TokenPair) -> Result<(), StorageError> {
        let rows = StoredTokens {
            access: Some(StoredToken::new(&tokens.access_token, false)),
            refresh: Some(StoredToken::new(&tokens.refresh_token, true)),
        };
        self.store
            .set(TOKENS_KEY, &serde_json::to_string(&rows)?)
            .await
    }

    async fn clear_auth_tokens(&self) -> Result<(), StorageError> {
        self.store.remove(TOKENS_KEY).await
    }

    async fn get_current_user(&self) -> Result<Option<CurrentUser>, StorageError> {
        let users = self.users().await?;
        let current = self.store.get(CURRENT_USER_KEY).await?;

        Ok(match current {
            Some(id) => users.into_iter().find(|u| u.id == id),
            None => users.into_iter().next(),
        })
    }

    async fn save_user(&self, user: &CurrentUser) -> Result<(), StorageError> {
        let mut record = user.clone();
        if record.full_name.is_none() {
            record.full_name = Some(record.derived_full_name());
        }

        let mut users = self.users().await?;
        match users.iter_mut().find(|u| u.id == record.id) {
            Some(existing) => *existing = record,
            None => users.push(record),
        }

        self.store
            .set(USERS_KEY, &serde_json::to_string(&users)?)
            .await?;
        self.store.set(CURRENT_USER_KEY, &user.id).await?;

        debug!(user_id = %user.id, cached_users = users.len(), "User cached locally");
        Ok(())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<CurrentUser>, StorageError> {
        Ok(self
            .users()
            .await?
            .into_iter()
            .find(|u| u.email.eq_ignore_ascii_case(email)))
    }
}

#[async_trait]
impl<D: LocalDatabase + ?Sized> LocalDatabase for Arc<D> {
    async fn get_auth_tokens(&self) -> Result<StoredTokens, StorageError> {
        (**self).get_auth_tokens().await
    }

    async fn save_auth_tokens(&self, tokens: &TokenPair) -> Result<(), StorageError> {
        (**self).save_auth_tokens(tokens).await
    }

    async fn clear_auth_tokens(&self) -> Result<(), StorageError> {
        (**self).clear_auth_tokens().await
    }

    async fn get_current_user(&self) -> Result<Option<CurrentUser>, StorageError> {
        (**self).get_current_user().await
    }

    async fn save_user(&self, user: &CurrentUser) -> Result<(), StorageError> {
        (**self).save_user(user).await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<CurrentUser>, StorageError> {
        (**self).get_user_by_email(email).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::testing::{sample_user, token_expiring_in};

    #[tokio::test]
    async fn test_tokens_saved_with_expiry() {
        let db = KvDatabase::new(MemoryStore::new());
        let pair = TokenPair {
            access_token: token_expiring_in(3600),
            refresh_token: token_expiring_in(86_400),
        };

        db.save_auth_tokens(&pair).await.unwrap();
        let stored = db.get_auth_tokens().await.unwrap();

        let access = stored.access.unwrap();
        assert_eq!(access.token, pair.access_token);
        assert_eq!(access.token_type, "Bearer");
        assert!(!access.is_expired());
        assert!(stored.refresh.unwrap().is_refresh_token);
    }

    #[tokio::test]
    async fn test_clear_tokens_keeps_users() {
        let db = KvDatabase::new(MemoryStore::new());
        db.save_user(&sample_user("u1", "ada@example.com")).await.unwrap();
        db.save_auth_tokens(&TokenPair {
            access_token: token_expiring_in(60),
            refresh_token: token_expiring_in(600),
        })
        .await
        .unwrap();

        db.clear_auth_tokens().await.unwrap();

        assert!(db.get_auth_tokens().await.unwrap().is_empty());
        assert!(db.get_current_user().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_save_user_upserts_and_derives_full_name() {
        let db = KvDatabase::new(MemoryStore::new());
        let mut user = sample_user("u1", "ada@example.com");
        db.save_user(&user).await.unwrap();

        user.bio = Some("Updated".into());
        db.save_user(&user).await.unwrap();
        db.save_user(&sample_user("u2", "kofi@example.com")).await.unwrap();

        let found = db.get_user_by_email("ADA@example.com").await.unwrap().unwrap();
        assert_eq!(found.bio.as_deref(), Some("Updated"));
        assert_eq!(found.full_name.as_deref(), Some("Ada Obi"));

        let current = db.get_current_user().await.unwrap().unwrap();
        assert_eq!(current.id, "u2");
        assert!(db.get_user_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[test]
    fn test_stored_token_without_exp_is_expired() {
        let token = StoredToken::new("opaque", false);
        assert!(token.expires_at.is_empty());
        assert!(token.is_expired());
    }
}
