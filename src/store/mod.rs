//! Per-user provider credential storage.

mod memory;
mod sqlite;

pub use memory::InMemoryCredentialStore;
pub use sqlite::SqliteCredentialStore;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

pub type UserId = String;

/// Longest token lifetime accepted from the provider.
pub const MAX_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

/// `now + ttl_seconds`, with the lifetime capped at [`MAX_TOKEN_TTL_SECS`].
pub fn expiry_after(now: DateTime<Utc>, ttl_seconds: u64) -> DateTime<Utc> {
    if ttl_seconds > MAX_TOKEN_TTL_SECS {
        tracing::warn!(
            "token lifetime of {}s exceeds {}s, capping",
            ttl_seconds,
            MAX_TOKEN_TTL_SECS
        );
    }
    let secs = i64::try_from(ttl_seconds.min(MAX_TOKEN_TTL_SECS)).unwrap_or(0);
    Duration::try_seconds(secs)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Provider tokens for one user. At most one per `user_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCredential {
    pub user_id: UserId,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl UserCredential {
    pub fn new(
        user_id: &str,
        access_token: &str,
        refresh_token: &str,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expires_at: expiry_after(now, ttl_seconds),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

pub trait CredentialStore: Send + Sync {
    /// Inserts or replaces the credential of `credential.user_id`.
    fn upsert(&self, credential: &UserCredential) -> Result<()>;

    fn get(&self, user_id: &str) -> Result<Option<UserCredential>>;

    /// Replaces the access token and expiry after a refresh. A `None`
    /// refresh token keeps the stored one. Returns false if no row exists.
    fn update_access_token(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Returns true if a row was removed.
    fn delete(&self, user_id: &str) -> Result<bool>;

    fn store(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: &str,
        ttl_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<UserCredential> {
        let credential = UserCredential::new(user_id, access_token, refresh_token, ttl_seconds, now);
        self.upsert(&credential)?;
        Ok(credential)
    }
}
