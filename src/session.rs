//! Credential lifecycle: connect, lazy refresh, disconnect.

use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    spotify::{Profile, SpotifyApi},
    store::{expiry_after, CredentialStore, UserCredential},
};

/// Lifetime assumed when the provider omits `expires_in`.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

/// Borrowed view over the injected store and provider for one request.
pub struct Session<'a> {
    pub spotify: &'a dyn SpotifyApi,
    pub credentials: &'a dyn CredentialStore,
}

impl Session<'_> {
    /// Completes the authorization code exchange and stores the result.
    pub async fn connect(
        &self,
        user_id: &str,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
        now: DateTime<Utc>,
    ) -> Result<Profile, AppError> {
        let grant = self
            .spotify
            .exchange_code(code, redirect_uri, code_verifier)
            .await?;
        tracing::info!("token exchange successful");
        if let Some(scope) = &grant.scope {
            tracing::debug!("granted scopes: {}", scope);
        }

        let refresh_token = grant.refresh_token.ok_or_else(|| {
            AppError::Upstream("token exchange returned no refresh token".into())
        })?;

        let profile = self.spotify.profile(&grant.access_token).await?;
        tracing::info!("Spotify profile fetched: {}", profile.id);

        let ttl = grant.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        self.credentials
            .store(user_id, &grant.access_token, &refresh_token, ttl, now)?;
        tracing::info!("tokens stored for user {}", user_id);

        Ok(profile)
    }

    /// Forgets the user's provider credential.
    pub fn disconnect(&self, user_id: &str) -> Result<bool, AppError> {
        let removed = self.credentials.delete(user_id)?;
        tracing::info!("disconnected user {} (row removed: {})", user_id, removed);
        Ok(removed)
    }

    pub fn is_connected(&self, user_id: &str) -> Result<bool, AppError> {
        Ok(self.credentials.get(user_id)?.is_some())
    }

    /// Returns a usable access token, refreshing it first if it has expired.
    pub async fn access_token(&self, user_id: &str, now: DateTime<Utc>) -> Result<String, AppError> {
        let credential = self.credentials.get(user_id)?.ok_or_else(|| {
            AppError::Auth("Spotify not connected. Please authenticate first.".into())
        })?;

        if !credential.is_expired(now) {
            return Ok(credential.access_token);
        }

        tracing::info!("token for user {} expired, refreshing", user_id);
        self.refresh(&credential, now).await
    }

    async fn refresh(&self, credential: &UserCredential, now: DateTime<Utc>) -> Result<String, AppError> {
        let grant = self.spotify.refresh(&credential.refresh_token).await?;
        let expires_at = expiry_after(now, grant.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS));

        let updated = self.credentials.update_access_token(
            &credential.user_id,
            &grant.access_token,
            grant.refresh_token.as_deref(),
            expires_at,
        )?;
        if !updated {
            tracing::warn!(
                "credential for user {} vanished during refresh",
                credential.user_id
            );
        }
        Ok(grant.access_token)
    }
}
