//! Resolves the caller's bearer credential to a user id.

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::{error::AppError, state::AppState, store::UserId};

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, bearer: &str) -> Result<UserId, AppError>;
}

/// Asks the hosted auth service who owns a bearer token
/// (`GET {url}` with the token and the project api key).
pub struct RemoteIdentityResolver {
    client: Client,
    url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct UserResponse {
    id: String,
}

impl RemoteIdentityResolver {
    pub fn new(url: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            url,
            api_key,
        }
    }
}

#[async_trait]
impl IdentityResolver for RemoteIdentityResolver {
    async fn resolve(&self, bearer: &str) -> Result<UserId, AppError> {
        let res = self
            .client
            .get(&self.url)
            .header("Authorization", format!("Bearer {}", bearer))
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("identity request failed: {}", e)))?;

        match res.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(AppError::Auth("Failed to get authenticated user".into()));
            }
            status if !status.is_success() => {
                return Err(AppError::Upstream(format!(
                    "identity service error {}",
                    status
                )));
            }
            _ => {}
        }

        let user: UserResponse = res
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("identity parse failed: {}", e)))?;
        Ok(user.id)
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

/// Authenticated caller of an `/api/v1` route.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: UserId,
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Auth("No authorization header".into()))?;
        let user_id = state.identity.resolve(token).await?;
        tracing::debug!("resolved caller {}", user_id);
        Ok(Caller { user_id })
    }
}
