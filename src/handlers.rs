//! HTTP handlers for the mood recommendation API.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::error::AppError;
use crate::identity::Caller;
use crate::pkce::{AuthorizeRequest, PkcePair};
use crate::recommend::{self, SeedRequest};
use crate::spotify::{Profile, Track};
use crate::state::AppState;

pub const DEFAULT_SEARCH_LIMIT: u32 = 10;
pub const MAX_SEARCH_LIMIT: u32 = 50;

/// Query parameters for the authorize URL endpoint.
#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub redirect_uri: String,
}

#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub url: String,
    /// Hand back to `/auth/exchange` so the server can find the verifier.
    pub state: String,
}

/// Body of the code exchange endpoint.
#[derive(Debug, Deserialize)]
pub struct ExchangeRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default, alias = "redirectUri")]
    pub redirect_uri: String,
    #[serde(default, alias = "codeVerifier")]
    pub code_verifier: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExchangeResponse {
    pub success: bool,
    pub profile: Profile,
}

#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    pub connected: bool,
}

#[derive(Debug, Serialize)]
pub struct DisconnectResponse {
    pub success: bool,
}

/// Body of the recommendations endpoint.
#[derive(Debug, Deserialize)]
pub struct RecommendationsRequest {
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default, rename = "trackId")]
    pub track_id: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub tracks: Vec<Track>,
}

/// Body of the search endpoint.
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| AppError::Validation(e.body_text()))
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    params
        .map(|Query(value)| value)
        .map_err(|e| AppError::Validation(e.body_text()))
}

/// GET /health - Health check.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/v1/auth/url - Start a PKCE authorization.
pub async fn authorize_url(
    State(state): State<AppState>,
    params: Result<Query<AuthorizeQuery>, QueryRejection>,
) -> Result<Json<AuthorizeResponse>, AppError> {
    let params = query(params)?;
    if params.redirect_uri.trim().is_empty() {
        return Err(AppError::Validation("redirect_uri is required".into()));
    }

    let pair = PkcePair::generate();
    let pending_state = state.pending.insert(&pair, Utc::now());
    let url = AuthorizeRequest {
        accounts_url: &state.authorize.accounts_url,
        client_id: &state.authorize.client_id,
        redirect_uri: &params.redirect_uri,
        code_challenge: &pair.challenge,
        state: &pending_state,
    }
    .url();

    Ok(Json(AuthorizeResponse {
        url,
        state: pending_state,
    }))
}

/// POST /api/v1/auth/exchange - Trade the authorization code for tokens.
pub async fn exchange(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<ExchangeRequest>, JsonRejection>,
) -> Result<Json<ExchangeResponse>, AppError> {
    let req = body(payload)?;
    tracing::info!("Spotify auth callback received, has code: {}", !req.code.is_empty());

    if req.code.trim().is_empty() {
        return Err(AppError::Validation("Authorization code is required".into()));
    }
    if req.redirect_uri.trim().is_empty() {
        return Err(AppError::Validation("redirect_uri is required".into()));
    }

    // The pending entry is consumed even when the body carries the verifier.
    let now = Utc::now();
    let pending_verifier = req
        .state
        .as_deref()
        .and_then(|s| state.pending.take(s, now));
    let verifier = req
        .code_verifier
        .filter(|v| !v.is_empty())
        .or(pending_verifier)
        .ok_or_else(|| {
            AppError::Validation("code_verifier or a valid authorization state is required".into())
        })?;

    let profile = state
        .session()
        .connect(&caller.user_id, &req.code, &req.redirect_uri, &verifier, now)
        .await?;

    Ok(Json(ExchangeResponse {
        success: true,
        profile,
    }))
}

/// GET /api/v1/auth/connection - Whether the caller has linked Spotify.
pub async fn connection(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ConnectionResponse>, AppError> {
    let connected = state.session().is_connected(&caller.user_id)?;
    Ok(Json(ConnectionResponse { connected }))
}

/// DELETE /api/v1/auth/connection - Forget the caller's Spotify tokens.
pub async fn disconnect(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<DisconnectResponse>, AppError> {
    state.session().disconnect(&caller.user_id)?;
    Ok(Json(DisconnectResponse { success: true }))
}

/// POST /api/v1/recommendations - Mood or track seeded recommendations.
pub async fn recommendations(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<RecommendationsRequest>, JsonRejection>,
) -> Result<Json<RecommendationsResponse>, AppError> {
    let req = body(payload)?;
    tracing::info!(
        "recommendations request: mood={:?} track_id={:?} limit={:?}",
        req.mood,
        req.track_id,
        req.limit
    );

    let seed_request = SeedRequest::resolve(req.mood.as_deref(), req.track_id.as_deref())?;
    let limit = recommend::clamp_limit(req.limit);

    let access_token = state
        .session()
        .access_token(&caller.user_id, Utc::now())
        .await?;

    let seeding = recommend::seed(state.spotify.as_ref(), &access_token, seed_request).await?;
    let query = recommend::build_query(limit, &seeding);
    let tracks = state.spotify.recommendations(&access_token, &query).await?;
    tracing::info!("found {} recommendations", tracks.len());

    Ok(Json(RecommendationsResponse { tracks }))
}

/// POST /api/v1/search - Catalog search, provider payload passed through.
pub async fn search(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    let req = body(payload)?;
    if req.query.trim().is_empty() {
        return Err(AppError::Validation("Search query is required".into()));
    }

    let kind = req.kind.as_deref().unwrap_or("track");
    let limit = req
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);
    tracing::info!("search request: query={:?} type={} limit={}", req.query, kind, limit);

    let access_token = state
        .session()
        .access_token(&caller.user_id, Utc::now())
        .await?;

    let results = state
        .spotify
        .search(&access_token, &req.query, kind, limit)
        .await?;
    Ok(Json(results))
}

/// Any origin may call the API from a browser.
pub fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ])
}

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/auth/url", get(authorize_url))
        .route("/api/v1/auth/exchange", post(exchange))
        .route(
            "/api/v1/auth/connection",
            get(connection).delete(disconnect),
        )
        .route("/api/v1/recommendations", post(recommendations))
        .route("/api/v1/search", post(search))
        .layer(cors())
}
