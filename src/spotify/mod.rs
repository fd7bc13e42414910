//! Spotify accounts service and Web API client.
//!
//! Uses the Authorization Code flow with PKCE; the client secret is sent as
//! HTTP Basic credentials on every token endpoint call.

mod models;

pub use models::*;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Provider operations used by the service. Injected so handlers and the
/// token refresher never reach for a process-wide client.
#[async_trait]
pub trait SpotifyApi: Send + Sync {
    /// Exchanges an authorization code (plus PKCE verifier) for tokens.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenGrant, AppError>;

    /// Trades a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AppError>;

    async fn profile(&self, access_token: &str) -> Result<Profile, AppError>;

    async fn top_tracks(
        &self,
        access_token: &str,
        limit: u32,
        time_range: &str,
    ) -> Result<Vec<Track>, AppError>;

    /// `query` is the already encoded query string of `/recommendations`.
    async fn recommendations(&self, access_token: &str, query: &str)
        -> Result<Vec<Track>, AppError>;

    async fn search(
        &self,
        access_token: &str,
        q: &str,
        kind: &str,
        limit: u32,
    ) -> Result<serde_json::Value, AppError>;
}

/// reqwest-backed [`SpotifyApi`].
#[derive(Clone)]
pub struct SpotifyClient {
    client: Client,
    client_id: String,
    client_secret: String,
    accounts_url: String,
    api_url: String,
}

impl SpotifyClient {
    pub fn new(
        client_id: String,
        client_secret: String,
        accounts_url: String,
        api_url: String,
    ) -> Self {
        Self {
            client: Client::new(),
            client_id,
            client_secret,
            accounts_url,
            api_url,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn accounts_url(&self) -> &str {
        &self.accounts_url
    }

    fn basic_auth(&self) -> String {
        let auth = base64::engine::general_purpose::STANDARD.encode(
            format!("{}:{}", self.client_id, self.client_secret).as_bytes(),
        );
        format!("Basic {}", auth)
    }

    async fn token_request(&self, form: &[(&str, &str)], what: &str) -> Result<TokenGrant, AppError> {
        let res = self
            .client
            .post(format!("{}/api/token", self.accounts_url))
            .header("Authorization", self.basic_auth())
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("{} request failed: {}", what, e)))?;

        if res.status() == StatusCode::BAD_REQUEST || res.status() == StatusCode::UNAUTHORIZED {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            tracing::warn!("{} rejected: {} - {}", what, status, body);
            return Err(AppError::Auth(format!(
                "{} rejected by Spotify, please reconnect your account",
                what
            )));
        }

        parse(res, what).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        access_token: &str,
        url: &str,
        what: &str,
    ) -> Result<T, AppError> {
        let res = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", access_token))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("{} request failed: {}", what, e)))?;

        parse(res, what).await
    }
}

async fn parse<T: DeserializeOwned>(res: Response, what: &str) -> Result<T, AppError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            return Err(AppError::Auth(format!("Spotify rejected credentials: {}", body)));
        }
        return Err(AppError::Upstream(format!(
            "Spotify API error {}: {}",
            status, body
        )));
    }

    res.json()
        .await
        .map_err(|e| AppError::Upstream(format!("{} parse failed: {}", what, e)))
}

#[async_trait]
impl SpotifyApi for SpotifyClient {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenGrant, AppError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.client_id.as_str()),
            ("code_verifier", code_verifier),
        ];
        self.token_request(&params, "code exchange").await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AppError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.token_request(&params, "token refresh").await
    }

    async fn profile(&self, access_token: &str) -> Result<Profile, AppError> {
        self.get(access_token, &format!("{}/me", self.api_url), "profile")
            .await
    }

    async fn top_tracks(
        &self,
        access_token: &str,
        limit: u32,
        time_range: &str,
    ) -> Result<Vec<Track>, AppError> {
        let url = format!(
            "{}/me/top/tracks?limit={}&time_range={}",
            self.api_url,
            limit,
            urlencoding::encode(time_range),
        );
        let page: Paging<Track> = self.get(access_token, &url, "top tracks").await?;
        Ok(page.items)
    }

    async fn recommendations(
        &self,
        access_token: &str,
        query: &str,
    ) -> Result<Vec<Track>, AppError> {
        let url = format!("{}/recommendations?{}", self.api_url, query);
        tracing::debug!("Spotify recommendations request: {}", url);
        let body: RecommendationsResponse =
            self.get(access_token, &url, "recommendations").await?;
        Ok(body.tracks)
    }

    async fn search(
        &self,
        access_token: &str,
        q: &str,
        kind: &str,
        limit: u32,
    ) -> Result<serde_json::Value, AppError> {
        let url = format!(
            "{}/search?q={}&type={}&limit={}",
            self.api_url,
            urlencoding::encode(q),
            urlencoding::encode(kind),
            limit,
        );
        self.get(access_token, &url, "search").await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use axum::{
        extract::{Query, State},
        http::{header::AUTHORIZATION, HeaderMap},
        response::{IntoResponse, Response},
        routing::{get, post},
        Form, Json, Router,
    };
    use serde_json::json;

    use super::*;

    /// Serves `app` on an ephemeral loopback port and returns its base url.
    pub(crate) async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[derive(Clone, Default)]
    struct Recorded {
        forms: Arc<Mutex<Vec<HashMap<String, String>>>>,
        basic: Arc<Mutex<Option<String>>>,
        queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    }

    async fn token(
        State(seen): State<Recorded>,
        headers: HeaderMap,
        Form(form): Form<HashMap<String, String>>,
    ) -> Response {
        *seen.basic.lock().unwrap() = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let key = form
            .get("refresh_token")
            .or_else(|| form.get("code"))
            .cloned()
            .unwrap_or_default();
        seen.forms.lock().unwrap().push(form);

        match key.as_str() {
            "revoked" => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_grant" })),
            )
                .into_response(),
            "unknown-client" => StatusCode::UNAUTHORIZED.into_response(),
            "boom" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            _ => Json(json!({
                "access_token": "fresh",
                "token_type": "Bearer",
                "refresh_token": "next",
                "expires_in": 3600,
                "scope": "user-top-read"
            }))
            .into_response(),
        }
    }

    fn bearer(headers: &HeaderMap) -> &str {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or_default()
    }

    async fn me(headers: HeaderMap) -> Response {
        match bearer(&headers) {
            "expired" => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": { "status": 401, "message": "The access token expired" } })),
            )
                .into_response(),
            "broken" => StatusCode::SERVICE_UNAVAILABLE.into_response(),
            "garbled" => "not json".into_response(),
            _ => Json(json!({
                "id": "spotify-user",
                "display_name": "Listener",
                "images": []
            }))
            .into_response(),
        }
    }

    fn track(id: &str) -> serde_json::Value {
        json!({ "id": id, "name": format!("Song {}", id), "artists": [{ "id": "a1", "name": "Band" }] })
    }

    async fn top_tracks(
        State(seen): State<Recorded>,
        Query(query): Query<HashMap<String, String>>,
    ) -> Json<serde_json::Value> {
        seen.queries.lock().unwrap().push(query);
        Json(json!({ "items": [track("t1"), track("t2")], "total": 2 }))
    }

    async fn recommendations(
        State(seen): State<Recorded>,
        Query(query): Query<HashMap<String, String>>,
    ) -> Json<serde_json::Value> {
        seen.queries.lock().unwrap().push(query);
        Json(json!({ "tracks": [track("r1")], "seeds": [] }))
    }

    async fn client() -> (SpotifyClient, Recorded) {
        let seen = Recorded::default();
        let accounts = serve(
            Router::new()
                .route("/api/token", post(token))
                .with_state(seen.clone()),
        )
        .await;
        let api = serve(
            Router::new()
                .route("/v1/me", get(me))
                .route("/v1/me/top/tracks", get(top_tracks))
                .route("/v1/recommendations", get(recommendations))
                .with_state(seen.clone()),
        )
        .await;
        let client = SpotifyClient::new("id".into(), "secret".into(), accounts, format!("{}/v1", api));
        (client, seen)
    }

    fn last_form(seen: &Recorded) -> HashMap<String, String> {
        seen.forms.lock().unwrap().last().cloned().unwrap()
    }

    #[tokio::test]
    async fn code_exchange_posts_pkce_form_with_basic_auth() {
        let (client, seen) = client().await;
        let grant = client
            .exchange_code("auth-code", "http://localhost/callback", "verifier-123")
            .await
            .unwrap();

        assert_eq!(grant.access_token, "fresh");
        assert_eq!(grant.refresh_token.as_deref(), Some("next"));
        assert_eq!(grant.expires_in, Some(3600));

        let form = last_form(&seen);
        assert_eq!(form["grant_type"], "authorization_code");
        assert_eq!(form["code"], "auth-code");
        assert_eq!(form["redirect_uri"], "http://localhost/callback");
        assert_eq!(form["client_id"], "id");
        assert_eq!(form["code_verifier"], "verifier-123");
        // base64("id:secret")
        assert_eq!(
            seen.basic.lock().unwrap().as_deref(),
            Some("Basic aWQ6c2VjcmV0")
        );
    }

    #[tokio::test]
    async fn refresh_posts_refresh_grant() {
        let (client, seen) = client().await;
        let grant = client.refresh("r1").await.unwrap();
        assert_eq!(grant.access_token, "fresh");

        let form = last_form(&seen);
        assert_eq!(form["grant_type"], "refresh_token");
        assert_eq!(form["refresh_token"], "r1");
        assert!(!form.contains_key("code_verifier"));
    }

    #[tokio::test]
    async fn rejected_grants_are_auth_errors() {
        let (client, _) = client().await;
        let err = client.refresh("revoked").await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)), "{:?}", err);

        let err = client
            .exchange_code("unknown-client", "http://localhost/callback", "v")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn token_endpoint_outage_is_upstream_error() {
        let (client, _) = client().await;
        let err = client.refresh("boom").await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn web_api_status_mapping() {
        let (client, _) = client().await;
        assert_eq!(client.profile("live").await.unwrap().id, "spotify-user");

        let err = client.profile("expired").await.unwrap_err();
        assert!(matches!(err, AppError::Auth(_)), "{:?}", err);

        let err = client.profile("broken").await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)), "{:?}", err);

        let err = client.profile("garbled").await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn top_tracks_and_recommendations_parse() {
        let (client, seen) = client().await;

        let top = client.top_tracks("live", 5, "medium_term").await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].artists[0].name, "Band");

        let tracks = client
            .recommendations("live", "limit=20&seed_genres=pop%2Cdance")
            .await
            .unwrap();
        assert_eq!(tracks[0].id, "r1");

        let queries = seen.queries.lock().unwrap();
        assert_eq!(queries[0]["limit"], "5");
        assert_eq!(queries[0]["time_range"], "medium_term");
        assert_eq!(queries[1]["seed_genres"], "pop,dance");
    }

    #[tokio::test]
    async fn unreachable_provider_is_upstream_error() {
        let client = SpotifyClient::new(
            "id".into(),
            "secret".into(),
            "http://127.0.0.1:9".into(),
            "http://127.0.0.1:9/v1".into(),
        );
        let err = client.refresh("r1").await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)), "{:?}", err);
    }
}
