use std::env;

pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.spotify.com";
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
/// `DATABASE_PATH` value selecting the process-local credential store.
pub const MEMORY_DATABASE: &str = "memory";

/// Application configuration from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub spotify_accounts_url: String,
    pub spotify_api_url: String,
    pub database_path: String,
    pub identity_url: String,
    pub identity_api_key: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8081);

        let spotify_client_id = env::var("SPOTIFY_CLIENT_ID")
            .map_err(|_| anyhow::anyhow!("SPOTIFY_CLIENT_ID is required"))?;

        let spotify_client_secret = env::var("SPOTIFY_CLIENT_SECRET")
            .map_err(|_| anyhow::anyhow!("SPOTIFY_CLIENT_SECRET is required"))?;

        let spotify_accounts_url =
            env::var("SPOTIFY_ACCOUNTS_URL").unwrap_or_else(|_| DEFAULT_ACCOUNTS_URL.into());
        let spotify_api_url =
            env::var("SPOTIFY_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());

        let database_path = env::var("DATABASE_PATH").unwrap_or_else(|_| "mood-recs.db".into());

        let identity_url = env::var("IDENTITY_URL")
            .map_err(|_| anyhow::anyhow!("IDENTITY_URL is required"))?;

        let identity_api_key = env::var("IDENTITY_API_KEY")
            .map_err(|_| anyhow::anyhow!("IDENTITY_API_KEY is required"))?;

        Ok(Self {
            port,
            spotify_client_id,
            spotify_client_secret,
            spotify_accounts_url: spotify_accounts_url.trim_end_matches('/').to_string(),
            spotify_api_url: spotify_api_url.trim_end_matches('/').to_string(),
            database_path,
            identity_url,
            identity_api_key,
        })
    }
}
