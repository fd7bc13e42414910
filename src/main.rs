mod config;
mod error;
mod handlers;
mod identity;
mod mood;
mod pkce;
mod recommend;
mod session;
mod spotify;
mod state;
mod store;

use std::{net::SocketAddr, sync::Arc};

use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, MEMORY_DATABASE};
use crate::handlers::router;
use crate::identity::RemoteIdentityResolver;
use crate::pkce::PendingAuthorizations;
use crate::spotify::SpotifyClient;
use crate::state::{AppState, AuthorizeSettings};
use crate::store::{CredentialStore, InMemoryCredentialStore, SqliteCredentialStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let spotify = SpotifyClient::new(
        config.spotify_client_id,
        config.spotify_client_secret,
        config.spotify_accounts_url,
        config.spotify_api_url,
    );
    let authorize = AuthorizeSettings {
        accounts_url: spotify.accounts_url().to_string(),
        client_id: spotify.client_id().to_string(),
    };
    let credentials: Arc<dyn CredentialStore> = if config.database_path == MEMORY_DATABASE {
        tracing::warn!("using in-memory credential store, tokens are lost on restart");
        Arc::new(InMemoryCredentialStore::default())
    } else {
        Arc::new(SqliteCredentialStore::open(&config.database_path)?)
    };
    let identity = RemoteIdentityResolver::new(config.identity_url, config.identity_api_key);

    let state = AppState {
        spotify: Arc::new(spotify),
        credentials,
        identity: Arc::new(identity),
        pending: PendingAuthorizations::default(),
        authorize,
    };

    let app = router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("listening on {}", addr);

    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service(),
    )
    .await?;

    Ok(())
}
