use std::sync::Arc;

use crate::{
    identity::IdentityResolver,
    pkce::PendingAuthorizations,
    session::Session,
    spotify::SpotifyApi,
    store::CredentialStore,
};

/// Values needed to build the provider consent URL.
#[derive(Debug, Clone)]
pub struct AuthorizeSettings {
    pub accounts_url: String,
    pub client_id: String,
}

/// Shared handler state. Every dependency is injected behind a trait object.
#[derive(Clone)]
pub struct AppState {
    pub spotify: Arc<dyn SpotifyApi>,
    pub credentials: Arc<dyn CredentialStore>,
    pub identity: Arc<dyn IdentityResolver>,
    pub pending: PendingAuthorizations,
    pub authorize: AuthorizeSettings,
}

impl AppState {
    pub fn session(&self) -> Session<'_> {
        Session {
            spotify: self.spotify.as_ref(),
            credentials: self.credentials.as_ref(),
        }
    }
}
