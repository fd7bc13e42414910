//! PKCE verifier/challenge generation and the pending-authorization store.
//!
//! The verifier is kept server side, keyed by the opaque `state` handed to the
//! browser, and is removed the first time it is looked up.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::{distr::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

pub const VERIFIER_LEN: usize = 64;
const STATE_LEN: usize = 32;
/// Upper bound on outstanding authorizations; the oldest is evicted first.
pub const MAX_PENDING: usize = 1024;

pub const SCOPES: &[&str] = &[
    "user-read-private",
    "user-read-email",
    "user-top-read",
    "user-library-read",
    "playlist-read-private",
    "user-read-recently-played",
];

fn random_string(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn generate_code_verifier() -> String {
    random_string(VERIFIER_LEN)
}

pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        let verifier = generate_code_verifier();
        let challenge = generate_code_challenge(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// Parameters of the provider consent page URL.
pub struct AuthorizeRequest<'a> {
    pub accounts_url: &'a str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub code_challenge: &'a str,
    pub state: &'a str,
}

impl AuthorizeRequest<'_> {
    pub fn url(&self) -> String {
        format!(
            "{}/authorize?client_id={}&response_type=code&redirect_uri={}&code_challenge_method=S256&code_challenge={}&state={}&scope={}&show_dialog=true",
            self.accounts_url,
            urlencoding::encode(self.client_id),
            urlencoding::encode(self.redirect_uri),
            self.code_challenge,
            urlencoding::encode(self.state),
            urlencoding::encode(&SCOPES.join(" ")),
        )
    }
}

struct Pending {
    code_verifier: String,
    created_at: DateTime<Utc>,
}

/// Short-lived, single-use verifier storage keyed by `state`.
#[derive(Clone)]
pub struct PendingAuthorizations {
    entries: Arc<Mutex<HashMap<String, Pending>>>,
    ttl: Duration,
    capacity: usize,
}

impl Default for PendingAuthorizations {
    fn default() -> Self {
        Self::new(Duration::minutes(10), MAX_PENDING)
    }
}

impl PendingAuthorizations {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Remembers the verifier and returns the `state` it is filed under.
    pub fn insert(&self, pair: &PkcePair, now: DateTime<Utc>) -> String {
        let state = random_string(STATE_LEN);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, p| now - p.created_at < self.ttl);
        while entries.len() >= self.capacity {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, p)| p.created_at)
                .map(|(state, _)| state.clone())
            else {
                break;
            };
            tracing::debug!("evicting pending authorization {}", oldest);
            entries.remove(&oldest);
        }
        entries.insert(
            state.clone(),
            Pending {
                code_verifier: pair.verifier.clone(),
                created_at: now,
            },
        );
        state
    }

    /// Removes and returns the verifier for `state`, if present and fresh.
    pub fn take(&self, state: &str, now: DateTime<Utc>) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let pending = entries.remove(state)?;
        if now - pending.created_at >= self.ttl {
            tracing::debug!("pending authorization {} expired", state);
            return None;
        }
        Some(pending.code_verifier)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_is_unreserved_and_within_bounds() {
        let verifier = generate_code_verifier();
        assert!((43..=128).contains(&verifier.len()));
        assert!(verifier.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(verifier, generate_code_verifier());
    }

    #[test]
    fn challenge_matches_rfc7636_vector() {
        let challenge = generate_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn challenge_has_no_padding() {
        let pair = PkcePair::generate();
        assert_eq!(pair.challenge.len(), 43);
        assert!(!pair.challenge.contains('='));
        assert!(pair
            .challenge
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(pair.challenge, generate_code_challenge(&pair.verifier));
    }

    #[test]
    fn authorize_url_carries_pkce_parameters() {
        let url = AuthorizeRequest {
            accounts_url: "https://accounts.example",
            client_id: "abc",
            redirect_uri: "http://localhost:5173/callback",
            code_challenge: "CHAL",
            state: "st",
        }
        .url();

        assert!(url.starts_with("https://accounts.example/authorize?client_id=abc&response_type=code"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A5173%2Fcallback"));
        assert!(url.contains("code_challenge_method=S256&code_challenge=CHAL"));
        assert!(url.contains("state=st"));
        assert!(url.contains("scope=user-read-private%20user-read-email%20user-top-read"));
    }

    #[test]
    fn pending_verifier_is_single_use() {
        let pending = PendingAuthorizations::default();
        let pair = PkcePair::generate();
        let now = Utc::now();
        let state = pending.insert(&pair, now);

        assert_eq!(pending.take(&state, now), Some(pair.verifier));
        assert_eq!(pending.take(&state, now), None);
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn pending_verifier_expires() {
        let pending = PendingAuthorizations::new(Duration::minutes(10), MAX_PENDING);
        let now = Utc::now();
        let state = pending.insert(&PkcePair::generate(), now);

        assert_eq!(pending.take(&state, now + Duration::minutes(10)), None);
    }

    #[test]
    fn insert_purges_stale_entries() {
        let pending = PendingAuthorizations::new(Duration::minutes(10), MAX_PENDING);
        let now = Utc::now();
        pending.insert(&PkcePair::generate(), now);
        pending.insert(&PkcePair::generate(), now + Duration::minutes(11));

        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn oldest_entry_is_evicted_at_capacity() {
        let pending = PendingAuthorizations::new(Duration::minutes(10), 2);
        let now = Utc::now();
        let first = pending.insert(&PkcePair::generate(), now);
        let second = pending.insert(&PkcePair::generate(), now + Duration::seconds(1));
        let third = pending.insert(&PkcePair::generate(), now + Duration::seconds(2));

        assert_eq!(pending.len(), 2);
        let later = now + Duration::seconds(3);
        assert_eq!(pending.take(&first, later), None);
        assert!(pending.take(&second, later).is_some());
        assert!(pending.take(&third, later).is_some());
    }
}
