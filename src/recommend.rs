//! Recommendation seeding and the outbound `/recommendations` query.

use crate::{
    error::AppError,
    mood::{self, MoodProfile},
    spotify::SpotifyApi,
};

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;
/// How many top tracks are requested when seeding from listening history.
pub const TOP_TRACKS_FETCH: u32 = 5;
pub const MAX_SEED_TRACKS: usize = 2;
pub const TOP_TRACKS_TIME_RANGE: &str = "medium_term";

/// Exactly one seeding strategy per request.
#[derive(Debug, Clone, PartialEq)]
pub enum Seeding {
    /// Mood targets plus up to two of the user's top tracks.
    Mood {
        profile: MoodProfile,
        seed_tracks: Vec<String>,
    },
    /// A single explicit seed track.
    Track(String),
}

/// What the caller asked for, before any provider call is made.
#[derive(Debug, Clone, PartialEq)]
pub enum SeedRequest {
    Mood(MoodProfile),
    Track(String),
}

impl SeedRequest {
    /// A recognised mood wins over a track id; an unknown mood falls through
    /// to track seeding. Neither usable input is a validation failure.
    pub fn resolve(mood: Option<&str>, track_id: Option<&str>) -> Result<Self, AppError> {
        if let Some(profile) = mood.and_then(mood::profile_for) {
            return Ok(SeedRequest::Mood(profile));
        }
        if let Some(label) = mood {
            tracing::debug!("unknown mood '{}', no mood filter applied", label);
        }
        match track_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => Ok(SeedRequest::Track(id.to_string())),
            None => Err(AppError::Validation(
                "Either mood or trackId is required".into(),
            )),
        }
    }
}

pub fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Encodes a comma separated list item by item, keeping the separators.
fn encode_list<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    items
        .into_iter()
        .map(|s| urlencoding::encode(s).into_owned())
        .collect::<Vec<_>>()
        .join(",")
}

/// Builds the query string for the provider's recommendations endpoint.
pub fn build_query(limit: u32, seeding: &Seeding) -> String {
    let mut params: Vec<(&str, String)> = vec![("limit", limit.to_string())];

    match seeding {
        Seeding::Mood {
            profile,
            seed_tracks,
        } => {
            params.push(("target_valence", profile.target_valence.to_string()));
            params.push(("target_energy", profile.target_energy.to_string()));
            params.push((
                "target_danceability",
                profile.target_danceability.to_string(),
            ));
            if !seed_tracks.is_empty() {
                params.push((
                    "seed_tracks",
                    encode_list(seed_tracks.iter().map(String::as_str)),
                ));
            }
            params.push(("seed_genres", encode_list(profile.seed_genres.split(','))));
        }
        Seeding::Track(id) => {
            params.push(("seed_tracks", urlencoding::encode(id).into_owned()));
        }
    }

    params
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Turns a seed request into a concrete seeding, fetching top tracks for
/// mood requests. A failed top-tracks call only drops the track seeds.
pub async fn seed(
    spotify: &dyn SpotifyApi,
    access_token: &str,
    request: SeedRequest,
) -> Result<Seeding, AppError> {
    match request {
        SeedRequest::Track(id) => Ok(Seeding::Track(id)),
        SeedRequest::Mood(profile) => {
            let seed_tracks = match spotify
                .top_tracks(access_token, TOP_TRACKS_FETCH, TOP_TRACKS_TIME_RANGE)
                .await
            {
                Ok(tracks) => {
                    tracing::debug!("top tracks fetched: {}", tracks.len());
                    tracks
                        .into_iter()
                        .take(MAX_SEED_TRACKS)
                        .map(|t| t.id)
                        .collect()
                }
                Err(e) => {
                    tracing::warn!("top tracks request failed, seeding by genre only: {}", e);
                    Vec::new()
                }
            };
            Ok(Seeding::Mood {
                profile,
                seed_tracks,
            })
        }
    }
}
