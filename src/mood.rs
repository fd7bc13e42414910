//! Mood labels and the audio-feature targets they translate to.

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mood {
    Happy,
    Energetic,
    Chill,
    Sad,
    Romantic,
}

/// Recommendation targets for a mood. All features are in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoodProfile {
    pub target_valence: f32,
    pub target_energy: f32,
    pub target_danceability: f32,
    /// Comma-joined provider genre seeds.
    pub seed_genres: &'static str,
}

impl Mood {
    pub const ALL: [Mood; 5] = [
        Mood::Happy,
        Mood::Energetic,
        Mood::Chill,
        Mood::Sad,
        Mood::Romantic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Happy => "happy",
            Mood::Energetic => "energetic",
            Mood::Chill => "chill",
            Mood::Sad => "sad",
            Mood::Romantic => "romantic",
        }
    }

    pub fn profile(&self) -> MoodProfile {
        match self {
            Mood::Happy => MoodProfile {
                target_valence: 0.8,
                target_energy: 0.7,
                target_danceability: 0.7,
                seed_genres: "pop,dance,indie",
            },
            Mood::Energetic => MoodProfile {
                target_valence: 0.7,
                target_energy: 0.9,
                target_danceability: 0.8,
                seed_genres: "electronic,rock,workout",
            },
            Mood::Chill => MoodProfile {
                target_valence: 0.5,
                target_energy: 0.3,
                target_danceability: 0.4,
                seed_genres: "ambient,acoustic,lo-fi",
            },
            Mood::Sad => MoodProfile {
                target_valence: 0.2,
                target_energy: 0.3,
                target_danceability: 0.3,
                seed_genres: "indie,alternative,soul",
            },
            Mood::Romantic => MoodProfile {
                target_valence: 0.6,
                target_energy: 0.4,
                target_danceability: 0.5,
                seed_genres: "r-n-b,soul,indie",
            },
        }
    }
}

impl FromStr for Mood {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mood::ALL.into_iter().find(|m| m.as_str() == s).ok_or(())
    }
}

/// Maps a raw label to its profile; unknown labels mean "no mood filter".
pub fn profile_for(label: &str) -> Option<MoodProfile> {
    label.parse::<Mood>().ok().map(|m| m.profile())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mood_has_bounded_features_and_genres() {
        for mood in Mood::ALL {
            let p = mood.profile();
            for v in [p.target_valence, p.target_energy, p.target_danceability] {
                assert!((0.0..=1.0).contains(&v), "{} out of range for {:?}", v, mood);
            }
            assert!(!p.seed_genres.is_empty());
            assert!(p.seed_genres.split(',').all(|g| !g.is_empty()));
        }
    }

    #[test]
    fn labels_round_trip() {
        for mood in Mood::ALL {
            assert_eq!(mood.as_str().parse::<Mood>(), Ok(mood));
        }
    }

    #[test]
    fn unknown_labels_have_no_profile() {
        assert_eq!(profile_for("melancholic"), None);
        assert_eq!(profile_for(""), None);
        assert_eq!(profile_for("Happy"), None);
    }

    #[test]
    fn happy_profile() {
        let p = profile_for("happy").unwrap();
        assert_eq!(p.target_valence, 0.8);
        assert_eq!(p.seed_genres, "pop,dance,indie");
    }
}
