//!
//! src/matcher.rs
//!
//! Matches one performance to one track within a filtered album set.
//! Piece-title similarity alone cannot disambiguate mandatory pieces
//! performed by every band in a division-year, so artist/band-name
//! corroboration is weighted in whenever it is strong enough to trust.
//!

use std::collections::HashMap;

use crate::config::MatchingConfig;
use crate::text;
use crate::types::{CatalogTrack, Performance};

/// A track that cleared the acceptance threshold, with its score.
#[derive(Debug, Clone)]
pub struct TrackMatch {
    pub track: CatalogTrack,
    pub score: f64,
}

/// Tiered blend of piece-title and artist-name similarity. Strong
/// artist agreement earns 40% of the weight, weak agreement 20%,
/// otherwise the piece title stands alone.
pub fn combined_score(piece_sim: f64, artist_sim: f64, cfg: &MatchingConfig) -> f64 {
    if artist_sim > cfg.artist_strong {
        0.60 * piece_sim + 0.40 * artist_sim
    } else if artist_sim > cfg.artist_weak {
        0.80 * piece_sim + 0.20 * artist_sim
    } else {
        piece_sim
    }
}

/// Pick the best track for a performance, or None when nothing clears
/// the acceptance threshold (a normal outcome, not an error). Ties are
/// broken by the parent album's relevance score, then by artist
/// similarity, so shared test pieces land on the right band's recording.
pub fn match_track(
    performance: &Performance,
    tracks: &[CatalogTrack],
    album_scores: &HashMap<String, i32>,
    cfg: &MatchingConfig,
) -> Option<TrackMatch> {
    // (match, parent album score, artist similarity)
    let mut best: Option<(TrackMatch, i32, f64)> = None;

    for track in tracks {
        let piece_sim = text::title_similarity(&performance.piece, &track.name);
        let artist_sim = text::title_similarity(&performance.band, &track.artist);
        let score = combined_score(piece_sim, artist_sim, cfg);
        if score < cfg.accept_threshold {
            continue;
        }
        let album_score = album_scores.get(&track.album_id).copied().unwrap_or(i32::MIN);

        let replace = match &best {
            None => true,
            Some((current, current_album, current_artist)) => {
                if score > current.score + f64::EPSILON {
                    true
                } else if (score - current.score).abs() <= f64::EPSILON {
                    if album_score != *current_album {
                        album_score > *current_album
                    } else {
                        artist_sim > *current_artist + f64::EPSILON
                    }
                } else {
                    false
                }
            }
        };
        if replace {
            best = Some((TrackMatch { track: track.clone(), score }, album_score, artist_sim));
        }
    }

    best.map(|(matched, _, _)| matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Provider;

    fn cfg() -> MatchingConfig {
        MatchingConfig::default()
    }

    fn track(id: &str, name: &str, artist: &str, album_id: &str) -> CatalogTrack {
        CatalogTrack {
            id: id.to_string(),
            name: name.to_string(),
            artist: artist.to_string(),
            album_id: album_id.to_string(),
            album_name: album_id.to_string(),
            url: format!("https://example.com/{id}"),
            provider: Provider::Spotify,
        }
    }

    fn performance(band: &str, piece: &str) -> Performance {
        Performance {
            year: 2025,
            division: "Elite".to_string(),
            band: band.to_string(),
            piece: piece.to_string(),
            composer: None,
            rank: None,
        }
    }

    #[test]
    fn tier_weights_follow_artist_strength() {
        let c = cfg();
        assert!((combined_score(0.70, 0.75, &c) - 0.72).abs() < 1e-9);
        assert!((combined_score(0.70, 0.50, &c) - 0.66).abs() < 1e-9);
        assert!((combined_score(0.70, 0.35, &c) - 0.70).abs() < 1e-9);
    }

    #[test]
    fn strong_artist_beats_weak_artist_at_equal_piece_similarity() {
        // piece_sim 0.70 for both: 0.60*0.70 + 0.40*0.75 = 0.72 vs plain 0.70
        let c = cfg();
        let strong = combined_score(0.70, 0.75, &c);
        let weak = combined_score(0.70, 0.35, &c);
        assert!(strong > weak);
    }

    #[test]
    fn below_threshold_is_never_returned_even_alone() {
        let tracks = vec![track("t1", "Something Entirely Different", "Nobody", "a1")];
        let result =
            match_track(&performance("Oslo Brass", "Audivi Media Nocte"), &tracks, &HashMap::new(), &cfg());
        assert!(result.is_none());
    }

    #[test]
    fn exact_title_and_artist_match_wins() {
        let tracks = vec![
            track("t1", "Audivi Media Nocte", "Oslo Brass", "a1"),
            track("t2", "Fest i fjellet", "Oslo Brass", "a1"),
        ];
        let matched =
            match_track(&performance("Oslo Brass", "Audivi Media Nocte"), &tracks, &HashMap::new(), &cfg())
                .expect("should match");
        assert_eq!(matched.track.id, "t1");
        assert!(matched.score >= 0.9);
    }

    #[test]
    fn artist_corroboration_disambiguates_shared_test_piece() {
        // Same piece recorded by every band in the division; only the
        // artist field tells the recordings apart.
        let tracks = vec![
            track("t1", "Audivi Media Nocte", "Stavanger Brass Band", "a1"),
            track("t2", "Audivi Media Nocte", "Eikanger-Bj\u{f8}rsvik Musikklag", "a1"),
        ];
        let matched = match_track(
            &performance("Eikanger-Bj\u{f8}rsvik Musikklag", "Audivi Media Nocte"),
            &tracks,
            &HashMap::new(),
            &cfg(),
        )
        .expect("should match");
        assert_eq!(matched.track.id, "t2");
    }

    #[test]
    fn ties_prefer_higher_scoring_parent_album() {
        let tracks = vec![
            track("t1", "Fest i fjellet", "Oslo Janitsjar", "low"),
            track("t2", "Fest i fjellet", "Oslo Janitsjar", "high"),
        ];
        let album_scores = HashMap::from([("low".to_string(), 100), ("high".to_string(), 300)]);
        let matched =
            match_track(&performance("Oslo Janitsjar", "Fest i fjellet"), &tracks, &album_scores, &cfg())
                .expect("should match");
        assert_eq!(matched.track.id, "t2");
    }
}
