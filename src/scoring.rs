//!
//! src/scoring.rs
//!
//! Album relevance scoring against a target (year, division), plus the
//! hard year filter that runs before any track is fetched. Fetching
//! tracks from the wrong year's album is the failure mode this module
//! exists to prevent.
//!

use crate::divisions;
use crate::types::{AlbumType, CandidateAlbum};

/// Additive rubric. The absolute values only matter relative to each
/// other; the ordering they induce is the contract.
pub const SCORE_RELEASE_YEAR: i32 = 200;
pub const SCORE_YEAR_TOKEN: i32 = 100;
pub const SCORE_DIVISION_TOKEN: i32 = 150;
pub const SCORE_CONTEST_TOKEN: i32 = 20;
pub const SCORE_LIVE_HINT: i32 = 5;
pub const SCORE_FULL_ALBUM: i32 = 2;
pub const SCORE_SINGLE_PENALTY: i32 = -10;

/// Candidate plus score and the rationale factors behind it.
#[derive(Debug, Clone)]
pub struct ScoredAlbum {
    pub album: CandidateAlbum,
    pub score: i32,
    pub year_field_match: bool,
    pub year_token_match: bool,
    pub division_token_match: bool,
    pub contest_token_match: bool,
    pub live_hint: bool,
}

impl ScoredAlbum {
    /// The year-filter invariant: release-year field equals the target,
    /// or the target year appears as a literal token in the album name.
    pub fn passes_year_filter(&self) -> bool {
        self.year_field_match || self.year_token_match
    }
}

/// True when `year` appears in `name` as a standalone 4-digit run.
fn contains_year_token(name: &str, year: i32) -> bool {
    let needle = year.to_string();
    if needle.len() != 4 {
        return false;
    }
    let bytes = name.as_bytes();
    let mut start = None;
    for (i, b) in bytes.iter().enumerate() {
        if b.is_ascii_digit() {
            start.get_or_insert(i);
        } else if let Some(s) = start.take() {
            if &name[s..i] == needle {
                return true;
            }
        }
    }
    matches!(start, Some(s) if &name[s..] == needle)
}

fn contains_contest_token(name_lower: &str) -> bool {
    if name_lower.contains("norgesmesterskap") {
        return true;
    }
    // "nm" as a standalone word ("NM Janitsjar 2025", "NM i brass")
    name_lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|word| word == "nm")
}

/// Score one candidate album against the target (year, division).
pub fn score_album(album: &CandidateAlbum, year: i32, division: &str) -> ScoredAlbum {
    let name_lower = album.name.to_lowercase();

    let year_field_match = album.release_year == Some(year);
    let year_token_match = contains_year_token(&album.name, year);
    let division_token_match = divisions::division_tokens(division)
        .iter()
        .any(|token| name_lower.contains(token.as_str()));
    let contest_token_match = contains_contest_token(&name_lower);
    let live_hint = name_lower.contains("live");

    let mut score = 0;
    if year_field_match {
        score += SCORE_RELEASE_YEAR;
    }
    if year_token_match {
        score += SCORE_YEAR_TOKEN;
    }
    if division_token_match {
        score += SCORE_DIVISION_TOKEN;
    }
    if contest_token_match {
        score += SCORE_CONTEST_TOKEN;
    }
    if live_hint {
        score += SCORE_LIVE_HINT;
    }
    score += match album.album_type {
        AlbumType::Single => SCORE_SINGLE_PENALTY,
        AlbumType::Album | AlbumType::Compilation => SCORE_FULL_ALBUM,
        AlbumType::Unknown => 0,
    };

    ScoredAlbum {
        album: album.clone(),
        score,
        year_field_match,
        year_token_match,
        division_token_match,
        contest_token_match,
        live_hint,
    }
}

/// Rank scored candidates deterministically: score descending, then
/// track count descending, then album id ascending.
pub fn rank_albums(scored: &mut [ScoredAlbum]) {
    scored.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| {
                b.album.track_count.unwrap_or(0).cmp(&a.album.track_count.unwrap_or(0))
            })
            .then_with(|| a.album.id.cmp(&b.album.id))
    });
}

/// Score, rank, and apply the hard year filter. Candidates failing the
/// filter are discarded before any track fetch.
pub fn score_and_filter(
    candidates: &[CandidateAlbum],
    year: i32,
    division: &str,
) -> Vec<ScoredAlbum> {
    let mut scored: Vec<ScoredAlbum> =
        candidates.iter().map(|album| score_album(album, year, division)).collect();
    rank_albums(&mut scored);
    scored.retain(ScoredAlbum::passes_year_filter);
    scored
}
