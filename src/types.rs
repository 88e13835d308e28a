//!
//! src/types.rs
//!
//! Core records flowing through the resolver: performances from the
//! scraped competition dataset, candidate albums and tracks from the
//! streaming catalogs, and the resolved links handed to the exporter.
//!

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ResolverError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Spotify,
    AppleMusic,
}

impl Provider {
    /// Key used for provider namespaces in the cache document and output.
    pub fn key(self) -> &'static str {
        match self {
            Provider::Spotify => "spotify",
            Provider::AppleMusic => "apple_music",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Which competition dataset a run processes. Selects the performance
/// source partition and the output partition, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandType {
    Wind,
    Brass,
}

impl BandType {
    pub fn contest_name(self) -> &'static str {
        match self {
            BandType::Wind => "NM Janitsjar",
            BandType::Brass => "NM Brass",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ResolverError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "wind" => Ok(BandType::Wind),
            "brass" => Ok(BandType::Brass),
            other => Err(ResolverError::Config(format!(
                "unknown band type '{other}' (expected wind or brass)"
            ))),
        }
    }
}

/// One band's appearance in one division in one year performing one piece.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Performance {
    pub year: i32,
    pub division: String,
    pub band: String,
    pub piece: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlbumType {
    Album,
    Single,
    Compilation,
    Unknown,
}

/// A catalog search result, not yet confirmed relevant. The release year
/// is advisory only; providers routinely leave it out or get it wrong.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateAlbum {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_count: Option<u32>,
    pub album_type: AlbumType,
    pub provider: Provider,
}

/// One track on one album, as returned by a provider catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogTrack {
    pub id: String,
    pub name: String,
    pub artist: String,
    pub album_id: String,
    pub album_name: String,
    pub url: String,
    pub provider: Provider,
}

/// Link plus display metadata for UI attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingLink {
    pub url: String,
    pub track_name: String,
    pub album_name: String,
    pub match_score: f64,
}

/// Final per-performance output consumed by the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedLink {
    pub year: i32,
    pub division: String,
    pub band: String,
    pub result_piece: String,
    pub piece_slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub piece_slug_alt: Option<String>,
    pub recording_title: Option<String>,
    pub album: Option<String>,
    pub spotify: Option<StreamingLink>,
    pub apple_music: Option<StreamingLink>,
}

impl ResolvedLink {
    pub fn is_resolved(&self) -> bool {
        self.spotify.is_some() || self.apple_music.is_some()
    }
}

/// Aggregate output artifact, partitioned by band type.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AggregateOutput {
    pub wind: Vec<ResolvedLink>,
    pub brass: Vec<ResolvedLink>,
}

// ---------------------------------------------------------------------------
// Band positions dataset (input from the scrape/export collaborators)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PositionsDocument {
    #[serde(default)]
    bands: Vec<PositionsBand>,
}

#[derive(Debug, Deserialize)]
struct PositionsBand {
    name: String,
    #[serde(default)]
    entries: Vec<PositionsEntry>,
}

#[derive(Debug, Deserialize)]
struct PositionsEntry {
    year: Option<i32>,
    division: Option<String>,
    #[serde(default)]
    pieces: Pieces,
    #[serde(default)]
    rank: Option<u32>,
    #[serde(default)]
    composer: Option<String>,
}

/// Older exports store a single piece as a bare string.
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum Pieces {
    #[default]
    Missing,
    One(String),
    Many(Vec<String>),
}

impl Pieces {
    fn into_vec(self) -> Vec<String> {
        match self {
            Pieces::Missing => Vec::new(),
            Pieces::One(piece) => vec![piece],
            Pieces::Many(pieces) => pieces,
        }
    }
}

/// Load performances from a band-positions dataset, expanding multi-piece
/// entries and dropping everything before `min_year`.
pub fn load_performances(path: &Path, min_year: i32) -> Result<Vec<Performance>, ResolverError> {
    let raw = std::fs::read_to_string(path)?;
    let document: PositionsDocument = serde_json::from_str(&raw)
        .map_err(|e| ResolverError::Parse(format!("{}: {e}", path.display())))?;

    let mut performances = Vec::new();
    for band in document.bands {
        for entry in band.entries {
            let (Some(year), Some(division)) = (entry.year, entry.division) else {
                continue;
            };
            if year < min_year {
                continue;
            }
            for raw_piece in entry.pieces.into_vec() {
                let piece = raw_piece.trim();
                if piece.is_empty() {
                    continue;
                }
                performances.push(Performance {
                    year,
                    division: division.clone(),
                    band: band.name.clone(),
                    piece: piece.to_string(),
                    composer: entry.composer.clone(),
                    rank: entry.rank,
                });
            }
        }
    }
    Ok(performances)
}
