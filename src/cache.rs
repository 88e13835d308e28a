//!
//! src/cache.rs
//!
//! Persistent JSON result cache keyed by provider. Album searches are
//! memoized per (year, division), track lists per album id. Entries are
//! never invalidated automatically; operators delete the file to reset.
//!
//! Two write policies guard correctness across runs: empty result sets
//! are not memoized (a rate-limited miss stays retryable), and searches
//! for years before the division-specific threshold are not written at
//! all (pre-threshold collection albums are not division-specific, and
//! caching them under a division key would pollute later lookups).
//!

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::ResolverError;
use crate::types::{CandidateAlbum, CatalogTrack, Provider};

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchEntry {
    pub albums: Vec<CandidateAlbum>,
    pub fetched_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TracksEntry {
    pub tracks: Vec<CatalogTrack>,
    pub fetched_at: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProviderCache {
    #[serde(default)]
    pub album_tracks: BTreeMap<String, TracksEntry>,
    #[serde(default)]
    pub album_searches: BTreeMap<String, SearchEntry>,
}

/// Explicit cache handle: loaded from disk at run start, mutated by the
/// orchestrator, flushed atomically at run end.
#[derive(Debug)]
pub struct ResultCache {
    path: PathBuf,
    min_year: i32,
    providers: BTreeMap<String, ProviderCache>,
}

fn search_key(year: i32, division: &str) -> String {
    format!("{year}|{division}")
}

impl ResultCache {
    /// Load the cache document. A missing file is an empty cache; a
    /// corrupt one is logged and replaced rather than aborting the run.
    pub fn load(path: &Path, min_year: i32) -> Result<Self, ResolverError> {
        let providers = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cache.corrupt.reset");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path: path.to_path_buf(), min_year, providers })
    }

    /// In-memory cache for tests and dry runs.
    pub fn in_memory(min_year: i32) -> Self {
        Self { path: PathBuf::new(), min_year, providers: BTreeMap::new() }
    }

    pub fn album_search(
        &self,
        provider: Provider,
        year: i32,
        division: &str,
    ) -> Option<&[CandidateAlbum]> {
        self.providers
            .get(provider.key())?
            .album_searches
            .get(&search_key(year, division))
            .map(|entry| entry.albums.as_slice())
    }

    pub fn set_album_search(
        &mut self,
        provider: Provider,
        year: i32,
        division: &str,
        albums: &[CandidateAlbum],
    ) {
        if albums.is_empty() {
            debug!(%provider, year, division, "cache.search.skip.empty");
            return;
        }
        if year < self.min_year {
            debug!(%provider, year, division, "cache.search.skip.pre_threshold");
            return;
        }
        let entry = SearchEntry { albums: albums.to_vec(), fetched_at: now_epoch() };
        self.providers
            .entry(provider.key().to_string())
            .or_default()
            .album_searches
            .insert(search_key(year, division), entry);
    }

    pub fn tracks(&self, provider: Provider, album_id: &str) -> Option<&[CatalogTrack]> {
        self.providers
            .get(provider.key())?
            .album_tracks
            .get(album_id)
            .map(|entry| entry.tracks.as_slice())
    }

    pub fn set_tracks(&mut self, provider: Provider, album_id: &str, tracks: &[CatalogTrack]) {
        if tracks.is_empty() {
            debug!(%provider, album_id, "cache.tracks.skip.empty");
            return;
        }
        let entry = TracksEntry { tracks: tracks.to_vec(), fetched_at: now_epoch() };
        self.providers
            .entry(provider.key().to_string())
            .or_default()
            .album_tracks
            .insert(album_id.to_string(), entry);
    }

    /// Write the document atomically: serialize to a tempfile in the
    /// target directory, then persist over the final path.
    pub fn flush(&self) -> Result<(), ResolverError> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        let parent = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            std::fs::create_dir_all(parent)
                .map_err(|e| ResolverError::Cache(format!("create dir {}: {e}", parent.display())))?;
        }
        let dir = parent.unwrap_or_else(|| Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| ResolverError::Cache(format!("tempfile in {}: {e}", dir.display())))?;
        serde_json::to_writer_pretty(&mut temp, &self.providers)
            .map_err(|e| ResolverError::Cache(format!("serialize cache: {e}")))?;
        temp.flush().map_err(|e| ResolverError::Cache(format!("flush cache: {e}")))?;
        temp.persist(&self.path)
            .map_err(|e| ResolverError::Cache(format!("persist {}: {e}", self.path.display())))?;
        Ok(())
    }
}

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AlbumType;

    fn album(id: &str) -> CandidateAlbum {
        CandidateAlbum {
            id: id.to_string(),
            name: format!("Album {id}"),
            release_year: Some(2023),
            track_count: Some(8),
            album_type: AlbumType::Album,
            provider: Provider::Spotify,
        }
    }

    fn track(id: &str) -> CatalogTrack {
        CatalogTrack {
            id: id.to_string(),
            name: format!("Track {id}"),
            artist: "Band".to_string(),
            album_id: "a1".to_string(),
            album_name: "Album a1".to_string(),
            url: format!("https://open.spotify.com/track/{id}"),
            provider: Provider::Spotify,
        }
    }

    #[test]
    fn search_entries_round_trip() {
        let mut cache = ResultCache::in_memory(2012);
        assert!(cache.album_search(Provider::Spotify, 2023, "Elite").is_none());

        cache.set_album_search(Provider::Spotify, 2023, "Elite", &[album("a1")]);
        let hit = cache.album_search(Provider::Spotify, 2023, "Elite").unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].id, "a1");

        // per-provider namespaces are independent
        assert!(cache.album_search(Provider::AppleMusic, 2023, "Elite").is_none());
    }

    #[test]
    fn empty_result_sets_are_not_memoized() {
        let mut cache = ResultCache::in_memory(2012);
        cache.set_album_search(Provider::Spotify, 2023, "Elite", &[]);
        assert!(cache.album_search(Provider::Spotify, 2023, "Elite").is_none());
        cache.set_tracks(Provider::Spotify, "a1", &[]);
        assert!(cache.tracks(Provider::Spotify, "a1").is_none());
    }

    #[test]
    fn pre_threshold_years_are_never_written() {
        let mut cache = ResultCache::in_memory(2012);
        cache.set_album_search(Provider::Spotify, 2011, "Elite", &[album("a1")]);
        assert!(cache.album_search(Provider::Spotify, 2011, "Elite").is_none());

        cache.set_album_search(Provider::Spotify, 2012, "Elite", &[album("a1")]);
        assert!(cache.album_search(Provider::Spotify, 2012, "Elite").is_some());
    }

    #[test]
    fn flush_and_reload_preserve_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streaming_cache.json");

        let mut cache = ResultCache::load(&path, 2012).unwrap();
        cache.set_album_search(Provider::AppleMusic, 2024, "2. divisjon", &[album("c9")]);
        cache.set_tracks(Provider::AppleMusic, "c9", &[track("t1")]);
        cache.flush().unwrap();

        let reloaded = ResultCache::load(&path, 2012).unwrap();
        assert_eq!(
            reloaded.album_search(Provider::AppleMusic, 2024, "2. divisjon").unwrap()[0].id,
            "c9"
        );
        assert_eq!(reloaded.tracks(Provider::AppleMusic, "c9").unwrap()[0].id, "t1");

        // document shape: provider namespace with the two sub-maps
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw["apple_music"]["album_searches"]["2024|2. divisjon"]["fetched_at"].is_i64());
        assert!(raw["apple_music"]["album_tracks"]["c9"]["tracks"].is_array());
    }

    #[test]
    fn corrupt_cache_resets_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streaming_cache.json");
        std::fs::write(&path, "{ not json").unwrap();
        let cache = ResultCache::load(&path, 2012).unwrap();
        assert!(cache.album_search(Provider::Spotify, 2023, "Elite").is_none());
    }
}
