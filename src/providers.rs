//!
//! src/providers.rs
//!
//! Catalog adapters over the raw HTTP clients in fetch.rs. Each adapter
//! turns provider JSON into typed candidate albums and tracks, retries
//! transient failures with jittered backoff, and surfaces rate limiting
//! (403/429) as a distinct non-retryable error so the orchestrator can
//! skip the provider for the remainder of a group.
//!

use std::time::Duration;

use async_trait::async_trait;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::config::{AppleMusicConfig, HttpConfig, SpotifyConfig};
use crate::errors::ResolverError;
use crate::fetch::{AppleHttp, SpotifyHttp};
use crate::types::{AlbumType, CandidateAlbum, CatalogTrack, Provider};

const SEARCH_PAGE_LIMIT: u32 = 10;
const TRACK_PAGE_LIMIT: u32 = 50;

/// Catalog surface the orchestrator drives. Implemented by the real
/// Spotify/Apple adapters and by in-memory fakes in tests.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    fn id(&self) -> Provider;

    async fn search_albums(&self, term: &str) -> Result<Vec<CandidateAlbum>, ResolverError>;

    async fn album_tracks(&self, album: &CandidateAlbum)
        -> Result<Vec<CatalogTrack>, ResolverError>;
}

/// Simple function to generate random wait for http_with_retry
fn generate_backoff(ms: u64, attempt: usize, rng: &mut SmallRng) -> Duration {
    let exp = (1_u64 << attempt.min(6)) * ms;
    let jitter = rng.gen_range(50..=200) as u64;
    Duration::from_millis(exp + jitter)
}

/// Send a request, retrying transient/server failures with exponential
/// backoff. 403 and 429 are permanent for this run and never retried.
async fn http_with_retry(
    request: reqwest::RequestBuilder,
    max_retries: usize,
    backoff_ms: u64,
) -> Result<Vec<u8>, ResolverError> {
    let mut rng = SmallRng::from_entropy();
    let mut attempt = 0_usize;
    loop {
        let response = request
            .try_clone()
            .ok_or_else(|| ResolverError::Http("non-cloneable request".to_string()))?
            .send()
            .await;
        match response {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return Ok(resp.bytes().await?.to_vec());
                }
                if status.as_u16() == 429 || status.as_u16() == 403 {
                    return Err(ResolverError::RateLimited(format!("status {status}")));
                }
                if !status.is_server_error() || attempt >= max_retries {
                    return Err(ResolverError::Http(format!(
                        "status {status} after {attempt} retries"
                    )));
                }
                let backoff = generate_backoff(backoff_ms, attempt, &mut rng);
                warn!(status = %status, backoff_ms = backoff.as_millis() as u64, "http.retry");
                sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => {
                if attempt >= max_retries {
                    return Err(e.into());
                }
                let backoff = generate_backoff(backoff_ms, attempt, &mut rng);
                warn!(backoff_ms = backoff.as_millis() as u64, "http.retry.error");
                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

/// Decode a provider body into a typed schema. Catalogs occasionally
/// serve Windows-1252/Latin-1 bytes despite claiming UTF-8, so bodies
/// that fail strict UTF-8 are re-decoded before parsing.
fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ResolverError> {
    match std::str::from_utf8(bytes) {
        Ok(text) => serde_json::from_str(text).map_err(ResolverError::from),
        Err(_) => {
            let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            serde_json::from_str(&text).map_err(ResolverError::from)
        }
    }
}

/// Leading 4-digit year of a provider release-date string, if plausible.
fn release_year(date: Option<&str>) -> Option<i32> {
    let date = date?;
    let head: String = date.chars().take(4).collect();
    if head.len() == 4 && head.chars().all(|c| c.is_ascii_digit()) {
        head.parse().ok()
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Spotify
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SpotifyTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SpotifySearchResponse {
    albums: Option<SpotifyAlbumPage>,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbumPage {
    #[serde(default)]
    items: Vec<SpotifyAlbum>,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbum {
    id: Option<String>,
    name: Option<String>,
    release_date: Option<String>,
    total_tracks: Option<u32>,
    album_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrackPage {
    #[serde(default)]
    items: Vec<SpotifyTrackItem>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrackItem {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    external_urls: Option<SpotifyExternalUrls>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpotifyExternalUrls {
    spotify: Option<String>,
}

struct TokenState {
    bearer: String,
    expires_at: Instant,
}

pub struct SpotifyCatalog {
    fetch: SpotifyHttp,
    http: HttpConfig,
    token: tokio::sync::Mutex<Option<TokenState>>,
}

impl SpotifyCatalog {
    pub fn new(http: &HttpConfig, cfg: &SpotifyConfig) -> Result<Self, ResolverError> {
        let fetch = SpotifyHttp::new(http, cfg)?;
        Ok(Self { fetch, http: http.clone(), token: tokio::sync::Mutex::new(None) })
    }

    /// Client-credentials bearer, refreshed a minute before expiry.
    async fn bearer(&self) -> Result<String, ResolverError> {
        let mut guard = self.token.lock().await;
        if let Some(state) = guard.as_ref() {
            if Instant::now() < state.expires_at {
                return Ok(state.bearer.clone());
            }
        }
        let bytes = http_with_retry(
            self.fetch.token_request(),
            self.http.max_retries,
            self.http.backoff_ms,
        )
        .await?;
        let token: SpotifyTokenResponse = decode_json(&bytes)?;
        let expires_in = token.expires_in.unwrap_or(3600).saturating_sub(60);
        let state = TokenState {
            bearer: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        };
        let bearer = state.bearer.clone();
        *guard = Some(state);
        debug!("spotify.token.refreshed");
        Ok(bearer)
    }
}

#[async_trait]
impl CatalogProvider for SpotifyCatalog {
    fn id(&self) -> Provider {
        Provider::Spotify
    }

    async fn search_albums(&self, term: &str) -> Result<Vec<CandidateAlbum>, ResolverError> {
        let bearer = self.bearer().await?;
        let bytes = http_with_retry(
            self.fetch.search_albums(term, SEARCH_PAGE_LIMIT, &bearer),
            self.http.max_retries,
            self.http.backoff_ms,
        )
        .await?;

        let parsed: SpotifySearchResponse = match decode_json(&bytes) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, %term, "spotify.search.malformed");
                return Ok(Vec::new());
            }
        };

        let items = parsed.albums.map(|page| page.items).unwrap_or_default();
        let albums = items
            .into_iter()
            .filter_map(|album| {
                let id = album.id?;
                let name = album.name?;
                let album_type = match album.album_type.as_deref() {
                    Some("album") => AlbumType::Album,
                    Some("single") => AlbumType::Single,
                    Some("compilation") => AlbumType::Compilation,
                    _ => AlbumType::Unknown,
                };
                Some(CandidateAlbum {
                    id,
                    name,
                    release_year: release_year(album.release_date.as_deref()),
                    track_count: album.total_tracks,
                    album_type,
                    provider: Provider::Spotify,
                })
            })
            .collect();
        Ok(albums)
    }

    async fn album_tracks(
        &self,
        album: &CandidateAlbum,
    ) -> Result<Vec<CatalogTrack>, ResolverError> {
        let bearer = self.bearer().await?;
        let mut tracks = Vec::new();
        let mut offset = 0_u32;
        loop {
            let bytes = http_with_retry(
                self.fetch.album_tracks(&album.id, TRACK_PAGE_LIMIT, offset, &bearer),
                self.http.max_retries,
                self.http.backoff_ms,
            )
            .await?;
            let page: SpotifyTrackPage = match decode_json(&bytes) {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, album = %album.id, "spotify.tracks.malformed");
                    return Ok(Vec::new());
                }
            };
            let page_len = page.items.len() as u32;
            for item in page.items {
                let (Some(id), Some(name)) = (item.id, item.name) else {
                    continue;
                };
                let Some(url) = item.external_urls.and_then(|u| u.spotify) else {
                    continue;
                };
                let artist = item
                    .artists
                    .into_iter()
                    .filter_map(|a| a.name)
                    .collect::<Vec<_>>()
                    .join(", ");
                tracks.push(CatalogTrack {
                    id,
                    name,
                    artist,
                    album_id: album.id.clone(),
                    album_name: album.name.clone(),
                    url,
                    provider: Provider::Spotify,
                });
            }
            if page.next.is_none() || page_len == 0 {
                break;
            }
            offset += page_len;
        }
        Ok(tracks)
    }
}

// ---------------------------------------------------------------------------
// Apple Music (iTunes)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ItunesSearchResponse {
    #[serde(default)]
    results: Vec<ItunesCollection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItunesCollection {
    collection_id: Option<u64>,
    collection_name: Option<String>,
    release_date: Option<String>,
    track_count: Option<u32>,
    collection_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItunesLookupResponse {
    #[serde(default)]
    results: Vec<ItunesLookupItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItunesLookupItem {
    wrapper_type: Option<String>,
    track_id: Option<u64>,
    track_name: Option<String>,
    artist_name: Option<String>,
    track_view_url: Option<String>,
}

/// iTunes publishes singles as collections named "... - Single".
fn itunes_album_type(name: &str, collection_type: Option<&str>) -> AlbumType {
    if name.to_lowercase().ends_with("- single") {
        return AlbumType::Single;
    }
    match collection_type {
        Some("Album") => AlbumType::Album,
        Some("Compilation") => AlbumType::Compilation,
        _ => AlbumType::Unknown,
    }
}

pub struct AppleCatalog {
    fetch: AppleHttp,
    http: HttpConfig,
}

impl AppleCatalog {
    pub fn new(http: &HttpConfig, cfg: &AppleMusicConfig) -> Result<Self, ResolverError> {
        let fetch = AppleHttp::new(http, cfg)?;
        Ok(Self { fetch, http: http.clone() })
    }
}

#[async_trait]
impl CatalogProvider for AppleCatalog {
    fn id(&self) -> Provider {
        Provider::AppleMusic
    }

    async fn search_albums(&self, term: &str) -> Result<Vec<CandidateAlbum>, ResolverError> {
        let bytes = http_with_retry(
            self.fetch.search_albums(term, SEARCH_PAGE_LIMIT),
            self.http.max_retries,
            self.http.backoff_ms,
        )
        .await?;

        let parsed: ItunesSearchResponse = match decode_json(&bytes) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, %term, "apple.search.malformed");
                return Ok(Vec::new());
            }
        };

        let albums = parsed
            .results
            .into_iter()
            .filter_map(|collection| {
                let id = collection.collection_id?;
                let name = collection.collection_name?;
                let album_type = itunes_album_type(&name, collection.collection_type.as_deref());
                Some(CandidateAlbum {
                    id: id.to_string(),
                    name,
                    release_year: release_year(collection.release_date.as_deref()),
                    track_count: collection.track_count,
                    album_type,
                    provider: Provider::AppleMusic,
                })
            })
            .collect();
        Ok(albums)
    }

    async fn album_tracks(
        &self,
        album: &CandidateAlbum,
    ) -> Result<Vec<CatalogTrack>, ResolverError> {
        let bytes = http_with_retry(
            self.fetch.lookup_tracks(&album.id),
            self.http.max_retries,
            self.http.backoff_ms,
        )
        .await?;

        let parsed: ItunesLookupResponse = match decode_json(&bytes) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, album = %album.id, "apple.lookup.malformed");
                return Ok(Vec::new());
            }
        };

        let tracks = parsed
            .results
            .into_iter()
            .filter(|item| item.wrapper_type.as_deref() == Some("track"))
            .filter_map(|item| {
                let id = item.track_id?;
                let name = item.track_name?;
                let url = item.track_view_url?;
                Some(CatalogTrack {
                    id: id.to_string(),
                    name,
                    artist: item.artist_name.unwrap_or_default(),
                    album_id: album.id.clone(),
                    album_name: album.name.clone(),
                    url,
                    provider: Provider::AppleMusic,
                })
            })
            .collect();
        Ok(tracks)
    }
}
