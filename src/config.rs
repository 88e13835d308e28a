//!
//! src/config.rs
//!
//! Environment-driven configuration for the resolver. Configuration
//! errors are fatal and surface before any network activity begins.
//!

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::divisions;
use crate::errors::ResolverError;
use crate::types::BandType;

/// Constants for HTTP config
pub const HTTP_TIMEOUT_MS: u64 = 15_000;
pub const HTTP_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const HTTP_POOL_MAX_IDLE: usize = 8;
pub const HTTP_POOL_IDLE_TIMEOUT_MS: u64 = 90_000;
pub const HTTP_MAX_REDIRECTS: u8 = 4;
pub const HTTP_MAX_RETRIES: usize = 3;
pub const HTTP_BACKOFF_MS: u64 = 500;

/// Acceptance threshold for a combined track match score. Matches below
/// this are reported as unresolved rather than guessed.
pub const MATCH_ACCEPT_THRESHOLD: f64 = 0.65;
/// Artist similarity above this is strong corroboration: the artist
/// term earns 40% of the combined weight.
pub const ARTIST_STRONG_SIMILARITY: f64 = 0.70;
/// Artist similarity above this (but not strong) is weak corroboration
/// worth 20% of the combined weight.
pub const ARTIST_WEAK_SIMILARITY: f64 = 0.40;

/// Stop issuing further search-term variants once this many distinct
/// candidate albums have accumulated for a (year, division) group.
pub const CANDIDATE_CEILING: usize = 15;
/// Recordings before this year are not division-specific and must not
/// be cached under a division key.
pub const DIVISION_CACHE_MIN_YEAR: i32 = 2012;
/// First competition year with streamable recordings.
pub const MIN_PERFORMANCE_YEAR: i32 = 2017;

/// Wrapper over env::var to return an invalid environment var error
fn env_check(s: &str) -> Result<String, ResolverError> {
    match std::env::var(s) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ResolverError::Config(format!("{s} was not set"))),
    }
}

fn env_or(s: &str, default: &str) -> String {
    std::env::var(s)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_flag(s: &str) -> bool {
    matches!(std::env::var(s).ok().as_deref(), Some("1") | Some("true"))
}

/// Ensures that url is https
fn ensure_https(url: &Url) -> Result<(), String> {
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(format!("URL must be https: {url}"))
    }
}

fn ensure_host(url: &Url, expected_host: &str) -> Result<(), String> {
    match url.host_str() {
        Some(h) if h.eq_ignore_ascii_case(expected_host) => Ok(()),
        Some(h) => Err(format!(
            "Unexpected host for {url} (got {h}, expected {expected_host})"
        )),
        None => Err(format!("URL missing host: {url}")),
    }
}

fn ensure_trailing_slash(url: &mut Url) {
    if !url.path().ends_with('/') {
        let mut path = url.path().to_string();
        path.push('/');
        url.set_path(&path);
    }
}

///
/// Configuration for HTTP timeouts, retries, etc.
///
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub max_redirects: u8,
    pub max_retries: usize,
    pub backoff_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(HTTP_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(HTTP_CONNECT_TIMEOUT_MS),
            pool_max_idle_per_host: HTTP_POOL_MAX_IDLE,
            pool_idle_timeout: Duration::from_millis(HTTP_POOL_IDLE_TIMEOUT_MS),
            max_redirects: HTTP_MAX_REDIRECTS,
            max_retries: HTTP_MAX_RETRIES,
            backoff_ms: HTTP_BACKOFF_MS,
        }
    }
}

/// Configuration that Spotify expects when hitting endpoints
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: Url,
    pub api_base: Url,
    pub market: String,
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    spotify_client_id: Option<String>,
    #[serde(default)]
    spotify_client_secret: Option<String>,
}

fn load_credentials_file(path: &Path) -> Result<CredentialsFile, ResolverError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ResolverError::Config(format!("credentials file {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| ResolverError::Config(format!("credentials file {}: {e}", path.display())))
}

/// Resolve Spotify credentials from the environment, falling back to the
/// credentials file. An explicitly configured file that is missing or
/// malformed is fatal; absent credentials are not (the run degrades to
/// Apple-only with a warning at wiring time).
fn build_spotify(credentials_path: &Path) -> Result<Option<SpotifyConfig>, ResolverError> {
    let mut client_id = std::env::var("SPOTIFY_CLIENT_ID").ok().filter(|v| !v.trim().is_empty());
    let mut client_secret =
        std::env::var("SPOTIFY_CLIENT_SECRET").ok().filter(|v| !v.trim().is_empty());

    if client_id.is_none() || client_secret.is_none() {
        let explicit = std::env::var("STREAMING_CREDENTIALS").is_ok();
        if credentials_path.exists() {
            let file = load_credentials_file(credentials_path)?;
            client_id = client_id.or(file.spotify_client_id.filter(|v| !v.trim().is_empty()));
            client_secret =
                client_secret.or(file.spotify_client_secret.filter(|v| !v.trim().is_empty()));
        } else if explicit {
            return Err(ResolverError::Config(format!(
                "credentials file not found: {}",
                credentials_path.display()
            )));
        }
    }

    let (Some(client_id), Some(client_secret)) = (client_id, client_secret) else {
        return Ok(None);
    };

    let token_url = env_or("SPOTIFY_TOKEN_URL", "https://accounts.spotify.com/api/token");
    let api_base = env_or("SPOTIFY_API_BASE", "https://api.spotify.com/v1/");

    let token_url = Url::parse(&token_url)
        .map_err(|_| ResolverError::Config("SPOTIFY_TOKEN_URL invalid".to_string()))?;
    let mut api_base = Url::parse(&api_base)
        .map_err(|_| ResolverError::Config("SPOTIFY_API_BASE invalid".to_string()))?;

    ensure_https(&token_url).map_err(ResolverError::Config)?;
    ensure_https(&api_base).map_err(ResolverError::Config)?;
    ensure_host(&token_url, "accounts.spotify.com").map_err(ResolverError::Config)?;
    ensure_host(&api_base, "api.spotify.com").map_err(ResolverError::Config)?;
    ensure_trailing_slash(&mut api_base);

    let market = env_or("SPOTIFY_MARKET", "NO");

    Ok(Some(SpotifyConfig { client_id, client_secret, token_url, api_base, market }))
}

///
/// Configuration for the iTunes/Apple Music catalog endpoints
///
#[derive(Debug, Clone)]
pub struct AppleMusicConfig {
    pub search_url: Url,
    pub lookup_url: Url,
    pub country: String,
}

fn build_apple() -> Result<AppleMusicConfig, ResolverError> {
    let search_url = env_or("APPLE_SEARCH_URL", "https://itunes.apple.com/search");
    let lookup_url = env_or("APPLE_LOOKUP_URL", "https://itunes.apple.com/lookup");

    let search_url = Url::parse(&search_url)
        .map_err(|_| ResolverError::Config("APPLE_SEARCH_URL invalid".to_string()))?;
    let lookup_url = Url::parse(&lookup_url)
        .map_err(|_| ResolverError::Config("APPLE_LOOKUP_URL invalid".to_string()))?;

    ensure_https(&search_url).map_err(ResolverError::Config)?;
    ensure_https(&lookup_url).map_err(ResolverError::Config)?;
    ensure_host(&search_url, "itunes.apple.com").map_err(ResolverError::Config)?;
    ensure_host(&lookup_url, "itunes.apple.com").map_err(ResolverError::Config)?;

    let country = env_or("APPLE_COUNTRY", "us");

    Ok(AppleMusicConfig { search_url, lookup_url, country })
}

///
/// Thresholds for the track matcher
///
#[derive(Debug, Clone, Copy)]
pub struct MatchingConfig {
    pub accept_threshold: f64,
    pub artist_strong: f64,
    pub artist_weak: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            accept_threshold: MATCH_ACCEPT_THRESHOLD,
            artist_strong: ARTIST_STRONG_SIMILARITY,
            artist_weak: ARTIST_WEAK_SIMILARITY,
        }
    }
}

///
/// Scoping of a resolver run: which years, which divisions, how hard to
/// search, and what the cache may memoize.
///
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub band_type: BandType,
    pub min_year: i32,
    pub years: Option<Vec<i32>>,
    pub division_codes: Option<Vec<String>>,
    pub candidate_ceiling: usize,
    pub cache_min_year: i32,
    pub skip_spotify: bool,
    pub skip_apple: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            band_type: BandType::Wind,
            min_year: MIN_PERFORMANCE_YEAR,
            years: None,
            division_codes: None,
            candidate_ceiling: CANDIDATE_CEILING,
            cache_min_year: DIVISION_CACHE_MIN_YEAR,
            skip_spotify: false,
            skip_apple: false,
        }
    }
}

fn build_run() -> Result<RunConfig, ResolverError> {
    let band_type = BandType::parse(&env_or("BAND_TYPE", "wind"))?;

    let min_year = match std::env::var("MIN_YEAR") {
        Ok(v) => v
            .trim()
            .parse::<i32>()
            .map_err(|_| ResolverError::Config(format!("MIN_YEAR invalid: {v}")))?,
        Err(_) => MIN_PERFORMANCE_YEAR,
    };

    let years = match std::env::var("YEARS") {
        Ok(v) if !v.trim().is_empty() => {
            let mut years = Vec::new();
            for part in v.split(',') {
                let year = part
                    .trim()
                    .parse::<i32>()
                    .map_err(|_| ResolverError::Config(format!("YEARS entry invalid: {part}")))?;
                if !years.contains(&year) {
                    years.push(year);
                }
            }
            Some(years)
        }
        _ => None,
    };

    let division_codes = match std::env::var("DIVISIONS") {
        Ok(v) if !v.trim().is_empty() => {
            let requested: Vec<String> = v.split(',').map(|c| c.trim().to_string()).collect();
            Some(divisions::normalize_codes(&requested)?)
        }
        _ => None,
    };

    let candidate_ceiling = match std::env::var("CANDIDATE_CEILING") {
        Ok(v) => v
            .trim()
            .parse::<usize>()
            .map_err(|_| ResolverError::Config(format!("CANDIDATE_CEILING invalid: {v}")))?,
        Err(_) => CANDIDATE_CEILING,
    };

    let cache_min_year = match std::env::var("CACHE_MIN_YEAR") {
        Ok(v) => v
            .trim()
            .parse::<i32>()
            .map_err(|_| ResolverError::Config(format!("CACHE_MIN_YEAR invalid: {v}")))?,
        Err(_) => DIVISION_CACHE_MIN_YEAR,
    };

    Ok(RunConfig {
        band_type,
        min_year,
        years,
        division_codes,
        candidate_ceiling,
        cache_min_year,
        skip_spotify: env_flag("SKIP_SPOTIFY"),
        skip_apple: env_flag("SKIP_APPLE"),
    })
}

///
/// Filesystem inputs and outputs
///
#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub positions: PathBuf,
    pub aggregate: PathBuf,
    pub cache: PathBuf,
    pub credentials: PathBuf,
}

fn build_paths() -> Result<PathsConfig, ResolverError> {
    let positions = PathBuf::from(env_check("POSITIONS_FILE")?);
    let aggregate = PathBuf::from(env_or(
        "AGGREGATE_FILE",
        "data/processed/piece_streaming_links.json",
    ));
    let cache = PathBuf::from(env_or("STREAMING_CACHE", "config/streaming_cache.json"));
    let credentials = PathBuf::from(env_or(
        "STREAMING_CREDENTIALS",
        "config/streaming_credentials.json",
    ));
    Ok(PathsConfig { positions, aggregate, cache, credentials })
}

///
/// Configuration for Logger
///
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter_directives: String,
    pub include_file_line: bool,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter_directives: "info,nmstreaming=debug,reqwest=warn".to_string(),
            include_file_line: true,
            include_target: true,
        }
    }
}

///
/// AppConfig which holds everything main needs to wire a run
///
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub spotify: Option<SpotifyConfig>,
    pub apple: AppleMusicConfig,
    pub matching: MatchingConfig,
    pub run: RunConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

///
/// Return all environment-derived configuration at program start.
///
pub fn load_config() -> Result<AppConfig, ResolverError> {
    dotenvy::dotenv().ok();

    let paths = build_paths()?;
    let run = build_run()?;
    let spotify = if run.skip_spotify { None } else { build_spotify(&paths.credentials)? };
    let apple = build_apple()?;
    let http = HttpConfig::default();
    let matching = MatchingConfig::default();
    let logging = LoggingConfig::default();

    Ok(AppConfig { http, spotify, apple, matching, run, paths, logging })
}
