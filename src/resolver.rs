//!
//! src/resolver.rs
//!
//! Drives the per-(year, division) search, filter, fetch and match
//! pipeline, enforces the candidate ceiling and year filter ordering,
//! aggregates results and applies cache writes.
//!
//! Failure semantics: rate limiting skips the affected provider for the
//! remainder of the group; everything else local to one provider or one
//! group is logged and absorbed. Nothing here aborts the run.
//!

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::ResultCache;
use crate::config::{MatchingConfig, RunConfig};
use crate::divisions;
use crate::errors::ResolverError;
use crate::matcher::{self, TrackMatch};
use crate::providers::CatalogProvider;
use crate::scoring;
use crate::text;
use crate::types::{
    CandidateAlbum, CatalogTrack, Performance, Provider, ResolvedLink, StreamingLink,
};

/// Per-provider resolution counts for the run-end summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProviderCounts {
    pub resolved: usize,
    pub unresolved: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    pub performances: usize,
    pub groups: usize,
    pub spotify: ProviderCounts,
    pub apple: ProviderCounts,
    pub provider_skips: usize,
}

/// Search-term variants for a (year, division) group, most specific
/// first. Order is deterministic; the candidate ceiling decides when to
/// stop, never "did a term return something".
fn search_terms(contest: &str, year: i32, division: &str) -> Vec<String> {
    let label = divisions::album_label(division);
    vec![
        format!("{contest} {year} {label}"),
        format!("{contest} {year} {label} (Live)"),
        format!("{contest} {year} - {label}"),
        format!("{contest} {year}"),
    ]
}

/// What one provider contributed to one (year, division) group.
struct GroupOutcome {
    provider: Provider,
    tracks: Vec<CatalogTrack>,
    album_scores: HashMap<String, i32>,
    fetched_search: Option<Vec<CandidateAlbum>>,
    fetched_tracks: Vec<(String, Vec<CatalogTrack>)>,
    rate_limited: bool,
}

impl GroupOutcome {
    fn new(provider: Provider) -> Self {
        Self {
            provider,
            tracks: Vec::new(),
            album_scores: HashMap::new(),
            fetched_search: None,
            fetched_tracks: Vec::new(),
            rate_limited: false,
        }
    }
}

pub struct Resolver {
    spotify: Option<Arc<dyn CatalogProvider>>,
    apple: Option<Arc<dyn CatalogProvider>>,
    matching: MatchingConfig,
    contest_name: String,
    candidate_ceiling: usize,
    division_allow: Option<Vec<String>>,
}

impl Resolver {
    pub fn new(matching: MatchingConfig, run: &RunConfig) -> Result<Self, ResolverError> {
        let division_allow = match &run.division_codes {
            Some(codes) => {
                let mut names = Vec::new();
                for code in codes {
                    let name = divisions::division_for_code(code)?.to_string();
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
                Some(names)
            }
            None => None,
        };
        Ok(Self {
            spotify: None,
            apple: None,
            matching,
            contest_name: run.band_type.contest_name().to_string(),
            candidate_ceiling: run.candidate_ceiling,
            division_allow,
        })
    }

    pub fn with_spotify(mut self, provider: Arc<dyn CatalogProvider>) -> Self {
        self.spotify = Some(provider);
        self
    }

    pub fn with_apple(mut self, provider: Arc<dyn CatalogProvider>) -> Self {
        self.apple = Some(provider);
        self
    }

    /// Resolve every performance, processing (year, division) groups in
    /// order. The cache handle is read during fetches and mutated only
    /// between groups, after both providers have finished.
    pub async fn resolve(
        &self,
        performances: &[Performance],
        cache: &mut ResultCache,
    ) -> (Vec<ResolvedLink>, RunSummary) {
        let mut summary = RunSummary::default();
        let mut links = Vec::new();

        let mut groups: BTreeMap<(i32, String), Vec<&Performance>> = BTreeMap::new();
        for performance in performances {
            if let Some(allow) = &self.division_allow {
                if !allow.contains(&performance.division) {
                    continue;
                }
            }
            groups
                .entry((performance.year, performance.division.clone()))
                .or_default()
                .push(performance);
        }
        summary.groups = groups.len();

        for ((year, division), group) in groups {
            info!(year, division = %division, performances = group.len(), "resolver.group.start");
            let terms = search_terms(&self.contest_name, year, &division);

            let cache_ref: &ResultCache = cache;
            let spotify_fut = async {
                match &self.spotify {
                    Some(p) => {
                        Some(self.provider_group(p.as_ref(), cache_ref, year, &division, &terms).await)
                    }
                    None => None,
                }
            };
            let apple_fut = async {
                match &self.apple {
                    Some(p) => {
                        Some(self.provider_group(p.as_ref(), cache_ref, year, &division, &terms).await)
                    }
                    None => None,
                }
            };
            let (spotify_outcome, apple_outcome) = tokio::join!(spotify_fut, apple_fut);

            for outcome in [&spotify_outcome, &apple_outcome].into_iter().flatten() {
                if outcome.rate_limited {
                    summary.provider_skips += 1;
                }
                apply_cache_writes(cache, outcome, year, &division);
            }

            for performance in group {
                summary.performances += 1;
                let spotify_match = match_against(&spotify_outcome, performance, &self.matching);
                let apple_match = match_against(&apple_outcome, performance, &self.matching);

                if self.spotify.is_some() {
                    count(&mut summary.spotify, &spotify_match);
                }
                if self.apple.is_some() {
                    count(&mut summary.apple, &apple_match);
                }

                links.push(build_link(performance, spotify_match, apple_match));
            }
            info!(year, division = %division, "resolver.group.done");
        }

        info!(
            performances = summary.performances,
            groups = summary.groups,
            spotify_resolved = summary.spotify.resolved,
            spotify_unresolved = summary.spotify.unresolved,
            apple_resolved = summary.apple.resolved,
            apple_unresolved = summary.apple.unresolved,
            provider_skips = summary.provider_skips,
            "resolver.run.done"
        );
        (links, summary)
    }

    /// One provider's pass over one group:
    /// SEARCHING -> FILTERING -> FETCHING_TRACKS. Matching happens in
    /// the caller once both providers are done.
    async fn provider_group(
        &self,
        provider: &dyn CatalogProvider,
        cache: &ResultCache,
        year: i32,
        division: &str,
        terms: &[String],
    ) -> GroupOutcome {
        let pid = provider.id();
        let mut outcome = GroupOutcome::new(pid);

        // SEARCHING: every term variant, deduplicated by album id,
        // bounded by the candidate ceiling.
        let candidates: Vec<CandidateAlbum> =
            if let Some(hit) = cache.album_search(pid, year, division) {
                debug!(provider = %pid, year, division, "cache.search.hit");
                hit.to_vec()
            } else {
                let mut found: Vec<CandidateAlbum> = Vec::new();
                let mut seen: HashSet<String> = HashSet::new();
                for term in terms {
                    if found.len() >= self.candidate_ceiling {
                        debug!(provider = %pid, candidates = found.len(), "search.ceiling");
                        break;
                    }
                    match provider.search_albums(term).await {
                        Ok(albums) => {
                            for album in albums {
                                if seen.insert(album.id.clone()) {
                                    found.push(album);
                                }
                            }
                        }
                        Err(ResolverError::RateLimited(reason)) => {
                            warn!(provider = %pid, %reason, "provider.rate_limited.search");
                            outcome.rate_limited = true;
                            break;
                        }
                        Err(e) => {
                            // one failed term does not abort the group
                            warn!(provider = %pid, %term, error = %e, "search.term.failed");
                        }
                    }
                }
                outcome.fetched_search = Some(found.clone());
                found
            };

        // FILTERING: relevance scoring, then the hard year filter.
        // Nothing past this point sees a wrong-year album.
        let survivors = scoring::score_and_filter(&candidates, year, division);
        if survivors.is_empty() {
            info!(provider = %pid, year, division, "group.no_candidates");
            return outcome;
        }

        // FETCHING_TRACKS: most relevant album first, tracks
        // deduplicated by id across albums. After a rate limit only
        // cached track lists are consulted.
        let mut seen_tracks: HashSet<String> = HashSet::new();
        for scored in &survivors {
            outcome.album_scores.insert(scored.album.id.clone(), scored.score);
            let tracks = if let Some(hit) = cache.tracks(pid, &scored.album.id) {
                debug!(provider = %pid, album = %scored.album.id, "cache.tracks.hit");
                hit.to_vec()
            } else if outcome.rate_limited {
                continue;
            } else {
                match provider.album_tracks(&scored.album).await {
                    Ok(tracks) => {
                        outcome.fetched_tracks.push((scored.album.id.clone(), tracks.clone()));
                        tracks
                    }
                    Err(ResolverError::RateLimited(reason)) => {
                        warn!(provider = %pid, %reason, "provider.rate_limited.tracks");
                        outcome.rate_limited = true;
                        continue;
                    }
                    Err(e) => {
                        warn!(provider = %pid, album = %scored.album.id, error = %e, "tracks.fetch.failed");
                        continue;
                    }
                }
            };
            for track in tracks {
                if seen_tracks.insert(track.id.clone()) {
                    outcome.tracks.push(track);
                }
            }
        }
        outcome
    }
}

fn match_against(
    outcome: &Option<GroupOutcome>,
    performance: &Performance,
    matching: &MatchingConfig,
) -> Option<TrackMatch> {
    let outcome = outcome.as_ref()?;
    matcher::match_track(performance, &outcome.tracks, &outcome.album_scores, matching)
}

fn count(counts: &mut ProviderCounts, matched: &Option<TrackMatch>) {
    if matched.is_some() {
        counts.resolved += 1;
    } else {
        counts.unresolved += 1;
    }
}

/// Persist what a group fetched. Search sets are not memoized when the
/// provider was rate limited mid-search; a partial candidate list must
/// stay retryable on the next run.
fn apply_cache_writes(cache: &mut ResultCache, outcome: &GroupOutcome, year: i32, division: &str) {
    if let Some(albums) = &outcome.fetched_search {
        if !outcome.rate_limited {
            cache.set_album_search(outcome.provider, year, division, albums);
        }
    }
    for (album_id, tracks) in &outcome.fetched_tracks {
        cache.set_tracks(outcome.provider, album_id, tracks);
    }
}

fn to_streaming_link(matched: &TrackMatch) -> StreamingLink {
    StreamingLink {
        url: matched.track.url.clone(),
        track_name: matched.track.name.clone(),
        album_name: matched.track.album_name.clone(),
        match_score: matched.score,
    }
}

fn build_link(
    performance: &Performance,
    spotify: Option<TrackMatch>,
    apple: Option<TrackMatch>,
) -> ResolvedLink {
    let piece_slug = text::slug(&performance.piece);
    let stripped = text::slug_stripped(&performance.piece);
    let piece_slug_alt = (stripped != piece_slug).then_some(stripped);

    let primary = spotify.as_ref().or(apple.as_ref());
    ResolvedLink {
        year: performance.year,
        division: performance.division.clone(),
        band: performance.band.clone(),
        result_piece: performance.piece.clone(),
        piece_slug,
        piece_slug_alt,
        recording_title: primary.map(|m| m.track.name.clone()),
        album: primary.map(|m| m.track.album_name.clone()),
        spotify: spotify.as_ref().map(to_streaming_link),
        apple_music: apple.as_ref().map(to_streaming_link),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlbumType, BandType};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockCatalog {
        id: Provider,
        albums: Vec<CandidateAlbum>,
        tracks: HashMap<String, Vec<CatalogTrack>>,
        rate_limited: bool,
        failing_search_calls: HashSet<usize>,
        failing_track_calls: HashSet<usize>,
        search_calls: AtomicUsize,
        track_calls: AtomicUsize,
    }

    impl MockCatalog {
        fn new(id: Provider) -> Self {
            Self {
                id,
                albums: Vec::new(),
                tracks: HashMap::new(),
                rate_limited: false,
                failing_search_calls: HashSet::new(),
                failing_track_calls: HashSet::new(),
                search_calls: AtomicUsize::new(0),
                track_calls: AtomicUsize::new(0),
            }
        }

        fn album(
            mut self,
            id: &str,
            name: &str,
            release_year: Option<i32>,
            tracks: Vec<(&str, &str, &str)>,
        ) -> Self {
            self.albums.push(CandidateAlbum {
                id: id.to_string(),
                name: name.to_string(),
                release_year,
                track_count: Some(tracks.len() as u32),
                album_type: AlbumType::Album,
                provider: self.id,
            });
            let list = tracks
                .into_iter()
                .map(|(track_id, title, artist)| CatalogTrack {
                    id: track_id.to_string(),
                    name: title.to_string(),
                    artist: artist.to_string(),
                    album_id: id.to_string(),
                    album_name: name.to_string(),
                    url: format!("https://example.com/{}/{track_id}", self.id),
                    provider: self.id,
                })
                .collect();
            self.tracks.insert(id.to_string(), list);
            self
        }

        fn rate_limited(mut self) -> Self {
            self.rate_limited = true;
            self
        }

        /// The nth search call (1-based) fails with an HTTP error.
        fn fail_search_call(mut self, call: usize) -> Self {
            self.failing_search_calls.insert(call);
            self
        }

        /// The nth track-fetch call (1-based) fails with an HTTP error.
        fn fail_track_call(mut self, call: usize) -> Self {
            self.failing_track_calls.insert(call);
            self
        }
    }

    #[async_trait]
    impl CatalogProvider for MockCatalog {
        fn id(&self) -> Provider {
            self.id
        }

        async fn search_albums(&self, _term: &str) -> Result<Vec<CandidateAlbum>, ResolverError> {
            let call = self.search_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.rate_limited {
                return Err(ResolverError::RateLimited("status 403".to_string()));
            }
            if self.failing_search_calls.contains(&call) {
                return Err(ResolverError::Http("status 500 after 3 retries".to_string()));
            }
            Ok(self.albums.clone())
        }

        async fn album_tracks(
            &self,
            album: &CandidateAlbum,
        ) -> Result<Vec<CatalogTrack>, ResolverError> {
            let call = self.track_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.rate_limited {
                return Err(ResolverError::RateLimited("status 403".to_string()));
            }
            if self.failing_track_calls.contains(&call) {
                return Err(ResolverError::Http("status 500 after 3 retries".to_string()));
            }
            Ok(self.tracks.get(&album.id).cloned().unwrap_or_default())
        }
    }

    fn performance(year: i32, division: &str, band: &str, piece: &str) -> Performance {
        Performance {
            year,
            division: division.to_string(),
            band: band.to_string(),
            piece: piece.to_string(),
            composer: None,
            rank: None,
        }
    }

    fn run_config() -> RunConfig {
        RunConfig { band_type: BandType::Brass, ..RunConfig::default() }
    }

    fn resolver(run: &RunConfig) -> Resolver {
        Resolver::new(MatchingConfig::default(), run).unwrap()
    }

    /// Regression for the documented failure mode: decoy albums from
    /// earlier years with overlapping piece titles must never supply a
    /// matched track for a later year's query.
    #[tokio::test]
    async fn end_to_end_year_filter_rejects_decoy_albums() {
        let codes: Vec<&str> = crate::divisions::DIVISIONS.iter().map(|(c, _)| *c).collect();
        let mut spotify = MockCatalog::new(Provider::Spotify);
        let mut performances = Vec::new();

        for (code, division) in crate::divisions::DIVISIONS {
            let label = crate::divisions::album_label(division);
            let piece = format!("Konkurransestykke {division}");
            let bands: Vec<String> =
                (0..10).map(|i| format!("Brass Band {code}{i}")).collect();

            let tracks_for = |prefix: &str| -> Vec<(String, String, String)> {
                bands
                    .iter()
                    .enumerate()
                    .map(|(i, band)| (format!("{prefix}-{code}-{i}"), piece.clone(), band.clone()))
                    .collect()
            };
            // the correct album plus two decoy years with the same titles
            for (prefix, year) in [("t25", 2025), ("t19", 2019), ("t23", 2023)] {
                let owned: Vec<(String, String, String)> = tracks_for(prefix);
                let rows: Vec<(&str, &str, &str)> = owned
                    .iter()
                    .map(|(a, b, c)| (a.as_str(), b.as_str(), c.as_str()))
                    .collect();
                spotify = spotify.album(
                    &format!("alb-{year}-{code}"),
                    &format!("NM Brass {year} - {label}"),
                    Some(year),
                    rows,
                );
            }
            for band in &bands {
                performances.push(performance(2025, division, band, &piece));
            }
        }
        assert_eq!(performances.len(), 80);
        assert_eq!(codes.len(), 8);

        let run = run_config();
        let resolver = resolver(&run).with_spotify(Arc::new(spotify));
        let mut cache = ResultCache::in_memory(2012);
        let (links, summary) = resolver.resolve(&performances, &mut cache).await;

        assert_eq!(links.len(), 80);
        assert_eq!(summary.spotify.resolved, 80);
        assert_eq!(summary.spotify.unresolved, 0);
        for link in &links {
            let spotify_link = link.spotify.as_ref().expect("resolved");
            assert!(
                spotify_link.url.contains("/t25-"),
                "matched a decoy album track: {}",
                spotify_link.url
            );
            assert!(spotify_link.album_name.contains("2025"));
        }
    }

    #[tokio::test]
    async fn rate_limited_provider_degrades_without_aborting_the_other() {
        let spotify = MockCatalog::new(Provider::Spotify).album(
            "s1",
            "NM Brass 2024 - Elitedivisjon",
            Some(2024),
            vec![("st1", "Fest i fjellet", "Oslo Brass")],
        );
        let apple = MockCatalog::new(Provider::AppleMusic).rate_limited();

        let run = run_config();
        let resolver =
            resolver(&run).with_spotify(Arc::new(spotify)).with_apple(Arc::new(apple));
        let performances = vec![performance(2024, "Elite", "Oslo Brass", "Fest i fjellet")];
        let mut cache = ResultCache::in_memory(2012);
        let (links, summary) = resolver.resolve(&performances, &mut cache).await;

        assert_eq!(links.len(), 1);
        assert!(links[0].spotify.is_some());
        assert!(links[0].apple_music.is_none());
        assert_eq!(summary.spotify.resolved, 1);
        assert_eq!(summary.apple.resolved, 0);
        assert_eq!(summary.apple.unresolved, 1);
        assert_eq!(summary.provider_skips, 1);
    }

    #[tokio::test]
    async fn second_run_against_warm_cache_issues_no_network_calls() {
        let spotify = Arc::new(MockCatalog::new(Provider::Spotify).album(
            "s1",
            "NM Brass 2023 - Elitedivisjon",
            Some(2023),
            vec![("st1", "Fest i fjellet", "Oslo Brass")],
        ));
        let run = run_config();
        let resolver = resolver(&run).with_spotify(spotify.clone());
        let performances = vec![performance(2023, "Elite", "Oslo Brass", "Fest i fjellet")];
        let mut cache = ResultCache::in_memory(2012);

        let (links, _) = resolver.resolve(&performances, &mut cache).await;
        assert!(links[0].spotify.is_some());
        let searches_after_first = spotify.search_calls.load(Ordering::SeqCst);
        let tracks_after_first = spotify.track_calls.load(Ordering::SeqCst);
        assert!(searches_after_first > 0);

        let (links, _) = resolver.resolve(&performances, &mut cache).await;
        assert!(links[0].spotify.is_some());
        assert_eq!(spotify.search_calls.load(Ordering::SeqCst), searches_after_first);
        assert_eq!(spotify.track_calls.load(Ordering::SeqCst), tracks_after_first);
    }

    /// A non-empty early result must never cut the search short; only
    /// the candidate ceiling ends it. The first term already returns an
    /// album here, yet every remaining variant is still issued.
    #[tokio::test]
    async fn nonempty_first_term_does_not_stop_remaining_searches() {
        let spotify = Arc::new(MockCatalog::new(Provider::Spotify).album(
            "s1",
            "NM Brass 2023 - Elitedivisjon",
            Some(2023),
            vec![("st1", "Fest i fjellet", "Oslo Brass")],
        ));
        let run = run_config();
        let resolver = resolver(&run).with_spotify(spotify.clone());
        let performances = vec![performance(2023, "Elite", "Oslo Brass", "Fest i fjellet")];
        let mut cache = ResultCache::in_memory(2012);
        let (links, _) = resolver.resolve(&performances, &mut cache).await;

        assert!(links[0].spotify.is_some());
        let terms = search_terms("NM Brass", 2023, "Elite").len();
        assert_eq!(spotify.search_calls.load(Ordering::SeqCst), terms);
    }

    #[tokio::test]
    async fn candidate_ceiling_stops_further_search_terms() {
        // one search call already exceeds the default ceiling of 15
        let mut spotify = MockCatalog::new(Provider::Spotify);
        for i in 0..16 {
            spotify = spotify.album(
                &format!("a{i:02}"),
                &format!("NM Brass 2023 Vol. {i}"),
                Some(2023),
                vec![],
            );
        }
        let spotify = Arc::new(spotify);
        let run = run_config();
        let resolver = resolver(&run).with_spotify(spotify.clone());
        let cache = ResultCache::in_memory(2012);
        let terms = search_terms("NM Brass", 2023, "Elite");

        let outcome = resolver
            .provider_group(spotify.as_ref(), &cache, 2023, "Elite", &terms)
            .await;

        assert_eq!(spotify.search_calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.fetched_search.as_ref().map(Vec::len), Some(16));
    }

    #[tokio::test]
    async fn failed_search_term_does_not_abort_remaining_terms() {
        let spotify = Arc::new(
            MockCatalog::new(Provider::Spotify)
                .album(
                    "s1",
                    "NM Brass 2023 - Elitedivisjon",
                    Some(2023),
                    vec![("st1", "Fest i fjellet", "Oslo Brass")],
                )
                .fail_search_call(2),
        );
        let run = run_config();
        let resolver = resolver(&run).with_spotify(spotify.clone());
        let performances = vec![performance(2023, "Elite", "Oslo Brass", "Fest i fjellet")];
        let mut cache = ResultCache::in_memory(2012);
        let (links, summary) = resolver.resolve(&performances, &mut cache).await;

        assert!(links[0].spotify.is_some());
        assert_eq!(summary.provider_skips, 0);
        let terms = search_terms("NM Brass", 2023, "Elite").len();
        assert_eq!(spotify.search_calls.load(Ordering::SeqCst), terms);
    }

    #[tokio::test]
    async fn failed_album_track_fetch_skips_only_that_album() {
        // a1 outranks a2, so its track fetch happens first and fails;
        // a2 must still contribute its tracks
        let spotify = Arc::new(
            MockCatalog::new(Provider::Spotify)
                .album(
                    "a1",
                    "NM Brass 2023 - Elitedivisjon",
                    Some(2023),
                    vec![("t1", "Annet Stykke", "Annet Korps")],
                )
                .album(
                    "a2",
                    "NM Brass 2023",
                    Some(2023),
                    vec![("t2", "Fest i fjellet", "Oslo Brass")],
                )
                .fail_track_call(1),
        );
        let run = run_config();
        let resolver = resolver(&run).with_spotify(spotify.clone());
        let performances = vec![performance(2023, "Elite", "Oslo Brass", "Fest i fjellet")];
        let mut cache = ResultCache::in_memory(2012);
        let (links, _) = resolver.resolve(&performances, &mut cache).await;

        let link = links[0].spotify.as_ref().expect("resolved from the intact album");
        assert!(link.url.ends_with("/t2"), "got {}", link.url);
        assert_eq!(spotify.track_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn pre_threshold_years_resolve_but_are_not_cached() {
        let spotify = Arc::new(MockCatalog::new(Provider::Spotify).album(
            "s1",
            "NM Brass 2011 - Elitedivisjon",
            Some(2011),
            vec![("st1", "Fest i fjellet", "Oslo Brass")],
        ));
        let run = run_config();
        let resolver = resolver(&run).with_spotify(spotify.clone());
        let performances = vec![performance(2011, "Elite", "Oslo Brass", "Fest i fjellet")];
        let mut cache = ResultCache::in_memory(2012);

        let (links, _) = resolver.resolve(&performances, &mut cache).await;
        assert!(links[0].spotify.is_some());
        assert!(cache.album_search(Provider::Spotify, 2011, "Elite").is_none());

        // no search memoization: the second run searches again
        let first = spotify.search_calls.load(Ordering::SeqCst);
        let _ = resolver.resolve(&performances, &mut cache).await;
        assert!(spotify.search_calls.load(Ordering::SeqCst) > first);
    }

    #[tokio::test]
    async fn division_allow_list_drops_other_divisions_entirely() {
        let spotify = MockCatalog::new(Provider::Spotify)
            .album(
                "a2",
                "NM Brass 2023 - 2. divisjon",
                Some(2023),
                vec![("t2", "Stykke To", "Band To")],
            )
            .album(
                "a3",
                "NM Brass 2023 - 3. divisjon",
                Some(2023),
                vec![("t3", "Stykke Tre", "Band Tre")],
            );
        let run = RunConfig {
            band_type: BandType::Brass,
            division_codes: Some(vec!["2".to_string()]),
            ..RunConfig::default()
        };
        let resolver = resolver(&run).with_spotify(Arc::new(spotify));
        let performances = vec![
            performance(2023, "2. divisjon", "Band To", "Stykke To"),
            performance(2023, "3. divisjon", "Band Tre", "Stykke Tre"),
        ];
        let mut cache = ResultCache::in_memory(2012);
        let (links, summary) = resolver.resolve(&performances, &mut cache).await;

        assert_eq!(links.len(), 1);
        assert_eq!(links[0].division, "2. divisjon");
        assert_eq!(summary.performances, 1);
        assert_eq!(summary.groups, 1);
    }

    #[tokio::test]
    async fn tracks_are_deduplicated_across_candidate_albums() {
        // the same recording appears on two surviving albums
        let spotify = MockCatalog::new(Provider::Spotify)
            .album(
                "a1",
                "NM Brass 2023 - Elitedivisjon",
                Some(2023),
                vec![("shared", "Fest i fjellet", "Oslo Brass")],
            )
            .album(
                "a2",
                "NM Brass 2023 (Live)",
                Some(2023),
                vec![("shared", "Fest i fjellet", "Oslo Brass")],
            );
        let run = run_config();
        let resolver = resolver(&run).with_spotify(Arc::new(spotify));
        let cache = ResultCache::in_memory(2012);
        let terms = search_terms("NM Brass", 2023, "Elite");

        let outcome = resolver
            .provider_group(
                resolver.spotify.as_ref().unwrap().as_ref(),
                &cache,
                2023,
                "Elite",
                &terms,
            )
            .await;
        let ids: Vec<&str> = outcome.tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["shared"]);
        assert_eq!(outcome.album_scores.len(), 2);
    }

    #[tokio::test]
    async fn group_with_no_surviving_candidates_is_a_normal_empty_outcome() {
        // only a wrong-year album exists; the year filter leaves nothing
        let spotify = MockCatalog::new(Provider::Spotify).album(
            "old",
            "NM Brass 2019 - Elitedivisjon",
            Some(2019),
            vec![("t", "Fest i fjellet", "Oslo Brass")],
        );
        let run = run_config();
        let resolver = resolver(&run).with_spotify(Arc::new(spotify));
        let performances = vec![performance(2025, "Elite", "Oslo Brass", "Fest i fjellet")];
        let mut cache = ResultCache::in_memory(2012);
        let (links, summary) = resolver.resolve(&performances, &mut cache).await;

        assert_eq!(links.len(), 1);
        assert!(!links[0].is_resolved());
        assert_eq!(summary.spotify.unresolved, 1);
    }

    #[test]
    fn search_terms_include_label_and_live_variants() {
        let terms = search_terms("NM Janitsjar", 2025, "Elite");
        assert_eq!(terms[0], "NM Janitsjar 2025 Elitedivisjon");
        assert!(terms.contains(&"NM Janitsjar 2025 Elitedivisjon (Live)".to_string()));
        assert!(terms.contains(&"NM Janitsjar 2025".to_string()));
    }
}
