//!
//! src/main.rs
//!
//! Wires a resolver run: configuration, logging, dataset load,
//! provider construction, resolution, cache flush and the aggregate
//! output artifact.
//!

mod cache;
mod config;
mod divisions;
mod errors;
mod fetch;
mod logging;
mod matcher;
mod providers;
mod resolver;
mod scoring;
mod text;
mod types;

use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::ResultCache;
use crate::errors::ResolverError;
use crate::providers::{AppleCatalog, CatalogProvider, SpotifyCatalog};
use crate::resolver::Resolver;
use crate::types::{AggregateOutput, BandType};

#[tokio::main]
async fn main() -> Result<(), ResolverError> {
    let cfg = config::load_config()?;
    let _guard = logging::init_logging(&cfg.logging)?;

    info!(
        service = "nmstreaming",
        version = %env!("CARGO_PKG_VERSION"),
        band_type = ?cfg.run.band_type,
        "starting"
    );

    let mut performances = types::load_performances(&cfg.paths.positions, cfg.run.min_year)?;
    if let Some(years) = &cfg.run.years {
        performances.retain(|p| years.contains(&p.year));
    }
    info!(performances = performances.len(), positions = %cfg.paths.positions.display(), "dataset.loaded");

    let mut resolver = Resolver::new(cfg.matching, &cfg.run)?;
    match &cfg.spotify {
        Some(spotify_cfg) => {
            let spotify: Arc<dyn CatalogProvider> =
                Arc::new(SpotifyCatalog::new(&cfg.http, spotify_cfg)?);
            resolver = resolver.with_spotify(spotify);
        }
        None if !cfg.run.skip_spotify => {
            warn!("spotify credentials missing, continuing without spotify");
        }
        None => {}
    }
    if !cfg.run.skip_apple {
        let apple: Arc<dyn CatalogProvider> = Arc::new(AppleCatalog::new(&cfg.http, &cfg.apple)?);
        resolver = resolver.with_apple(apple);
    }

    let mut cache = ResultCache::load(&cfg.paths.cache, cfg.run.cache_min_year)?;
    let (links, summary) = resolver.resolve(&performances, &mut cache).await;
    cache.flush()?;

    let mut output = AggregateOutput::default();
    match cfg.run.band_type {
        BandType::Wind => output.wind = links,
        BandType::Brass => output.brass = links,
    }
    if let Some(parent) = cfg.paths.aggregate.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&cfg.paths.aggregate, serde_json::to_string_pretty(&output)?)?;

    info!(
        aggregate = %cfg.paths.aggregate.display(),
        performances = summary.performances,
        spotify_resolved = summary.spotify.resolved,
        apple_resolved = summary.apple.resolved,
        "done"
    );
    Ok(())
}
