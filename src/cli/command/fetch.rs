//! Warm the download cache for every configured window.

use anyhow::{Context, Result};
use log::info;

use crate::{
    config::Config,
    download::make_client,
    grid::{fetch_ensemble, GridCache, GridSource, HttpGridSource},
};

pub async fn fetch(config: &Config) -> Result<String> {
    let source = HttpGridSource::new(make_client()?, config.grid_url.as_str());
    let cache = GridCache::new(&config.cache_dir)
        .with_context(|| format!("Cannot create cache in `{}`", config.cache_dir.display()))?;

    fetch_all(config, &source, &cache).await?;

    Ok(cache.root().to_string_lossy().to_string())
}

/// Returns the number of members now cached.
pub async fn fetch_all<S: GridSource>(config: &Config, source: &S, cache: &GridCache) -> Result<usize> {
    let mut cached = 0;

    for window in config.windows() {
        let requests = config.requests(window);
        let already = requests
            .iter()
            .filter(|r| cache.contains(&r.variable, r.start_year, r.end_year))
            .count();
        info!("{}: {} of {} members already cached", window.label(), already, requests.len());

        let members = fetch_ensemble(
            source,
            cache,
            &requests,
            config.max_concurrent_downloads,
            config.retry_policy(),
        )
        .await;

        info!("{}: {} of {} members now cached", window.label(), members.len(), requests.len());
        cached += members.len();
    }

    Ok(cached)
}

// -- Tests -------------------------------------------------------------------
