//! Summarise one time window of the ensemble into a map layer.

use std::fs;

use anyhow::{bail, Context, Result};
use log::{info, warn};

use super::make_report_file_name;
use crate::{
    config::{Config, TimeWindow},
    download::make_client,
    ensemble::{summarize, SummaryRaster},
    grid::{fetch_ensemble, GridCache, GridSource, HttpGridSource},
    parquet,
    temporal::{annual_snapshots, AnnualStack},
};

pub async fn summary(config: &Config, label: &str) -> Result<String> {
    let Some(window) = config.find_window(label) else {
        let known: Vec<String> = config.windows().iter().map(|w| w.label()).collect();
        bail!("Unknown window `{}`; configured windows are {}", label, known.join(", "));
    };

    let source = HttpGridSource::new(make_client()?, config.grid_url.as_str());
    let cache = GridCache::new(&config.cache_dir)
        .with_context(|| format!("Cannot create cache in `{}`", config.cache_dir.display()))?;

    let raster = summarize_window(config, &source, &cache, window).await?;

    fs::create_dir_all(&config.output_dir)?;
    let file_name = make_report_file_name(&config.output_dir, "summary", &window.label());
    parquet::save_raster(&raster, config.display_crs, &file_name)?;

    Ok(file_name.to_string_lossy().to_string())
}

/// Fetches every member of `window`, reduces each to annual snapshots and
/// aggregates them. Member grids are released before returning.
pub async fn summarize_window<S: GridSource>(
    config: &Config,
    source: &S,
    cache: &GridCache,
    window: &TimeWindow,
) -> Result<SummaryRaster> {
    info!("Summarising {}", window.label());

    let requests = config.requests(window);
    let members = fetch_ensemble(
        source,
        cache,
        &requests,
        config.max_concurrent_downloads,
        config.retry_policy(),
    )
    .await;

    if members.is_empty() {
        bail!("No ensemble members available for {}", window.label());
    }

    let stacks: Vec<AnnualStack> = members
        .iter()
        .map(|series| annual_snapshots(series, config.snapshot_month, window.years()))
        .collect();
    drop(members);

    for stack in stacks.iter().filter(|s| s.years.is_empty()) {
        warn!("`{}` has no snapshots in {}", stack.variable, window.period());
    }

    let raster = summarize(&stacks).with_context(|| format!("Cannot summarise {}", window.label()))?;
    info!(
        "Summarised {} members over {} on {}",
        stacks.len(),
        window.period(),
        raster.spec().describe()
    );

    Ok(raster)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use tempfile::TempDir;

    use super::*;
    use crate::{
        ensemble::Statistic,
        grid::source::test::{payload_fixture, FakeSource},
    };

    fn config_fixture(dir: &TempDir) -> Config {
        Config {
            output_dir: dir.path().join("out"),
            cache_dir: dir.path().join("cache"),
            models: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            reference_windows: vec![TimeWindow::new("historical", 1971, 1972)],
            future_window: TimeWindow::new("rcp85", 2040, 2041),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn should_summarise_window_with_reduced_ensemble() {
        let dir = TempDir::new().unwrap();
        let config = config_fixture(&dir);
        let cache = GridCache::new(&config.cache_dir).unwrap();
        // Model C is missing and gets dropped.
        let source = FakeSource::new(HashMap::from([
            ("swe_A_rcp85".to_string(), payload_fixture("swe_A_rcp85", 2040..=2041, 100.0)),
            ("swe_B_rcp85".to_string(), payload_fixture("swe_B_rcp85", 2040..=2041, 300.0)),
        ]));

        let raster = summarize_window(&config, &source, &cache, &config.future_window)
            .await
            .unwrap();

        let min = raster.channel(Statistic::Min)[[0, 0]];
        let max = raster.channel(Statistic::Max)[[0, 0]];
        let median = raster.channel(Statistic::Median)[[0, 0]];
        assert!((min - 3.93701).abs() < 1e-9);
        assert!((max - 11.81103).abs() < 1e-9);
        assert!((median - 7.87402).abs() < 1e-9);
        assert!(raster.channel(Statistic::Median)[[0, 1]].is_nan());
    }

    #[tokio::test]
    async fn should_fail_on_empty_ensemble() {
        let dir = TempDir::new().unwrap();
        let config = config_fixture(&dir);
        let cache = GridCache::new(&config.cache_dir).unwrap();
        let source = FakeSource::new(HashMap::new());

        let result = summarize_window(&config, &source, &cache, &config.future_window).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn should_reject_unknown_window() {
        let dir = TempDir::new().unwrap();
        let config = config_fixture(&dir);

        let result = summary(&config, "1950-1979").await;

        assert!(result.unwrap_err().to_string().contains("Unknown window"));
    }
}
