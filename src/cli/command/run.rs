//! The full comparison: summarise every window, then compare the future
//! window against each reference window at grid, station and basin level.

use std::{collections::HashMap, fs};

use anyhow::{Context, Result};
use log::{info, warn};
use reqwest::Client;

use super::{make_report_file_name, summary::summarize_window};
use crate::{
    basins::fetch_basins,
    compare::{compare_stations, group_by_basin, percent_of_normal, polygon_means},
    config::Config,
    download::make_client,
    ensemble::Statistic,
    grid::{GridCache, GridSource, HttpGridSource},
    parquet,
    stations::{attach_normals, fetch_normals, fetch_stations},
};

pub async fn run(config: &Config) -> Result<Vec<String>> {
    let client = make_client()?;
    let source = HttpGridSource::new(client.clone(), config.grid_url.as_str());
    let cache = GridCache::new(&config.cache_dir)
        .with_context(|| format!("Cannot create cache in `{}`", config.cache_dir.display()))?;

    run_with(config, &client, &source, &cache).await
}

/// Runs the pipeline against `source`; returns the reports written.
pub async fn run_with<S: GridSource>(
    config: &Config,
    client: &Client,
    source: &S,
    cache: &GridCache,
) -> Result<Vec<String>> {
    fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Cannot create `{}`", config.output_dir.display()))?;

    let mut saved = Vec::new();
    let mut save = |kind: &str, label: &str| {
        let file_name = make_report_file_name(&config.output_dir, kind, label);
        saved.push(file_name.to_string_lossy().to_string());
        file_name
    };

    let future_window = &config.future_window;
    let future = summarize_window(config, source, cache, future_window).await?;
    parquet::save_raster(&future, config.display_crs, &save("summary", &future_window.label()))?;

    let mut stations = fetch_stations(client, &config.stations_url, config.station_crs, &config.basin_filter).await?;
    let basins = fetch_basins(client, &config.basins_url, config.basin_crs, &config.basin_filter).await?;
    let basin_names: HashMap<String, String> = basins.iter().map(|b| (b.huc.clone(), b.name.clone())).collect();

    for window in &config.reference_windows {
        let period = window.period();
        let reference = summarize_window(config, source, cache, window).await?;
        parquet::save_raster(&reference, config.display_crs, &save("summary", &window.label()))?;

        let ratio = percent_of_normal(&future, &reference)
            .with_context(|| format!("Cannot compare {} with {}", future_window.label(), window.label()))?;
        parquet::save_raster(&ratio, config.display_crs, &save("percent-of-normal", &period))?;

        if stations.is_empty() {
            warn!("No stations to compare against {}", period);
        } else {
            let normals = fetch_normals(
                client,
                &config.normals_url,
                &stations,
                &config.normals_element,
                &config.normals_date,
                &period,
            )
            .await?;
            attach_normals(&mut stations, &period, &normals);
        }

        let comparisons = compare_stations(&stations, &period, &reference, &future);
        parquet::save_station_comparisons(&comparisons, &save("stations", &period))?;

        let ratios: Vec<(String, Option<f64>)> = comparisons
            .iter()
            .map(|c| (c.station_id.clone(), c.ratio(Statistic::Median)))
            .collect();
        let groups = group_by_basin(&ratios, &stations, config.min_stations_per_basin);
        parquet::save_basin_groups(&groups, &basin_names, &save("basins-stations", &period))?;

        let means = polygon_means(&ratio, &basins);
        parquet::save_basin_means(&means, &save("basins-modeled", &period))?;

        info!(
            "{} against {}: {} stations compared, {} basins by station, {} basins modeled",
            future_window.label(),
            period,
            comparisons.len(),
            groups.len(),
            means.len()
        );
    }

    Ok(saved)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use std::{io::Write, path::Path};

    use arrow::{
        array::{Array, AsArray},
        datatypes::Float64Type,
    };
    use tempfile::TempDir;

    use super::*;
    use crate::{
        config::TimeWindow,
        grid::source::test::{payload_fixture, FakeSource},
        parquet::test::read_back,
    };

    fn write_file(path: &Path, contents: &str) {
        let mut file = fs::File::create(path).unwrap();
        write!(file, "{}", contents).unwrap();
    }

    fn fixture(dir: &TempDir) -> (Config, FakeSource) {
        let root = dir.path();
        // Three stations share the only populated cell; a fourth lies off the grid.
        write_file(
            &root.join("stations.json"),
            r#"[
                {"station_id": "a", "latitude": 41.5, "longitude": -109.5, "hucs": ["14010001"]},
                {"station_id": "b", "latitude": 41.4, "longitude": -109.6, "hucs": ["14010001"]},
                {"station_id": "c", "latitude": 41.6, "longitude": -109.4, "hucs": ["14010001", "14010002"]},
                {"station_id": "d", "latitude": 45.0, "longitude": -100.0, "hucs": ["14010002"]}
            ]"#,
        );
        write_file(
            &root.join("normals-1971-1972.json"),
            r#"[
                {"station_id": "a", "value": 10.0},
                {"station_id": "b", "value": 10.0},
                {"station_id": "c", "value": 10.0},
                {"station_id": "d", "value": 10.0}
            ]"#,
        );
        write_file(
            &root.join("basins.geojson"),
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"huc8": "14010001", "name": "Colorado Headwaters"},
                 "geometry": {"type": "Polygon", "coordinates": [[[-110,41],[-109,41],[-109,42],[-110,42],[-110,41]]]}},
                {"type": "Feature", "properties": {"huc8": "14010002", "name": "Blue"},
                 "geometry": {"type": "Polygon", "coordinates": [[[-109,41],[-108,41],[-108,42],[-109,42],[-109,41]]]}}
            ]}"#,
        );

        let config = Config {
            output_dir: root.join("out"),
            cache_dir: root.join("cache"),
            models: vec!["A".to_string(), "B".to_string(), "C".to_string()],
            reference_windows: vec![TimeWindow::new("historical", 1971, 1972)],
            future_window: TimeWindow::new("rcp85", 2040, 2041),
            stations_url: root.join("stations.json").to_string_lossy().to_string(),
            normals_url: root.join("normals-{period}.json").to_string_lossy().to_string(),
            basins_url: root.join("basins.geojson").to_string_lossy().to_string(),
            basin_crs: crate::grid::Crs::Wgs84,
            ..Config::default()
        };

        let mut payloads = HashMap::new();
        for model in ["A", "B", "C"] {
            let historical = format!("swe_{}_historical", model);
            let future = format!("swe_{}_rcp85", model);
            payloads.insert(historical.clone(), payload_fixture(&historical, 1971..=1972, 254.0));
            payloads.insert(future.clone(), payload_fixture(&future, 2040..=2041, 127.0));
        }

        (config, FakeSource::new(payloads))
    }

    #[tokio::test]
    async fn should_write_every_report() {
        let dir = TempDir::new().unwrap();
        let (config, source) = fixture(&dir);
        let cache = GridCache::new(&config.cache_dir).unwrap();
        let client = make_client().unwrap();

        let saved = run_with(&config, &client, &source, &cache).await.unwrap();

        let names: Vec<String> = saved
            .iter()
            .map(|s| Path::new(s).file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "summary-rcp85-2040-2041.parquet",
                "summary-historical-1971-1972.parquet",
                "percent-of-normal-1971-1972.parquet",
                "stations-1971-1972.parquet",
                "basins-stations-1971-1972.parquet",
                "basins-modeled-1971-1972.parquet",
            ]
        );
        assert!(saved.iter().all(|s| Path::new(s).exists()));
    }

    #[tokio::test]
    async fn should_compare_future_against_normals() {
        let dir = TempDir::new().unwrap();
        let (config, source) = fixture(&dir);
        let cache = GridCache::new(&config.cache_dir).unwrap();
        let client = make_client().unwrap();

        run_with(&config, &client, &source, &cache).await.unwrap();
        let out = &config.output_dir;

        let stations = &read_back(&out.join("stations-1971-1972.parquet"))[0];
        assert_eq!(stations.num_rows(), 4);
        let pct = stations.column_by_name("pct_normal_median").unwrap().as_primitive::<Float64Type>();
        assert!((pct.value(0) - 50.0).abs() < 1e-3);
        assert!(pct.is_null(3));

        // Only 14010001 has three stations with a ratio.
        let groups = &read_back(&out.join("basins-stations-1971-1972.parquet"))[0];
        assert_eq!(groups.num_rows(), 1);
        let names = groups.column_by_name("name").unwrap().as_string::<i32>();
        assert_eq!(names.value(0), "Colorado Headwaters");

        // The second basin covers only missing cells.
        let modeled = &read_back(&out.join("basins-modeled-1971-1972.parquet"))[0];
        assert_eq!(modeled.num_rows(), 1);
        let median = modeled.column_by_name("median").unwrap().as_primitive::<Float64Type>();
        assert!((median.value(0) - 50.0).abs() < 1e-9);
    }
}
