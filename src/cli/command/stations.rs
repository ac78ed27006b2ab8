//! Download the station inventory and save it to disk.

use std::fs;

use anyhow::Result;

use super::make_report_file_name;
use crate::{config::Config, download::make_client, parquet, stations::fetch_stations};

pub async fn stations(config: &Config) -> Result<String> {
    let client = make_client()?;
    let stations = fetch_stations(&client, &config.stations_url, config.station_crs, &config.basin_filter).await?;

    fs::create_dir_all(&config.output_dir)?;
    let file_name = make_report_file_name(&config.output_dir, "stations", "inventory");
    parquet::save_stations(&stations, &file_name)?;

    Ok(file_name.to_string_lossy().to_string())
}

// -- Tests -------------------------------------------------------------------
