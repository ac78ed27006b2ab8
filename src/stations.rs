//! Snow station inventory and normals.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result};
use geo::Coord;
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;

use crate::{download::fetch_text, grid::Crs};

/// A snow station and the normals known for it.
#[derive(Debug, Clone, PartialEq)]
pub struct StationRecord {
    pub station_id: String,
    pub name: String,
    pub elevation: Option<f64>,
    /// Longitude/latitude (or easting/northing) in `crs`.
    pub location: Coord<f64>,
    pub crs: Crs,
    /// HUC codes of every basin the station belongs to.
    pub basins: Vec<String>,
    /// Normal value (inches) keyed by reference period label, e.g. `1981-2010`.
    pub normals: BTreeMap<String, f64>,
}

impl StationRecord {
    pub fn normal(&self, period: &str) -> Option<f64> {
        self.normals.get(period).copied()
    }

    /// Keeps only the basins matching `prefixes` (all when empty), or
    /// `None` when the station lies in none of them.
    pub fn within_basins(mut self, prefixes: &[String]) -> Option<Self> {
        if prefixes.is_empty() {
            return Some(self);
        }

        self.basins
            .retain(|huc| prefixes.iter().any(|p| huc.starts_with(p.as_str())));

        (!self.basins.is_empty()).then_some(self)
    }
}

#[derive(Debug, Deserialize)]
struct InventoryRow {
    station_id: String,
    #[serde(default)]
    name: String,
    latitude: f64,
    longitude: f64,
    elevation: Option<f64>,
    #[serde(default)]
    hucs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct NormalRow {
    station_id: String,
    value: Option<f64>,
}

/// Parses the station inventory JSON.
pub fn parse_inventory(json: &str, crs: Crs) -> Result<Vec<StationRecord>> {
    let rows: Vec<InventoryRow> = serde_json::from_str(json).context("Malformed station inventory")?;

    let stations = rows
        .into_iter()
        .map(|row| StationRecord {
            station_id: row.station_id.trim().to_string(),
            name: row.name.trim().to_string(),
            elevation: row.elevation,
            location: Coord {
                x: row.longitude,
                y: row.latitude,
            },
            crs,
            basins: row.hucs.into_iter().map(|h| h.trim().to_string()).collect(),
            normals: BTreeMap::new(),
        })
        .collect();

    Ok(stations)
}

/// Parses a normals response into station id to value (inches).
///
/// Null and negative values are dropped: a normal is non-negative or absent.
pub fn parse_normals(json: &str) -> Result<HashMap<String, f64>> {
    let rows: Vec<NormalRow> = serde_json::from_str(json).context("Malformed station normals")?;
    let mut normals = HashMap::with_capacity(rows.len());

    for row in rows {
        match row.value.and_then(filter_normal) {
            Some(value) => {
                normals.insert(row.station_id.trim().to_string(), value);
            }
            None if row.value.is_some() => {
                warn!("Ignoring invalid normal {:?} for {}", row.value, row.station_id)
            }
            None => {}
        }
    }

    Ok(normals)
}

fn filter_normal(value: f64) -> Option<f64> {
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// Attaches one period's normals to the stations that have them.
pub fn attach_normals(stations: &mut [StationRecord], period: &str, normals: &HashMap<String, f64>) {
    for station in stations.iter_mut() {
        if let Some(value) = normals.get(&station.station_id) {
            station.normals.insert(period.to_string(), *value);
        }
    }
}

/// Expands the normals location template.
pub fn normals_location(template: &str, station_ids: &[&str], element: &str, date: &str, period: &str) -> String {
    template
        .replace("{stations}", &station_ids.join(","))
        .replace("{element}", element)
        .replace("{date}", date)
        .replace("{period}", period)
}

/// Drops stations outside `prefixes` and the basins of kept stations that
/// fall outside them.
pub fn filter_stations(stations: Vec<StationRecord>, prefixes: &[String]) -> Vec<StationRecord> {
    stations
        .into_iter()
        .filter_map(|s| s.within_basins(prefixes))
        .collect()
}

pub async fn fetch_stations(client: &Client, location: &str, crs: Crs, basin_prefixes: &[String]) -> Result<Vec<StationRecord>> {
    let json = fetch_text(client, location).await?;
    let stations = filter_stations(parse_inventory(&json, crs)?, basin_prefixes);

    info!("Loaded {} stations", stations.len());

    Ok(stations)
}

pub async fn fetch_normals(
    client: &Client,
    template: &str,
    stations: &[StationRecord],
    element: &str,
    date: &str,
    period: &str,
) -> Result<HashMap<String, f64>> {
    let ids: Vec<&str> = stations.iter().map(|s| s.station_id.as_str()).collect();
    let location = normals_location(template, &ids, element, date, period);
    let json = fetch_text(client, &location).await?;
    let normals = parse_normals(&json)?;

    info!("Loaded {} normals for {}", normals.len(), period);

    Ok(normals)
}

// -- Tests -------------------------------------------------------------------
