//! Watershed (HUC) polygons.

use anyhow::{anyhow, Context, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::{download::fetch_text, grid::Crs};

#[derive(Debug, Clone, PartialEq)]
pub struct BasinPolygon {
    pub huc: String,
    pub name: String,
    pub geometry: MultiPolygon<f64>,
    pub crs: Crs,
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: serde_json::Map<String, Value>,
    #[serde(default)]
    geometry: Value,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
enum Geometry {
    Polygon(Vec<Vec<[f64; 2]>>),
    MultiPolygon(Vec<Vec<Vec<[f64; 2]>>>),
}

const HUC_KEYS: [&str; 5] = ["huc", "huc12", "huc10", "huc8", "huc6"];

/// Parses a GeoJSON FeatureCollection of basin polygons.
///
/// Features without a HUC code or a polygonal geometry are skipped.
pub fn parse_basins(json: &str, crs: Crs) -> Result<Vec<BasinPolygon>> {
    let collection: FeatureCollection = serde_json::from_str(json).context("Malformed basin GeoJSON")?;
    let mut basins = Vec::with_capacity(collection.features.len());

    for feature in collection.features {
        let huc = HUC_KEYS
            .iter()
            .find_map(|key| property(&feature.properties, key));
        let Some(huc) = huc else {
            warn!("Skipping basin feature without HUC code");
            continue;
        };
        let geometry = match serde_json::from_value::<Geometry>(feature.geometry) {
            Ok(geometry) => geometry,
            Err(e) => {
                warn!("Skipping basin {} without polygonal geometry: {}", huc, e);
                continue;
            }
        };

        basins.push(BasinPolygon {
            name: property(&feature.properties, "name").unwrap_or_else(|| huc.clone()),
            huc,
            geometry: to_multi_polygon(geometry),
            crs,
        });
    }

    Ok(basins)
}

// String or numeric property, case-insensitive key.
fn property(properties: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    properties
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .and_then(|(_, v)| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn to_multi_polygon(geometry: Geometry) -> MultiPolygon<f64> {
    match geometry {
        Geometry::Polygon(rings) => MultiPolygon::new(vec![to_polygon(rings)]),
        Geometry::MultiPolygon(polygons) => MultiPolygon::new(polygons.into_iter().map(to_polygon).collect()),
    }
}

fn to_polygon(rings: Vec<Vec<[f64; 2]>>) -> Polygon<f64> {
    let mut rings = rings.into_iter().map(|ring| {
        LineString::new(ring.into_iter().map(|[x, y]| Coord { x, y }).collect())
    });
    let exterior = rings.next().unwrap_or_else(|| LineString::new(vec![]));

    Polygon::new(exterior, rings.collect())
}

/// Keeps basins whose HUC starts with any of `prefixes` (all when empty).
pub fn filter_basins(basins: Vec<BasinPolygon>, prefixes: &[String]) -> Vec<BasinPolygon> {
    if prefixes.is_empty() {
        return basins;
    }

    basins
        .into_iter()
        .filter(|b| prefixes.iter().any(|p| b.huc.starts_with(p.as_str())))
        .collect()
}

pub async fn fetch_basins(client: &Client, location: &str, crs: Crs, prefixes: &[String]) -> Result<Vec<BasinPolygon>> {
    let json = fetch_text(client, location).await?;
    let basins = filter_basins(parse_basins(&json, crs)?, prefixes);

    if basins.is_empty() {
        return Err(anyhow!("No basins in `{}` match {:?}", location, prefixes));
    }
    info!("Loaded {} basins", basins.len());

    Ok(basins)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test {
    use geo::{polygon, Area};

    use super::*;

    pub fn basin_fixture(huc: &str, xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> BasinPolygon {
        BasinPolygon {
            huc: huc.to_string(),
            name: format!("Basin {}", huc),
            geometry: MultiPolygon::new(vec![polygon![
                (x: xmin, y: ymin),
                (x: xmax, y: ymin),
                (x: xmax, y: ymax),
                (x: xmin, y: ymax),
                (x: xmin, y: ymin),
            ]]),
            crs: Crs::Wgs84,
        }
    }

    const GEOJSON: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"HUC8": "14010001", "NAME": "Colorado Headwaters"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[2,0],[2,2],[0,2],[0,0]]]}},
            {"type": "Feature", "properties": {"huc8": 10190002},
             "geometry": {"type": "MultiPolygon", "coordinates": [
                [[[0,0],[1,0],[1,1],[0,1],[0,0]]],
                [[[5,5],[6,5],[6,6],[5,6],[5,5]]]
             ]}},
            {"type": "Feature", "properties": {"name": "no code"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}}
        ]
    }"#;

    #[test]
    fn should_parse_polygons_and_multipolygons() {
        let basins = parse_basins(GEOJSON, Crs::Nad83).unwrap();

        assert_eq!(basins.len(), 2);
        assert_eq!(basins[0].huc, "14010001");
        assert_eq!(basins[0].name, "Colorado Headwaters");
        assert_eq!(basins[0].geometry.unsigned_area(), 4.0);
        assert_eq!(basins[1].huc, "10190002");
        assert_eq!(basins[1].name, "10190002");
        assert_eq!(basins[1].geometry.0.len(), 2);
        assert_eq!(basins[1].crs, Crs::Nad83);
    }

    #[test]
    fn should_filter_by_prefix() {
        let basins = parse_basins(GEOJSON, Crs::Nad83).unwrap();

        let kept = filter_basins(basins.clone(), &["1401".to_string()]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].huc, "14010001");

        assert_eq!(filter_basins(basins, &[]).len(), 2);
    }

    #[test]
    fn should_skip_non_polygonal_features() {
        let json = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"huc8": "14010001"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
            {"type": "Feature", "properties": {"huc8": "14010002"},
             "geometry": {"type": "LineString", "coordinates": [[0,0],[1,1]]}},
            {"type": "Feature", "properties": {"huc8": "14010003"},
             "geometry": {"type": "Point", "coordinates": [0,0]}},
            {"type": "Feature", "properties": {"huc8": "14010004"}, "geometry": null}
        ]}"#;

        let basins = parse_basins(json, Crs::Wgs84).unwrap();

        assert_eq!(basins.len(), 1);
        assert_eq!(basins[0].huc, "14010001");
    }
}
