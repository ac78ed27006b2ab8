//! Coordinate reference systems and the transforms between them.
//!
//! Only the systems the data sources actually use are supported: the grid
//! service and station inventory deliver geographic coordinates, the basin
//! layer is NAD83 and map layers are written in Web Mercator.

use std::{fmt, str::FromStr};

use geo::{Coord, MapCoords, MultiPolygon};
use serde::{Deserialize, Serialize};

use super::GridError;

const EARTH_RADIUS_M: f64 = 6378137.0;
const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    /// EPSG:4326, longitude/latitude in degrees.
    Wgs84,
    /// EPSG:4269. Treated as coincident with WGS84; the datum shift is well
    /// below the resolution of any grid we sample.
    Nad83,
    /// EPSG:3857, metres.
    WebMercator,
}

impl Crs {
    pub fn code(&self) -> &'static str {
        match self {
            Crs::Wgs84 => "EPSG:4326",
            Crs::Nad83 => "EPSG:4269",
            Crs::WebMercator => "EPSG:3857",
        }
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Wgs84 | Crs::Nad83)
    }

    /// Transforms a coordinate expressed in `self` into `target`.
    pub fn transform(&self, coord: Coord<f64>, target: Crs) -> Coord<f64> {
        if *self == target || (self.is_geographic() && target.is_geographic()) {
            return coord;
        }

        let geographic = match self {
            Crs::WebMercator => mercator_to_lon_lat(coord),
            _ => coord,
        };

        match target {
            Crs::WebMercator => lon_lat_to_mercator(geographic),
            _ => geographic,
        }
    }

    pub fn transform_multi_polygon(
        &self,
        geometry: &MultiPolygon<f64>,
        target: Crs,
    ) -> MultiPolygon<f64> {
        let source = *self;
        geometry.map_coords(|c| source.transform(c, target))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Crs {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "EPSG:4326" | "WGS84" | "CRS:84" => Ok(Crs::Wgs84),
            "EPSG:4269" | "NAD83" => Ok(Crs::Nad83),
            "EPSG:3857" | "EPSG:900913" => Ok(Crs::WebMercator),
            other => Err(GridError::UnsupportedCrs(other.to_string())),
        }
    }
}

impl TryFrom<String> for Crs {
    type Error = GridError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.code().to_string()
    }
}

fn lon_lat_to_mercator(coord: Coord<f64>) -> Coord<f64> {
    let lat = coord.y.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let x = coord.x.to_radians() * EARTH_RADIUS_M;
    let y = ((std::f64::consts::PI / 4.0) + (lat.to_radians() / 2.0)).tan().ln() * EARTH_RADIUS_M;

    Coord { x, y }
}

fn mercator_to_lon_lat(coord: Coord<f64>) -> Coord<f64> {
    let lon = (coord.x / EARTH_RADIUS_M).to_degrees();
    let lat = (2.0 * (coord.y / EARTH_RADIUS_M).exp().atan() - std::f64::consts::PI / 2.0)
        .to_degrees();

    Coord { x: lon, y: lat }
}

// -- Tests -------------------------------------------------------------------
