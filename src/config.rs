//! Run configuration.
//!
//! Everything the pipeline needs is carried in one [`Config`], loaded from an
//! optional TOML file and then overridden from the command line.

use std::{
    fs,
    ops::RangeInclusive,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::{source::RetryPolicy, Crs, Extent, GridRequest};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config `{path}`: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A span of years drawn from one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub scenario: String,
    pub start_year: i32,
    pub end_year: i32,
}

impl TimeWindow {
    pub fn new(scenario: &str, start_year: i32, end_year: i32) -> Self {
        TimeWindow {
            scenario: scenario.to_string(),
            start_year,
            end_year,
        }
    }

    pub fn years(&self) -> RangeInclusive<i32> {
        self.start_year..=self.end_year
    }

    /// `1981-2010`; also the station normal period label.
    pub fn period(&self) -> String {
        format!("{}-{}", self.start_year, self.end_year)
    }

    pub fn label(&self) -> String {
        format!("{}-{}", self.scenario, self.period())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    pub crs: Crs,
}

impl From<BoundingBox> for Extent {
    fn from(b: BoundingBox) -> Self {
        Extent {
            xmin: b.xmin,
            ymin: b.ymin,
            xmax: b.xmax,
            ymax: b.ymax,
            crs: b.crs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output_dir: PathBuf,
    pub cache_dir: PathBuf,

    /// Grid subsetting service endpoint.
    pub grid_url: String,
    pub variable_family: String,
    pub models: Vec<String>,
    pub reference_windows: Vec<TimeWindow>,
    pub future_window: TimeWindow,
    pub bbox: BoundingBox,
    pub snapshot_month: u32,

    /// Station inventory location (URL or path).
    pub stations_url: String,
    pub station_crs: Crs,
    /// Normals location template; `{stations}`, `{element}`, `{date}` and
    /// `{period}` are substituted.
    pub normals_url: String,
    pub normals_element: String,
    pub normals_date: String,

    /// Basin GeoJSON location (URL or path).
    pub basins_url: String,
    pub basin_crs: Crs,
    /// HUC prefixes to keep; empty keeps every basin.
    pub basin_filter: Vec<String>,
    pub min_stations_per_basin: usize,

    pub display_crs: Crs,
    pub max_concurrent_downloads: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

const DEFAULT_MODELS: [&str; 20] = [
    "bcc-csm1-1",
    "bcc-csm1-1-m",
    "BNU-ESM",
    "CanESM2",
    "CCSM4",
    "CNRM-CM5",
    "CSIRO-Mk3-6-0",
    "GFDL-ESM2G",
    "GFDL-ESM2M",
    "HadGEM2-CC365",
    "HadGEM2-ES365",
    "inmcm4",
    "IPSL-CM5A-LR",
    "IPSL-CM5A-MR",
    "IPSL-CM5B-LR",
    "MIROC-ESM",
    "MIROC-ESM-CHEM",
    "MIROC5",
    "MRI-CGCM3",
    "NorESM1-M",
];

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let cache = dirs::cache_dir()
            .unwrap_or_else(|| home.join(".cache"))
            .join(env!("CARGO_PKG_NAME"));

        Config {
            output_dir: home,
            cache_dir: cache,
            grid_url: "http://localhost:8080/ncss/grid".to_string(),
            variable_family: "swe".to_string(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            reference_windows: vec![
                TimeWindow::new("historical", 1971, 2000),
                TimeWindow::new("historical", 1981, 2010),
            ],
            future_window: TimeWindow::new("rcp85", 2040, 2069),
            bbox: BoundingBox {
                xmin: -109.06,
                ymin: 36.99,
                xmax: -102.04,
                ymax: 41.0,
                crs: Crs::Wgs84,
            },
            snapshot_month: 4,
            stations_url: "stations.json".to_string(),
            station_crs: Crs::Wgs84,
            normals_url: "normals-{period}.json".to_string(),
            normals_element: "WTEQ".to_string(),
            normals_date: "04-01".to_string(),
            basins_url: "basins.geojson".to_string(),
            basin_crs: Crs::Nad83,
            basin_filter: vec![],
            min_stations_per_basin: 3,
            display_crs: Crs::WebMercator,
            max_concurrent_downloads: 4,
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

impl Config {
    /// Loads `path` over the defaults, or the defaults alone.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&text)?
            }
            None => Config::default(),
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.models.is_empty() {
            return invalid("no models configured".to_string());
        }
        if !(1..=12).contains(&self.snapshot_month) {
            return invalid(format!("snapshot_month {} is not a month", self.snapshot_month));
        }
        if self.bbox.xmin >= self.bbox.xmax || self.bbox.ymin >= self.bbox.ymax {
            return invalid("bbox min must be below max".to_string());
        }
        for window in self.reference_windows.iter().chain([&self.future_window]) {
            if window.start_year > window.end_year {
                return invalid(format!("window {} ends before it starts", window.label()));
            }
        }
        if self.reference_windows.is_empty() {
            return invalid("no reference windows configured".to_string());
        }
        if self.min_stations_per_basin == 0 {
            return invalid("min_stations_per_basin must be at least 1".to_string());
        }

        Ok(())
    }

    /// Every configured window, references first.
    pub fn windows(&self) -> Vec<&TimeWindow> {
        self.reference_windows.iter().chain([&self.future_window]).collect()
    }

    pub fn find_window(&self, label: &str) -> Option<&TimeWindow> {
        self.windows()
            .into_iter()
            .find(|w| w.label() == label || w.period() == label)
    }

    pub fn member_variable(&self, model: &str, scenario: &str) -> String {
        format!("{}_{}_{}", self.variable_family, model, scenario)
    }

    /// One request per model for `window`.
    pub fn requests(&self, window: &TimeWindow) -> Vec<GridRequest> {
        self.models
            .iter()
            .map(|model| GridRequest {
                variable: self.member_variable(model, &window.scenario),
                scenario: window.scenario.clone(),
                bbox: self.bbox.into(),
                start_year: window.start_year,
                end_year: window.end_year,
            })
            .collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

// -- Tests -------------------------------------------------------------------
