//! Remote grid acquisition.
//!
//! A [`GridSource`] returns the raw payload for one ensemble member;
//! [`fetch_series`] layers the download cache and retries on top of it.

use std::time::Duration;

use chrono::NaiveDate;
use futures::{stream, StreamExt};
use log::{debug, error, info, warn};
use ndarray::Array2;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use super::{Crs, Extent, GridCache, GridError, GridSpec, GriddedSeries};
use crate::{cli::create_progress_bar, download::download_bytes};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no data for `{0}`")]
    NotFound(String),
    #[error("grid service responded with status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("cache error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed grid payload: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Grid(#[from] GridError),
}

impl FetchError {
    /// Whether retrying the same request might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status(code) => *code >= 500 || *code == 429,
            FetchError::Transport(_) => true,
            _ => false,
        }
    }
}

/// One ensemble member request.
#[derive(Debug, Clone)]
pub struct GridRequest {
    pub variable: String,
    pub scenario: String,
    pub bbox: Extent,
    pub start_year: i32,
    pub end_year: i32,
}

impl GridRequest {
    pub fn start_date(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.start_year, 1, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn end_date(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.end_year, 12, 31).unwrap_or(NaiveDate::MAX)
    }
}

pub trait GridSource {
    /// Returns the raw (uncompressed JSON) payload for `request`.
    async fn fetch_raw(&self, request: &GridRequest) -> Result<Vec<u8>, FetchError>;
}

/// Grid subsetting service speaking NCSS-style query parameters.
pub struct HttpGridSource {
    client: Client,
    base_url: String,
}

impl HttpGridSource {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        HttpGridSource {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn request_url(&self, request: &GridRequest) -> String {
        let bbox = request.bbox;
        format!(
            "{}?var={}&scenario={}&north={}&south={}&east={}&west={}&crs={}&time_start={}&time_end={}&accept=json",
            self.base_url.trim_end_matches('?'),
            request.variable,
            request.scenario,
            bbox.ymax,
            bbox.ymin,
            bbox.xmax,
            bbox.xmin,
            bbox.crs,
            request.start_date(),
            request.end_date(),
        )
    }
}

impl GridSource for HttpGridSource {
    async fn fetch_raw(&self, request: &GridRequest) -> Result<Vec<u8>, FetchError> {
        let url = self.request_url(request);

        match download_bytes(&self.client, &url).await {
            Err(FetchError::NotFound(_)) => Err(FetchError::NotFound(request.variable.clone())),
            other => other,
        }
    }
}

/// Retry policy for retryable fetch failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
        }
    }
}

/// Loads one member, from the cache when present, otherwise from `source`.
pub async fn fetch_series<S: GridSource>(
    source: &S,
    cache: &GridCache,
    request: &GridRequest,
    retry: RetryPolicy,
) -> Result<GriddedSeries, FetchError> {
    let cached = cache
        .load(&request.variable, request.start_year, request.end_year)
        .map_err(FetchError::from)
        .and_then(|raw| raw.map(|raw| parse_payload(&raw)).transpose());
    match cached {
        Ok(Some(series)) => {
            debug!("Cache hit for {} {}-{}", request.variable, request.start_year, request.end_year);
            return Ok(series);
        }
        Ok(None) => {}
        Err(e) => {
            warn!("Discarding unreadable cache entry for {}: {}", request.variable, e);
            cache.remove(&request.variable, request.start_year, request.end_year)?;
        }
    }

    let mut delay = retry.initial_delay;
    let mut attempt = 0;
    let raw = loop {
        match source.fetch_raw(request).await {
            Ok(raw) => break raw,
            Err(e) if e.is_retryable() && attempt < retry.max_retries => {
                attempt += 1;
                warn!(
                    "Fetching {} failed ({}); retry {}/{} in {:?}",
                    request.variable, e, attempt, retry.max_retries, delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    };

    // Validate before caching so a malformed response is never persisted.
    let series = parse_payload(&raw)?;
    cache.store(&request.variable, request.start_year, request.end_year, &raw)?;
    debug!("Cached {} grids for {}", series.len(), request.variable);

    Ok(series)
}

/// Fetches every member concurrently, dropping the ones that fail.
pub async fn fetch_ensemble<S: GridSource>(
    source: &S,
    cache: &GridCache,
    requests: &[GridRequest],
    concurrency: usize,
    retry: RetryPolicy,
) -> Vec<GriddedSeries> {
    let pb = create_progress_bar(requests.len() as u64, "Fetching ensemble members...".to_string());
    let bar = &pb;

    let results: Vec<_> = stream::iter(requests)
        .map(move |request| async move {
            let result = fetch_series(source, cache, request, retry).await;
            bar.inc(1);
            (request, result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    pb.finish_and_clear();

    let mut members = Vec::with_capacity(results.len());
    for (request, result) in results {
        match result {
            Ok(series) => members.push(series),
            Err(FetchError::NotFound(_)) => {
                warn!("No `{}` for {}-{}; dropping member", request.variable, request.start_year, request.end_year)
            }
            Err(e) => error!("Failed to fetch `{}`: {}; dropping member", request.variable, e),
        }
    }

    // Completion order is arbitrary; keep members in a stable order.
    members.sort_by(|a, b| a.variable().cmp(b.variable()));
    info!("Fetched {} of {} ensemble members", members.len(), requests.len());

    members
}

#[derive(Debug, Deserialize)]
struct GridPayload {
    variable: String,
    #[serde(default = "default_units")]
    units: String,
    crs: Crs,
    origin_x: f64,
    origin_y: f64,
    cell_width: f64,
    cell_height: f64,
    rows: usize,
    cols: usize,
    times: Vec<NaiveDate>,
    values: Vec<Vec<Vec<Option<f64>>>>,
}

fn default_units() -> String {
    "mm".to_string()
}

/// Parses a raw grid payload into a validated series.
pub fn parse_payload(raw: &[u8]) -> Result<GriddedSeries, FetchError> {
    let payload: GridPayload = serde_json::from_slice(raw)?;
    let spec = GridSpec {
        origin_x: payload.origin_x,
        origin_y: payload.origin_y,
        cell_width: payload.cell_width,
        cell_height: payload.cell_height,
        rows: payload.rows,
        cols: payload.cols,
        crs: payload.crs,
    };

    let mut grids = Vec::with_capacity(payload.values.len());
    for (index, rows) in payload.values.into_iter().enumerate() {
        grids.push(to_grid(&payload.variable, index, rows, &spec)?);
    }

    Ok(GriddedSeries::new(payload.variable, payload.units, spec, payload.times, grids)?)
}

fn to_grid(
    variable: &str,
    index: usize,
    rows: Vec<Vec<Option<f64>>>,
    spec: &GridSpec,
) -> Result<Array2<f64>, GridError> {
    let invalid = |reason: String| GridError::InvalidSeries {
        variable: variable.to_string(),
        reason,
    };

    if rows.len() != spec.rows || rows.iter().any(|r| r.len() != spec.cols) {
        return Err(invalid(format!("grid {} does not match {}x{}", index, spec.rows, spec.cols)));
    }

    let cells: Vec<f64> = rows
        .into_iter()
        .flatten()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();

    Array2::from_shape_vec(spec.shape(), cells).map_err(|e| invalid(e.to_string()))
}

// -- Tests -------------------------------------------------------------------
