//! Gridded raster types.
//!
//! Grids are north-up `Array2<f64>` indexed `[row, col]` with `NaN` marking
//! missing cells. A [`GridSpec`] carries the geometry and CRS shared by every
//! grid in a series.

pub mod cache;
pub mod crs;
pub mod source;

use chrono::NaiveDate;
use geo::{BoundingRect, Coord, MapCoords, MultiPolygon};
use ndarray::Array2;
use thiserror::Error;

pub use cache::GridCache;
pub use crs::Crs;
pub use source::{fetch_ensemble, FetchError, GridRequest, GridSource, HttpGridSource};

const ALIGNMENT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("grid shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },
    #[error("invalid gridded series `{variable}`: {reason}")]
    InvalidSeries { variable: String, reason: String },
    #[error("unsupported coordinate reference system `{0}`")]
    UnsupportedCrs(String),
    #[error("ensemble is empty")]
    EmptyEnsemble,
}

/// Bounding box in a known CRS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    pub crs: Crs,
}

/// North-up grid geometry. The origin is the top-left corner of the
/// top-left cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    pub origin_x: f64,
    pub origin_y: f64,
    pub cell_width: f64,
    pub cell_height: f64,
    pub rows: usize,
    pub cols: usize,
    pub crs: Crs,
}

impl GridSpec {
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_aligned(&self, other: &GridSpec) -> bool {
        self.rows == other.rows
            && self.cols == other.cols
            && self.crs == other.crs
            && (self.origin_x - other.origin_x).abs() < ALIGNMENT_TOLERANCE
            && (self.origin_y - other.origin_y).abs() < ALIGNMENT_TOLERANCE
            && (self.cell_width - other.cell_width).abs() < ALIGNMENT_TOLERANCE
            && (self.cell_height - other.cell_height).abs() < ALIGNMENT_TOLERANCE
    }

    pub fn ensure_aligned(&self, other: &GridSpec) -> Result<(), GridError> {
        if self.is_aligned(other) {
            Ok(())
        } else {
            Err(GridError::ShapeMismatch {
                expected: self.describe(),
                found: other.describe(),
            })
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "{}x{} cells of {}x{} at ({}, {}) in {}",
            self.rows,
            self.cols,
            self.cell_width,
            self.cell_height,
            self.origin_x,
            self.origin_y,
            self.crs
        )
    }

    pub fn cell_center(&self, row: usize, col: usize) -> Coord<f64> {
        Coord {
            x: self.origin_x + (col as f64 + 0.5) * self.cell_width,
            y: self.origin_y - (row as f64 + 0.5) * self.cell_height,
        }
    }

    /// Returns the `(row, col)` of the cell containing `coord`, which must
    /// already be in this grid's CRS.
    pub fn cell_of(&self, coord: Coord<f64>) -> Option<(usize, usize)> {
        let x = self.wrap_longitude(coord.x);
        let col = ((x - self.origin_x) / self.cell_width).floor();
        let row = ((self.origin_y - coord.y) / self.cell_height).floor();

        if col < 0.0 || row < 0.0 || col >= self.cols as f64 || row >= self.rows as f64 {
            return None;
        }

        Some((row as usize, col as usize))
    }

    /// Index range `(row_start, row_end, col_start, col_end)` of cells whose
    /// centres may fall inside the box, clipped to the grid.
    pub fn window(&self, xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Option<(usize, usize, usize, usize)> {
        let col_start = ((xmin - self.origin_x) / self.cell_width - 0.5).ceil().max(0.0);
        let col_end = ((xmax - self.origin_x) / self.cell_width - 0.5).floor() + 1.0;
        let row_start = ((self.origin_y - ymax) / self.cell_height - 0.5).ceil().max(0.0);
        let row_end = ((self.origin_y - ymin) / self.cell_height - 0.5).floor() + 1.0;

        let col_end = col_end.min(self.cols as f64);
        let row_end = row_end.min(self.rows as f64);

        if col_start >= col_end || row_start >= row_end {
            return None;
        }

        Some((
            row_start as usize,
            row_end as usize,
            col_start as usize,
            col_end as usize,
        ))
    }

    /// Moves a geometry lying west of the prime meridian onto a 0-360 grid,
    /// as [`GridSpec::cell_of`] does for points. The geometry must already be
    /// in this grid's CRS.
    pub fn wrap_geometry(&self, geometry: MultiPolygon<f64>) -> MultiPolygon<f64> {
        let west = geometry.bounding_rect().is_some_and(|b| b.min().x < 0.0);
        if !self.wraps_longitude() || !west {
            return geometry;
        }

        geometry.map_coords(|c| Coord { x: c.x + 360.0, y: c.y })
    }

    // Geographic grids are sometimes published on 0-360 longitudes.
    fn wraps_longitude(&self) -> bool {
        self.crs.is_geographic() && self.origin_x >= 0.0
    }

    fn wrap_longitude(&self, x: f64) -> f64 {
        if self.wraps_longitude() && x < 0.0 {
            x + 360.0
        } else {
            x
        }
    }
}

/// A monthly raster time series for one variable.
#[derive(Debug, Clone)]
pub struct GriddedSeries {
    variable: String,
    units: String,
    spec: GridSpec,
    times: Vec<NaiveDate>,
    grids: Vec<Array2<f64>>,
}

impl GriddedSeries {
    pub fn new(
        variable: impl Into<String>,
        units: impl Into<String>,
        spec: GridSpec,
        times: Vec<NaiveDate>,
        grids: Vec<Array2<f64>>,
    ) -> Result<Self, GridError> {
        let variable = variable.into();
        let invalid = |reason: String| GridError::InvalidSeries {
            variable: variable.clone(),
            reason,
        };

        if times.len() != grids.len() {
            return Err(invalid(format!(
                "{} timestamps but {} grids",
                times.len(),
                grids.len()
            )));
        }

        if let Some(pair) = times.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(invalid(format!(
                "timestamps not strictly increasing at {}",
                pair[1]
            )));
        }

        if let Some(grid) = grids.iter().find(|g| g.dim() != spec.shape()) {
            return Err(invalid(format!(
                "grid shape {:?} does not match spec {:?}",
                grid.dim(),
                spec.shape()
            )));
        }

        Ok(GriddedSeries {
            variable,
            units: units.into(),
            spec,
            times,
            grids,
        })
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &Array2<f64>)> {
        self.times.iter().zip(self.grids.iter())
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use geo::polygon;

    pub fn spec_fixture(rows: usize, cols: usize) -> GridSpec {
        GridSpec {
            origin_x: -110.0,
            origin_y: 42.0,
            cell_width: 1.0,
            cell_height: 1.0,
            rows,
            cols,
            crs: Crs::Wgs84,
        }
    }

    fn date(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    #[test]
    fn should_reject_unordered_timestamps() {
        let spec = spec_fixture(1, 1);
        let grids = vec![Array2::zeros((1, 1)), Array2::zeros((1, 1))];
        let result = GriddedSeries::new("swe", "mm", spec, vec![date(2000, 2), date(2000, 1)], grids);

        assert!(matches!(result, Err(GridError::InvalidSeries { .. })));
    }

    #[test]
    fn should_reject_misshapen_grids() {
        let spec = spec_fixture(2, 2);
        let result = GriddedSeries::new("swe", "mm", spec, vec![date(2000, 1)], vec![Array2::zeros((1, 2))]);

        assert!(result.is_err());
    }

    #[test]
    fn should_find_cell_of_coordinate() {
        let spec = spec_fixture(3, 4);

        assert_eq!(spec.cell_of(Coord { x: -109.5, y: 41.5 }), Some((0, 0)));
        assert_eq!(spec.cell_of(Coord { x: -106.1, y: 39.1 }), Some((2, 3)));
        assert_eq!(spec.cell_of(Coord { x: -111.0, y: 41.5 }), None);
        assert_eq!(spec.cell_of(Coord { x: -109.5, y: 38.5 }), None);
    }

    #[test]
    fn should_wrap_negative_longitudes_on_360_grids() {
        let mut spec = spec_fixture(2, 2);
        spec.origin_x = 250.0;

        assert_eq!(spec.cell_of(Coord { x: -109.5, y: 41.5 }), Some((0, 0)));
    }

    #[test]
    fn should_wrap_western_geometry_on_360_grids() {
        let basin = MultiPolygon::new(vec![geo::polygon![
            (x: -110.0, y: 40.0),
            (x: -108.0, y: 40.0),
            (x: -108.0, y: 42.0),
            (x: -110.0, y: 42.0),
            (x: -110.0, y: 40.0),
        ]]);
        let mut spec = spec_fixture(2, 2);

        assert_eq!(spec.wrap_geometry(basin.clone()), basin);

        spec.origin_x = 250.0;
        let bounds = spec.wrap_geometry(basin).bounding_rect().unwrap();

        assert_eq!(bounds.min().x, 250.0);
        assert_eq!(bounds.max().x, 252.0);
        assert_eq!(spec.window(bounds.min().x, bounds.min().y, bounds.max().x, bounds.max().y), Some((0, 2, 0, 2)));
    }

    #[test]
    fn should_compute_cell_centres() {
        let spec = spec_fixture(3, 4);

        assert_eq!(spec.cell_center(1, 2), Coord { x: -107.5, y: 40.5 });
        assert_eq!(spec.cell_center(2, 3), Coord { x: -106.5, y: 39.5 });
    }

    #[test]
    fn should_clip_window_to_grid() {
        let spec = spec_fixture(3, 4);

        assert_eq!(spec.window(-120.0, 30.0, -100.0, 50.0), Some((0, 3, 0, 4)));
        assert_eq!(spec.window(-109.2, 40.2, -108.2, 41.2), Some((1, 2, 1, 2)));
        assert_eq!(spec.window(-90.0, 30.0, -80.0, 31.0), None);
    }

    #[test]
    fn should_report_shape_mismatch() {
        let a = spec_fixture(2, 2);
        let b = spec_fixture(2, 3);

        assert!(a.ensure_aligned(&a).is_ok());
        assert!(matches!(a.ensure_aligned(&b), Err(GridError::ShapeMismatch { .. })));
    }
}
