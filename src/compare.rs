//! Raster comparison and extraction at stations and basins.

use std::collections::{BTreeMap, BTreeSet};

use geo::{BoundingRect, Contains, Coord, Point};

use crate::{
    basins::BasinPolygon,
    ensemble::{finite, zip_channels, Channels, Statistic, SummaryRaster},
    grid::{Crs, GridError},
    stations::StationRecord,
};

/// `100 * value / normal`, missing when either side is missing or the
/// normal is zero.
pub fn percent_of(value: f64, normal: f64) -> Option<f64> {
    if !value.is_finite() || !normal.is_finite() || normal == 0.0 {
        return None;
    }

    finite(100.0 * value / normal)
}

/// Cell-wise percent of normal per channel. Both rasters must share a grid.
pub fn percent_of_normal(future: &SummaryRaster, reference: &SummaryRaster) -> Result<SummaryRaster, GridError> {
    zip_channels(future, reference, |f, r| percent_of(f, r).unwrap_or(f64::NAN))
}

/// Samples the cell containing each point, after reprojecting the point to
/// the raster's CRS. Points off the grid give missing values.
pub fn extract_points(raster: &SummaryRaster, points: &[(Coord<f64>, Crs)]) -> Vec<Channels<Option<f64>>> {
    let spec = raster.spec();

    points
        .iter()
        .map(|(coord, crs)| {
            let projected = crs.transform(*coord, spec.crs);
            match spec.cell_of(projected) {
                Some((row, col)) => raster.values_at(row, col),
                None => [None; 5],
            }
        })
        .collect()
}

/// Mean raster value within a basin.
#[derive(Debug, Clone, PartialEq)]
pub struct BasinRasterMean {
    pub huc: String,
    pub name: String,
    pub means: Channels<Option<f64>>,
    /// Cells whose centre lies inside the basin.
    pub cells: usize,
}

/// Averages the valid cells whose centre falls inside each basin.
///
/// Basins without any valid cell are left out altogether.
pub fn polygon_means(raster: &SummaryRaster, basins: &[BasinPolygon]) -> Vec<BasinRasterMean> {
    let spec = raster.spec();
    let mut results = Vec::new();

    for basin in basins {
        let geometry = spec.wrap_geometry(basin.crs.transform_multi_polygon(&basin.geometry, spec.crs));
        let Some(bounds) = geometry.bounding_rect() else {
            continue;
        };
        let Some((row_start, row_end, col_start, col_end)) =
            spec.window(bounds.min().x, bounds.min().y, bounds.max().x, bounds.max().y)
        else {
            continue;
        };

        let mut sums = [0.0; 5];
        let mut counts = [0usize; 5];
        let mut cells = 0;

        for row in row_start..row_end {
            for col in col_start..col_end {
                if !geometry.contains(&Point::from(spec.cell_center(row, col))) {
                    continue;
                }
                cells += 1;

                for (i, value) in raster.values_at(row, col).into_iter().enumerate() {
                    if let Some(v) = value {
                        sums[i] += v;
                        counts[i] += 1;
                    }
                }
            }
        }

        if counts.iter().all(|&n| n == 0) {
            continue;
        }

        results.push(BasinRasterMean {
            huc: basin.huc.clone(),
            name: basin.name.clone(),
            means: std::array::from_fn(|i| (counts[i] > 0).then(|| sums[i] / counts[i] as f64)),
            cells,
        });
    }

    results
}

/// Mean of station ratios within a basin.
#[derive(Debug, Clone, PartialEq)]
pub struct BasinStationGroup {
    pub huc: String,
    pub mean: f64,
    pub stations: usize,
}

/// Groups station ratios by basin. A station counts once towards every basin
/// it belongs to; stations with a missing ratio do not count. Basins with
/// fewer than `min_stations` contributors are dropped.
pub fn group_by_basin(
    ratios: &[(String, Option<f64>)],
    stations: &[StationRecord],
    min_stations: usize,
) -> Vec<BasinStationGroup> {
    let basins_of: BTreeMap<&str, &[String]> = stations
        .iter()
        .map(|s| (s.station_id.as_str(), s.basins.as_slice()))
        .collect();

    let mut groups: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for (station_id, ratio) in ratios {
        let (Some(ratio), Some(basins)) = (ratio, basins_of.get(station_id.as_str())) else {
            continue;
        };
        let distinct: BTreeSet<&str> = basins.iter().map(String::as_str).collect();
        for huc in distinct {
            let entry = groups.entry(huc).or_insert((0.0, 0));
            entry.0 += ratio;
            entry.1 += 1;
        }
    }

    groups
        .into_iter()
        .filter(|(_, (_, n))| *n >= min_stations)
        .map(|(huc, (sum, n))| BasinStationGroup {
            huc: huc.to_string(),
            mean: sum / n as f64,
            stations: n,
        })
        .collect()
}

/// Modeled values at one station compared against its normal.
#[derive(Debug, Clone, PartialEq)]
pub struct StationComparison {
    pub station_id: String,
    pub name: String,
    pub location: Coord<f64>,
    pub crs: Crs,
    pub normal: f64,
    pub modeled_reference: Channels<Option<f64>>,
    pub modeled_future: Channels<Option<f64>>,
    /// Future modeled value as a percent of the station normal.
    pub percent_of_normal: Channels<Option<f64>>,
    /// Modeled reference median as a percent of the station normal.
    pub reference_bias: Option<f64>,
}

impl StationComparison {
    pub fn ratio(&self, statistic: Statistic) -> Option<f64> {
        self.percent_of_normal[statistic.index()]
    }
}

/// Compares both summaries against each station's normal for `period`.
/// Stations without that normal are skipped.
pub fn compare_stations(
    stations: &[StationRecord],
    period: &str,
    reference: &SummaryRaster,
    future: &SummaryRaster,
) -> Vec<StationComparison> {
    let with_normal: Vec<(&StationRecord, f64)> = stations
        .iter()
        .filter_map(|s| s.normal(period).map(|n| (s, n)))
        .collect();
    let points: Vec<(Coord<f64>, Crs)> = with_normal.iter().map(|(s, _)| (s.location, s.crs)).collect();

    let reference_values = extract_points(reference, &points);
    let future_values = extract_points(future, &points);

    with_normal
        .into_iter()
        .zip(reference_values.into_iter().zip(future_values))
        .map(|((station, normal), (modeled_reference, modeled_future))| StationComparison {
            station_id: station.station_id.clone(),
            name: station.name.clone(),
            location: station.location,
            crs: station.crs,
            normal,
            modeled_reference,
            modeled_future,
            percent_of_normal: modeled_future.map(|v| v.and_then(|v| percent_of(v, normal))),
            reference_bias: modeled_reference[Statistic::Median.index()].and_then(|v| percent_of(v, normal)),
        })
        .collect()
}

// -- Tests -------------------------------------------------------------------
