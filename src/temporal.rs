//! Reduces a monthly series to one snapshot grid per year.

use std::collections::BTreeMap;

use chrono::Datelike;
use log::warn;
use ndarray::Array2;

use crate::grid::{GridSpec, GriddedSeries};

/// Millimetres to inches.
pub const MM_TO_INCHES: f64 = 0.0393701;

/// One grid per year, in inches.
#[derive(Debug, Clone)]
pub struct AnnualStack {
    pub variable: String,
    pub spec: GridSpec,
    pub years: BTreeMap<i32, Array2<f64>>,
}

/// Keeps the first grid of `month` in each year of `years` and converts it
/// to inches.
pub fn annual_snapshots(
    series: &GriddedSeries,
    month: u32,
    years: std::ops::RangeInclusive<i32>,
) -> AnnualStack {
    if !series.units().eq_ignore_ascii_case("mm") {
        warn!(
            "`{}` is in `{}`, converting as millimetres",
            series.variable(),
            series.units()
        );
    }

    let mut snapshots = BTreeMap::new();
    for (date, grid) in series.iter() {
        if date.month() != month || !years.contains(&date.year()) {
            continue;
        }

        snapshots
            .entry(date.year())
            .or_insert_with(|| grid.mapv(|mm| mm * MM_TO_INCHES));
    }

    AnnualStack {
        variable: series.variable().to_string(),
        spec: *series.spec(),
        years: snapshots,
    }
}

// -- Tests -------------------------------------------------------------------
