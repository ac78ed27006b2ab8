//! Save station inventories and station comparisons to parquet files.

use std::path::Path;

use anyhow::Result;
use arrow::array::{Float64Array, StringArray};

use super::{column, write_columns};
use crate::{compare::StationComparison, ensemble::Statistic, stations::StationRecord};

pub fn save_stations(stations: &[StationRecord], file_path: &Path) -> Result<()> {
    let mut ids = Vec::with_capacity(stations.len());
    let mut names = Vec::with_capacity(stations.len());
    let mut xs = Vec::with_capacity(stations.len());
    let mut ys = Vec::with_capacity(stations.len());
    let mut crss = Vec::with_capacity(stations.len());
    let mut elevations = Vec::with_capacity(stations.len());
    let mut basins = Vec::with_capacity(stations.len());

    for s in stations {
        ids.push(s.station_id.clone());
        names.push(s.name.clone());
        xs.push(s.location.x);
        ys.push(s.location.y);
        crss.push(s.crs.code());
        elevations.push(s.elevation);
        basins.push(s.basins.join(";"));
    }

    let columns = vec![
        ("station_id", column(StringArray::from(ids))),
        ("name", column(StringArray::from(names))),
        ("x", column(Float64Array::from(xs))),
        ("y", column(Float64Array::from(ys))),
        ("crs", column(StringArray::from(crss))),
        ("elevation", column(Float64Array::from(elevations))),
        ("basins", column(StringArray::from(basins))),
    ];

    write_columns(file_path, columns)
}

pub fn save_station_comparisons(comparisons: &[StationComparison], file_path: &Path) -> Result<()> {
    let num_rows = comparisons.len();

    let mut ids = Vec::with_capacity(num_rows);
    let mut names = Vec::with_capacity(num_rows);
    let mut xs = Vec::with_capacity(num_rows);
    let mut ys = Vec::with_capacity(num_rows);
    let mut crss = Vec::with_capacity(num_rows);
    let mut normals = Vec::with_capacity(num_rows);
    let mut reference_medians = Vec::with_capacity(num_rows);
    let mut biases = Vec::with_capacity(num_rows);
    let mut futures: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(num_rows); 5];
    let mut percents: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(num_rows); 5];

    for c in comparisons {
        ids.push(c.station_id.clone());
        names.push(c.name.clone());
        xs.push(c.location.x);
        ys.push(c.location.y);
        crss.push(c.crs.code());
        normals.push(c.normal);
        reference_medians.push(c.modeled_reference[Statistic::Median.index()]);
        biases.push(c.reference_bias);

        for s in Statistic::ALL {
            futures[s.index()].push(c.modeled_future[s.index()]);
            percents[s.index()].push(c.percent_of_normal[s.index()]);
        }
    }

    let future_names = Statistic::ALL.map(|s| format!("future_{}", s));
    let percent_names = Statistic::ALL.map(|s| format!("pct_normal_{}", s));

    let mut columns = vec![
        ("station_id", column(StringArray::from(ids))),
        ("name", column(StringArray::from(names))),
        ("x", column(Float64Array::from(xs))),
        ("y", column(Float64Array::from(ys))),
        ("crs", column(StringArray::from(crss))),
        ("normal", column(Float64Array::from(normals))),
        ("reference_median", column(Float64Array::from(reference_medians))),
        ("reference_pct_normal", column(Float64Array::from(biases))),
    ];
    for (name, values) in future_names.iter().zip(futures) {
        columns.push((name.as_str(), column(Float64Array::from(values))));
    }
    for (name, values) in percent_names.iter().zip(percents) {
        columns.push((name.as_str(), column(Float64Array::from(values))));
    }

    write_columns(file_path, columns)
}

// -- Tests -------------------------------------------------------------------
