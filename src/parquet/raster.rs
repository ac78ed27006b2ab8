//! Save a five-channel raster as a long-format map layer.

use std::path::Path;

use anyhow::Result;
use arrow::array::{Float64Array, UInt32Array};

use super::{column, write_columns};
use crate::{
    ensemble::{Statistic, SummaryRaster},
    grid::Crs,
};

/// One row per cell: grid indices, cell centre in the raster CRS and in
/// `display`, and every channel (null where missing).
pub fn save_raster(raster: &SummaryRaster, display: Crs, file_path: &Path) -> Result<()> {
    let spec = raster.spec();
    let total_rows = spec.rows * spec.cols;

    let mut rows = Vec::with_capacity(total_rows);
    let mut cols = Vec::with_capacity(total_rows);
    let mut xs = Vec::with_capacity(total_rows);
    let mut ys = Vec::with_capacity(total_rows);
    let mut display_xs = Vec::with_capacity(total_rows);
    let mut display_ys = Vec::with_capacity(total_rows);
    let mut channels: Vec<Vec<Option<f64>>> = Statistic::ALL.iter().map(|_| Vec::with_capacity(total_rows)).collect();

    for row in 0..spec.rows {
        for col in 0..spec.cols {
            let centre = spec.cell_center(row, col);
            let shown = spec.crs.transform(centre, display);

            rows.push(row as u32);
            cols.push(col as u32);
            xs.push(centre.x);
            ys.push(centre.y);
            display_xs.push(shown.x);
            display_ys.push(shown.y);

            for (values, value) in channels.iter_mut().zip(raster.values_at(row, col)) {
                values.push(value);
            }
        }
    }

    let mut columns = vec![
        ("row", column(UInt32Array::from(rows))),
        ("col", column(UInt32Array::from(cols))),
        ("x", column(Float64Array::from(xs))),
        ("y", column(Float64Array::from(ys))),
        ("display_x", column(Float64Array::from(display_xs))),
        ("display_y", column(Float64Array::from(display_ys))),
    ];
    for (statistic, values) in Statistic::ALL.iter().zip(channels) {
        columns.push((statistic.name(), column(Float64Array::from(values))));
    }

    write_columns(file_path, columns)
}

// -- Tests -------------------------------------------------------------------
