//! Handles serialising and saving reports to disk in the _parquet_ file format.

pub mod basins;
pub mod raster;
pub mod stations;

use std::{fs::File, path::Path, sync::Arc};

use anyhow::Result;
use arrow::{array::ArrayRef, record_batch::RecordBatch};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};

pub use basins::{save_basin_means, save_basin_groups};
pub use raster::save_raster;
pub use stations::{save_station_comparisons, save_stations};

/// Writes `columns` as a single SNAPPY-compressed record batch.
fn write_columns(file_path: &Path, columns: Vec<(&str, ArrayRef)>) -> Result<()> {
    let batch = RecordBatch::try_from_iter(columns)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let file = File::create(file_path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

fn column<A: arrow::array::Array + 'static>(array: A) -> ArrayRef {
    Arc::new(array)
}
