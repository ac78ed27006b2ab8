//! Save basin-level comparisons to parquet files.

use std::{collections::HashMap, path::Path};

use anyhow::Result;
use arrow::array::{Float64Array, StringArray, UInt64Array};

use super::{column, write_columns};
use crate::{
    compare::{BasinRasterMean, BasinStationGroup},
    ensemble::Statistic,
};

/// Modeled basin means; basins without data were already left out.
pub fn save_basin_means(means: &[BasinRasterMean], file_path: &Path) -> Result<()> {
    let mut hucs = Vec::with_capacity(means.len());
    let mut names = Vec::with_capacity(means.len());
    let mut cells = Vec::with_capacity(means.len());
    let mut channels: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(means.len()); 5];

    for m in means {
        hucs.push(m.huc.clone());
        names.push(m.name.clone());
        cells.push(m.cells as u64);
        for s in Statistic::ALL {
            channels[s.index()].push(m.means[s.index()]);
        }
    }

    let mut columns = vec![
        ("huc", column(StringArray::from(hucs))),
        ("name", column(StringArray::from(names))),
        ("cells", column(UInt64Array::from(cells))),
    ];
    for (statistic, values) in Statistic::ALL.iter().zip(channels) {
        columns.push((statistic.name(), column(Float64Array::from(values))));
    }

    write_columns(file_path, columns)
}

/// Station-group means per basin, with the basin name when known.
pub fn save_basin_groups(groups: &[BasinStationGroup], names: &HashMap<String, String>, file_path: &Path) -> Result<()> {
    let hucs: Vec<String> = groups.iter().map(|g| g.huc.clone()).collect();
    let basin_names: Vec<Option<String>> = groups.iter().map(|g| names.get(&g.huc).cloned()).collect();
    let means: Vec<f64> = groups.iter().map(|g| g.mean).collect();
    let counts: Vec<u64> = groups.iter().map(|g| g.stations as u64).collect();

    let columns = vec![
        ("huc", column(StringArray::from(hucs))),
        ("name", column(StringArray::from(basin_names))),
        ("mean_pct_normal", column(Float64Array::from(means))),
        ("stations", column(UInt64Array::from(counts))),
    ];

    write_columns(file_path, columns)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod test {
    use arrow::{
        array::{Array, AsArray},
        datatypes::UInt64Type,
    };
    use tempfile::TempDir;

    use super::*;
    use crate::parquet::test::read_back;

    #[test]
    fn should_save_basin_groups_with_names() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("groups.parquet");
        let groups = vec![
            BasinStationGroup { huc: "14010001".to_string(), mean: 72.5, stations: 4 },
            BasinStationGroup { huc: "99".to_string(), mean: 60.0, stations: 3 },
        ];
        let names = HashMap::from([("14010001".to_string(), "Colorado Headwaters".to_string())]);

        save_basin_groups(&groups, &names, &path).unwrap();

        let batch = &read_back(&path)[0];
        let names = batch.column_by_name("name").unwrap();
        assert_eq!(names.as_string::<i32>().value(0), "Colorado Headwaters");
        assert!(names.is_null(1));
        let counts = batch.column_by_name("stations").unwrap().as_primitive::<UInt64Type>();
        assert_eq!(counts.value(0), 4);
    }

    #[test]
    fn should_save_basin_means() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("means.parquet");
        let means = vec![BasinRasterMean {
            huc: "14010001".to_string(),
            name: "Colorado Headwaters".to_string(),
            means: [Some(40.0), Some(50.0), Some(60.0), None, Some(80.0)],
            cells: 12,
        }];

        save_basin_means(&means, &path).unwrap();

        let batch = &read_back(&path)[0];
        assert_eq!(batch.num_columns(), 8);
        assert!(batch.column_by_name("p75").unwrap().is_null(0));
    }
}
