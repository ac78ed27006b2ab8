pub mod fetch;
pub mod run;
pub mod stations;
pub mod summary;

use std::path::{Path, PathBuf};

pub use fetch::fetch;
pub use run::run;
pub use stations::stations;
pub use summary::summary;

/// `{output_dir}/{kind}-{label}.parquet`
pub fn make_report_file_name(output_dir: &Path, kind: &str, label: &str) -> PathBuf {
    output_dir.join(format!("{}-{}.parquet", kind, label))
}
