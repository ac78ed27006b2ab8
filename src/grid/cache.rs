//! Local cache of raw grid downloads.
//!
//! One gzip file per (variable, time window). Files are written to a
//! temporary path in the cache directory and renamed into place, so a reader
//! never sees a partial file.

use std::{
    fs::{self, File},
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use tempfile::NamedTempFile;

#[derive(Debug, Clone)]
pub struct GridCache {
    root: PathBuf,
}

impl GridCache {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        Ok(GridCache { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, variable: &str, start_year: i32, end_year: i32) -> PathBuf {
        self.root.join(file_name(variable, start_year, end_year))
    }

    pub fn contains(&self, variable: &str, start_year: i32, end_year: i32) -> bool {
        self.path_for(variable, start_year, end_year).is_file()
    }

    /// Returns the decompressed payload, or `None` on a cache miss.
    pub fn load(&self, variable: &str, start_year: i32, end_year: i32) -> io::Result<Option<Vec<u8>>> {
        let path = self.path_for(variable, start_year, end_year);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut raw = Vec::new();
        GzDecoder::new(file).read_to_end(&mut raw)?;

        Ok(Some(raw))
    }

    pub fn store(&self, variable: &str, start_year: i32, end_year: i32, raw: &[u8]) -> io::Result<PathBuf> {
        let path = self.path_for(variable, start_year, end_year);
        let tmp = NamedTempFile::new_in(&self.root)?;

        let mut encoder = GzEncoder::new(tmp, Compression::default());
        encoder.write_all(raw)?;
        let tmp = encoder.finish()?;
        tmp.as_file().sync_all()?;

        tmp.persist(&path).map_err(|e| e.error)?;

        Ok(path)
    }

    /// Deletes an entry; a missing entry is not an error.
    pub fn remove(&self, variable: &str, start_year: i32, end_year: i32) -> io::Result<()> {
        match fs::remove_file(self.path_for(variable, start_year, end_year)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

fn file_name(variable: &str, start_year: i32, end_year: i32) -> String {
    let safe: String = variable
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();

    format!("{}_{}-{}.json.gz", safe, start_year, end_year)
}

// -- Tests -------------------------------------------------------------------
