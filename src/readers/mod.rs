pub mod concurrent_reader;
pub mod reanalysis_reader;
pub mod station_reader;
pub mod weather_reader;

pub use concurrent_reader::{ConcurrentReader, SourceData, SourceDirs};
pub use reanalysis_reader::{GridRow, ReanalysisReader};
pub use station_reader::{StationReader, StationRow};
pub use weather_reader::{WeatherReader, WeatherRow};

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Raw rows read from one source, with row/file level skip counts.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBatch<T> {
    pub rows: Vec<T>,
    pub files_read: usize,
    pub files_skipped: usize,
    pub rows_skipped: usize,
}

impl<T> Default for RawBatch<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            files_read: 0,
            files_skipped: 0,
            rows_skipped: 0,
        }
    }
}

impl<T> RawBatch<T> {
    pub fn rows_read(&self) -> usize {
        self.rows.len() + self.rows_skipped
    }

    pub fn extend(&mut self, other: RawBatch<T>) {
        self.rows.extend(other.rows);
        self.files_read += other.files_read;
        self.files_skipped += other.files_skipped;
        self.rows_skipped += other.rows_skipped;
    }
}

/// Regular files in `dir` whose extension matches one of `extensions`, sorted by path.
pub fn list_source_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false);
        if matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
