use rayon::prelude::*;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::Result;
use crate::readers::{list_source_files, RawBatch};
use crate::utils::constants::CSV_EXTENSION;
use crate::utils::text::read_text_file;

/// One raw ground-station measurement row. Every column is optional at this
/// stage; the normalizer decides which gaps are fatal for the row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StationRow {
    #[serde(alias = "datetime", alias = "timestamp", alias = "date_utc")]
    pub timestamp_utc: Option<String>,

    #[serde(alias = "parameter_name")]
    pub parameter: Option<String>,

    pub value: Option<f64>,

    #[serde(alias = "units")]
    pub unit: Option<String>,

    #[serde(alias = "data_quality")]
    pub quality: Option<String>,
}

pub struct StationReader;

impl StationReader {
    pub fn new() -> Self {
        Self
    }

    /// Read every CSV file in `dir`. Unreadable files are counted, not fatal.
    pub fn read_dir(&self, dir: &Path) -> Result<RawBatch<StationRow>> {
        let files = list_source_files(dir, &[CSV_EXTENSION])?;
        debug!("Found {} ground-station files in {}", files.len(), dir.display());

        let per_file: Vec<RawBatch<StationRow>> =
            files.par_iter().map(|p| self.read_file_counted(p)).collect();

        let mut batch = RawBatch::default();
        for file_batch in per_file {
            batch.extend(file_batch);
        }
        Ok(batch)
    }

    fn read_file_counted(&self, path: &Path) -> RawBatch<StationRow> {
        match self.read_file(path) {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Skipping ground-station file {}: {}", path.display(), e);
                RawBatch {
                    files_skipped: 1,
                    ..RawBatch::default()
                }
            }
        }
    }

    pub fn read_file(&self, path: &Path) -> Result<RawBatch<StationRow>> {
        let text = read_text_file(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut batch = RawBatch {
            files_read: 1,
            ..RawBatch::default()
        };
        for (line, result) in reader.deserialize::<StationRow>().enumerate() {
            match result {
                Ok(row) => batch.rows.push(row),
                Err(e) => {
                    debug!("{}:{}: malformed row: {}", path.display(), line + 2, e);
                    batch.rows_skipped += 1;
                }
            }
        }
        Ok(batch)
    }
}

impl Default for StationReader {
    fn default() -> Self {
        Self::new()
    }
}
