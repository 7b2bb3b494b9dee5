use rayon::prelude::*;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::Result;
use crate::readers::{list_source_files, RawBatch};
use crate::utils::constants::CSV_EXTENSION;
use crate::utils::text::read_text_file;

/// One hourly row from the historical weather archive, in local civil time.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct WeatherRow {
    #[serde(alias = "time", alias = "timestamp")]
    pub timestamp_local: Option<String>,

    #[serde(alias = "utc_offset_hours", alias = "tz")]
    pub utc_offset: Option<String>,

    #[serde(alias = "temperature_2m", alias = "temperature_c")]
    pub temp_c: Option<f64>,

    #[serde(alias = "relative_humidity_2m")]
    pub humidity_pct: Option<f64>,

    #[serde(alias = "surface_pressure", alias = "pressure_hpa")]
    pub surface_pressure_hpa: Option<f64>,

    #[serde(alias = "wind_speed_10m")]
    pub wind_speed_ms: Option<f64>,

    #[serde(alias = "wind_direction_10m", alias = "wind_direction_deg")]
    pub wind_dir_deg: Option<f64>,

    #[serde(alias = "precipitation", alias = "precipitation_mm")]
    pub precip_mm: Option<f64>,

    #[serde(alias = "cloud_cover")]
    pub cloud_cover_pct: Option<f64>,
}

pub struct WeatherReader;

impl WeatherReader {
    pub fn new() -> Self {
        Self
    }

    pub fn read_dir(&self, dir: &Path) -> Result<RawBatch<WeatherRow>> {
        let files = list_source_files(dir, &[CSV_EXTENSION])?;
        debug!("Found {} weather-archive files in {}", files.len(), dir.display());

        let per_file: Vec<RawBatch<WeatherRow>> = files
            .par_iter()
            .map(|path| match self.read_file(path) {
                Ok(batch) => batch,
                Err(e) => {
                    warn!("Skipping weather-archive file {}: {}", path.display(), e);
                    RawBatch {
                        files_skipped: 1,
                        ..RawBatch::default()
                    }
                }
            })
            .collect();

        let mut batch = RawBatch::default();
        for file_batch in per_file {
            batch.extend(file_batch);
        }
        Ok(batch)
    }

    pub fn read_file(&self, path: &Path) -> Result<RawBatch<WeatherRow>> {
        let text = read_text_file(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut batch = RawBatch {
            files_read: 1,
            ..RawBatch::default()
        };
        for result in reader.deserialize::<WeatherRow>() {
            match result {
                Ok(row) => batch.rows.push(row),
                Err(e) => {
                    debug!("{}: malformed weather row: {}", path.display(), e);
                    batch.rows_skipped += 1;
                }
            }
        }
        Ok(batch)
    }
}

impl Default for WeatherReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_open_meteo_style_columns() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "time,temperature_2m,relative_humidity_2m,surface_pressure,wind_speed_10m,wind_direction_10m,precipitation,cloud_cover,snow_depth"
        )
        .unwrap();
        writeln!(file, "2024-01-15T15:00,-12.5,80,1021.3,3.1,270,0.0,75,0.3").unwrap();
        writeln!(file, "2024-01-15T16:00,-13.0,,1021.0,,,,,").unwrap();

        let batch = WeatherReader::new().read_file(file.path()).unwrap();
        assert_eq!(batch.rows.len(), 2);

        let first = &batch.rows[0];
        assert_eq!(first.timestamp_local.as_deref(), Some("2024-01-15T15:00"));
        assert_eq!(first.temp_c, Some(-12.5));
        assert_eq!(first.surface_pressure_hpa, Some(1021.3));
        assert_eq!(first.wind_dir_deg, Some(270.0));
        assert_eq!(first.cloud_cover_pct, Some(75.0));
        assert_eq!(first.utc_offset, None);

        assert_eq!(batch.rows[1].humidity_pct, None);
    }

    #[test]
    fn test_read_canonical_columns_with_offset() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "timestamp_local,utc_offset,temp_c,humidity_pct").unwrap();
        writeln!(file, "2024-07-01 12:00:00,+05:00,28.4,35").unwrap();
        writeln!(file, "2024-07-01 13:00:00,+05:00,warm,35").unwrap();

        let batch = WeatherReader::new().read_file(file.path()).unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.rows_skipped, 1);
        assert_eq!(batch.rows[0].utc_offset.as_deref(), Some("+05:00"));
    }
}
