use arrow::array::{Array, ArrayRef, AsArray, RecordBatch};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, TimeUnit, TimestampMillisecondType};
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use rayon::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};

use crate::archive::TempFileManager;
use crate::error::{ProcessingError, Result};
use crate::processors::normalizer::reanalysis_variable;
use crate::readers::{list_source_files, RawBatch};
use crate::utils::constants::{PARQUET_EXTENSION, ZIP_EXTENSION};

const TIME_COLUMNS: [&str; 2] = ["time", "valid_time"];

/// One grid point at one time step, in the wide per-variable layout of the
/// reanalysis product. Values are mass concentrations in kg/m³.
#[derive(Debug, Clone, PartialEq)]
pub struct GridRow {
    pub time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub pressure_level: Option<f64>,
    pub values: Vec<(String, Option<f64>)>,
}

pub struct ReanalysisReader {
    batch_size: usize,
}

impl ReanalysisReader {
    pub fn new() -> Self {
        Self { batch_size: 8192 }
    }

    /// Read every `.parquet` grid and every `.zip` of grids in `dir`.
    pub fn read_dir(&self, dir: &Path) -> Result<RawBatch<GridRow>> {
        let files = list_source_files(dir, &[PARQUET_EXTENSION, ZIP_EXTENSION])?;
        debug!("Found {} reanalysis files in {}", files.len(), dir.display());

        let per_file: Vec<RawBatch<GridRow>> = files
            .par_iter()
            .map(|path| {
                let is_zip = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case(ZIP_EXTENSION))
                    .unwrap_or(false);
                let result = if is_zip {
                    self.read_zip(path)
                } else {
                    self.read_file(path)
                };
                result.unwrap_or_else(|e| {
                    warn!("Skipping reanalysis file {}: {}", path.display(), e);
                    RawBatch {
                        files_skipped: 1,
                        ..RawBatch::default()
                    }
                })
            })
            .collect();

        let mut batch = RawBatch::default();
        for file_batch in per_file {
            batch.extend(file_batch);
        }
        Ok(batch)
    }

    /// Grids delivered as a zip archive are extracted to a scratch directory
    /// that is removed once they have been read.
    pub fn read_zip(&self, zip_path: &Path) -> Result<RawBatch<GridRow>> {
        let mut temp_manager = TempFileManager::new()?;
        let members = temp_manager.extract_with_extension(zip_path, PARQUET_EXTENSION)?;
        if members.is_empty() {
            return Err(ProcessingError::MissingData(format!(
                "No parquet members in archive {}",
                zip_path.display()
            )));
        }

        let mut batch = RawBatch::default();
        for member in &members {
            match self.read_file(member) {
                Ok(member_batch) => batch.extend(member_batch),
                Err(e) => {
                    warn!("Skipping archive member {}: {}", member.display(), e);
                    batch.files_skipped += 1;
                }
            }
        }
        Ok(batch)
    }

    pub fn read_file(&self, path: &Path) -> Result<RawBatch<GridRow>> {
        let file = File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?
            .with_batch_size(self.batch_size)
            .build()?;

        let mut batch = RawBatch {
            files_read: 1,
            ..RawBatch::default()
        };
        for record_batch in reader {
            self.flatten_batch(&record_batch?, &mut batch)?;
        }
        Ok(batch)
    }

    fn flatten_batch(&self, record_batch: &RecordBatch, out: &mut RawBatch<GridRow>) -> Result<()> {
        let time_column = TIME_COLUMNS
            .iter()
            .find_map(|name| record_batch.column_by_name(name))
            .ok_or_else(|| ProcessingError::MissingData("time column".to_string()))?;
        let times = to_millis(time_column)?;
        let times = times.as_primitive::<TimestampMillisecondType>();

        let latitudes = float_column(record_batch, "latitude")?
            .ok_or_else(|| ProcessingError::MissingData("latitude column".to_string()))?;
        let longitudes = float_column(record_batch, "longitude")?
            .ok_or_else(|| ProcessingError::MissingData("longitude column".to_string()))?;
        let latitudes = latitudes.as_primitive::<Float64Type>();
        let longitudes = longitudes.as_primitive::<Float64Type>();

        let levels = float_column(record_batch, "pressure_level")?;
        let levels = levels.as_ref().map(|a| a.as_primitive::<Float64Type>());

        let mut variables = Vec::new();
        for field in record_batch.schema().fields() {
            if reanalysis_variable(field.name()).is_none() {
                continue;
            }
            if let Some(array) = float_column(record_batch, field.name())? {
                variables.push((field.name().clone(), array));
            }
        }
        if variables.is_empty() {
            return Err(ProcessingError::MissingData(
                "no recognized pollutant variables".to_string(),
            ));
        }

        for row in 0..record_batch.num_rows() {
            if times.is_null(row) || latitudes.is_null(row) || longitudes.is_null(row) {
                out.rows_skipped += 1;
                continue;
            }
            let Some(time) = DateTime::from_timestamp_millis(times.value(row)) else {
                out.rows_skipped += 1;
                continue;
            };

            let values = variables
                .iter()
                .map(|(name, array)| {
                    let values = array.as_primitive::<Float64Type>();
                    let value = (!values.is_null(row)).then(|| values.value(row));
                    (name.clone(), value)
                })
                .collect();

            out.rows.push(GridRow {
                time,
                latitude: latitudes.value(row),
                longitude: longitudes.value(row),
                pressure_level: levels.and_then(|l| (!l.is_null(row)).then(|| l.value(row))),
                values,
            });
        }
        Ok(())
    }
}

impl Default for ReanalysisReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Any timestamp unit (or an integer/string column) becomes epoch milliseconds.
fn to_millis(array: &ArrayRef) -> Result<ArrayRef> {
    let target = match array.data_type() {
        DataType::Timestamp(_, tz) => DataType::Timestamp(TimeUnit::Millisecond, tz.clone()),
        _ => DataType::Timestamp(TimeUnit::Millisecond, None),
    };
    Ok(cast(array, &target)?)
}

fn float_column(record_batch: &RecordBatch, name: &str) -> Result<Option<ArrayRef>> {
    match record_batch.column_by_name(name) {
        Some(array) => Ok(Some(cast(array, &DataType::Float64)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float32Array, Float64Array, TimestampSecondArray};
    use arrow::datatypes::{Field, Schema};
    use chrono::TimeZone;
    use parquet::arrow::ArrowWriter;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write_grid(path: &Path) {
        let schema = Arc::new(Schema::new(vec![
            Field::new(
                "valid_time",
                DataType::Timestamp(TimeUnit::Second, Some("UTC".into())),
                true,
            ),
            Field::new("latitude", DataType::Float32, true),
            Field::new("longitude", DataType::Float32, true),
            Field::new("pm2p5", DataType::Float64, true),
            Field::new("go3", DataType::Float64, true),
            Field::new("number", DataType::Float64, true),
        ]));
        let t = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap().timestamp();
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(TimestampSecondArray::from(vec![Some(t), Some(t), None]).with_timezone("UTC")),
                Arc::new(Float32Array::from(vec![51.0, 51.75, 51.0])),
                Arc::new(Float32Array::from(vec![71.25, 71.25, 72.0])),
                Arc::new(Float64Array::from(vec![Some(1e-8), None, Some(3e-8)])),
                Arc::new(Float64Array::from(vec![Some(4e-8), Some(5e-8), Some(6e-8)])),
                Arc::new(Float64Array::from(vec![0.0, 0.0, 0.0])),
            ],
        )
        .unwrap();

        let file = File::create(path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_read_grid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cams.parquet");
        write_grid(&path);

        let batch = ReanalysisReader::new().read_file(&path).unwrap();
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.rows_skipped, 1);

        let first = &batch.rows[0];
        assert_eq!(first.time, Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());
        assert_eq!(first.latitude, 51.0);
        assert_eq!(first.pressure_level, None);
        assert_eq!(
            first.values,
            vec![
                ("pm2p5".to_string(), Some(1e-8)),
                ("go3".to_string(), Some(4e-8)),
            ]
        );
        assert_eq!(batch.rows[1].values[0], ("pm2p5".to_string(), None));
    }

    #[test]
    fn test_read_zipped_grid() {
        let dir = TempDir::new().unwrap();
        let grid_path = dir.path().join("grid.parquet");
        write_grid(&grid_path);

        let zip_path = dir.path().join("delivery.zip");
        {
            let file = File::create(&zip_path).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            zip.start_file("data/grid.parquet", zip::write::FileOptions::default())
                .unwrap();
            zip.write_all(&std::fs::read(&grid_path).unwrap()).unwrap();
            zip.finish().unwrap();
        }
        std::fs::remove_file(&grid_path).unwrap();

        let batch = ReanalysisReader::new().read_dir(dir.path()).unwrap();
        assert_eq!(batch.files_read, 1);
        assert_eq!(batch.rows.len(), 2);
    }

    #[test]
    fn test_corrupt_file_is_counted_not_fatal() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bad.parquet"), b"not parquet").unwrap();
        write_grid(&dir.path().join("good.parquet"));

        let batch = ReanalysisReader::new().read_dir(dir.path()).unwrap();
        assert_eq!(batch.files_read, 1);
        assert_eq!(batch.files_skipped, 1);
        assert_eq!(batch.rows.len(), 2);
    }
}
