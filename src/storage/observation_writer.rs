use arrow::array::*;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{ProcessingError, Result};
use crate::models::{Observation, Source};
use crate::storage::parquet_writer::{downcast, parse_compression};
use crate::utils::constants::{OBSERVATIONS_DIR, PARQUET_EXTENSION};

/// Long-format audit tables, one file per source under `observations/`.
pub struct ObservationWriter {
    dir: PathBuf,
    compression: Compression,
}

impl ObservationWriter {
    pub fn new(store_dir: &Path) -> Self {
        Self {
            dir: store_dir.join(OBSERVATIONS_DIR),
            compression: Compression::SNAPPY,
        }
    }

    pub fn with_compression(mut self, compression: &str) -> Result<Self> {
        self.compression = parse_compression(compression)?;
        Ok(self)
    }

    pub fn path_for(&self, source: Source) -> PathBuf {
        self.dir
            .join(format!("{}.{}", source.as_str(), PARQUET_EXTENSION))
    }

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new(
                "timestamp_utc",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
            Field::new("location", DataType::Utf8, false),
            Field::new("latitude", DataType::Float64, true),
            Field::new("longitude", DataType::Float64, true),
            Field::new("parameter", DataType::Utf8, false),
            Field::new("value", DataType::Float64, false),
            Field::new("unit", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("quality", DataType::Utf8, true),
        ]))
    }

    /// Replace each source's table with its observations. Sources absent from
    /// `observations` keep their previous table. Returns rows written per source.
    pub fn write(&self, observations: &[Observation]) -> Result<BTreeMap<Source, usize>> {
        std::fs::create_dir_all(&self.dir)?;

        let mut by_source: BTreeMap<Source, Vec<&Observation>> = BTreeMap::new();
        for observation in observations {
            by_source.entry(observation.source).or_default().push(observation);
        }

        let mut written = BTreeMap::new();
        for (source, rows) in by_source {
            self.write_source(source, &rows)?;
            info!("Retained {} {} observations", rows.len(), source);
            written.insert(source, rows.len());
        }
        Ok(written)
    }

    fn write_source(&self, source: Source, rows: &[&Observation]) -> Result<()> {
        let schema = Self::schema();
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(
                    TimestampMicrosecondArray::from_iter_values(
                        rows.iter().map(|o| o.timestamp_utc.timestamp_micros()),
                    )
                    .with_timezone("UTC"),
                ),
                Arc::new(StringArray::from_iter_values(rows.iter().map(|o| o.location.as_str()))),
                Arc::new(Float64Array::from(rows.iter().map(|o| o.latitude).collect::<Vec<_>>())),
                Arc::new(Float64Array::from(rows.iter().map(|o| o.longitude).collect::<Vec<_>>())),
                Arc::new(StringArray::from_iter_values(rows.iter().map(|o| o.parameter.as_str()))),
                Arc::new(Float64Array::from_iter_values(rows.iter().map(|o| o.value))),
                Arc::new(StringArray::from_iter_values(rows.iter().map(|o| o.unit.as_str()))),
                Arc::new(StringArray::from_iter_values(rows.iter().map(|o| o.source.as_str()))),
                Arc::new(StringArray::from(
                    rows.iter().map(|o| o.quality.as_deref()).collect::<Vec<_>>(),
                )),
            ],
        )?;

        let props = WriterProperties::builder()
            .set_compression(self.compression)
            .build();

        let temp = NamedTempFile::new_in(&self.dir)?;
        {
            let mut writer =
                ArrowWriter::try_new(BufWriter::new(temp.as_file()), schema, Some(props))?;
            writer.write(&batch)?;
            writer.into_inner()?.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(self.path_for(source))
            .map_err(|e| ProcessingError::Io(e.error))?;
        Ok(())
    }

    /// Read one source's audit table back.
    pub fn read(&self, source: Source) -> Result<Vec<Observation>> {
        let file = File::open(self.path_for(source))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut observations = Vec::new();
        for batch_result in reader {
            let batch = batch_result?;
            let timestamps = downcast::<TimestampMicrosecondArray>(&batch, "timestamp_utc")?;
            let locations = downcast::<StringArray>(&batch, "location")?;
            let latitudes = downcast::<Float64Array>(&batch, "latitude")?;
            let longitudes = downcast::<Float64Array>(&batch, "longitude")?;
            let parameters = downcast::<StringArray>(&batch, "parameter")?;
            let values = downcast::<Float64Array>(&batch, "value")?;
            let units = downcast::<StringArray>(&batch, "unit")?;
            let sources = downcast::<StringArray>(&batch, "source")?;
            let qualities = downcast::<StringArray>(&batch, "quality")?;

            for i in 0..batch.num_rows() {
                let timestamp = DateTime::from_timestamp_micros(timestamps.value(i)).ok_or_else(|| {
                    ProcessingError::InvalidTimestamp(format!("{} micros", timestamps.value(i)))
                })?;
                let mut observation = Observation::new(
                    timestamp,
                    locations.value(i),
                    (!latitudes.is_null(i)).then(|| latitudes.value(i)),
                    (!longitudes.is_null(i)).then(|| longitudes.value(i)),
                    parameters.value(i).parse()?,
                    values.value(i),
                    units.value(i),
                    sources.value(i).parse()?,
                );
                if !qualities.is_null(i) {
                    observation = observation.with_quality(qualities.value(i));
                }
                observations.push(observation);
            }
        }
        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Parameter, Pollutant, WeatherField};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_write_one_table_per_source() -> Result<()> {
        let dir = TempDir::new()?;
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        let observations = vec![
            Observation::new(
                ts,
                "Astana#51.0000,71.0000",
                Some(51.0),
                Some(71.0),
                Parameter::Pollutant(Pollutant::Pm25),
                10.0,
                "µg/m³",
                Source::Reanalysis,
            )
            .with_quality("reanalysis"),
            Observation::new(
                ts,
                "Astana",
                None,
                None,
                Parameter::Weather(WeatherField::WindSpeed),
                3.1,
                "m/s",
                Source::WeatherArchive,
            ),
        ];

        let writer = ObservationWriter::new(dir.path());
        let written = writer.write(&observations)?;
        assert_eq!(written.len(), 2);
        assert!(writer.path_for(Source::Reanalysis).ends_with("observations/reanalysis.parquet"));

        assert_eq!(writer.read(Source::Reanalysis)?, vec![observations[0].clone()]);
        assert_eq!(writer.read(Source::WeatherArchive)?, vec![observations[1].clone()]);
        assert!(writer.read(Source::LiveFeed).is_err());
        Ok(())
    }
}
