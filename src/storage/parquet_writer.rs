use arrow::array::*;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::error::{ProcessingError, Result};
use crate::models::{HourlyRecord, Parameter, Slot, Source};
use crate::utils::constants::*;

pub fn parse_compression(compression: &str) -> Result<Compression> {
    Ok(match compression.to_lowercase().as_str() {
        COMPRESSION_SNAPPY => Compression::SNAPPY,
        COMPRESSION_GZIP => Compression::GZIP(GzipLevel::default()),
        COMPRESSION_LZ4 => Compression::LZ4,
        COMPRESSION_ZSTD => Compression::ZSTD(ZstdLevel::default()),
        COMPRESSION_NONE => Compression::UNCOMPRESSED,
        _ => {
            return Err(ProcessingError::Config(format!(
                "Unsupported compression: {}",
                compression
            )))
        }
    })
}

pub(crate) fn downcast<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| ProcessingError::MissingData(format!("column '{}'", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ProcessingError::InvalidFormat(format!("Invalid {} column type", name)))
}

fn source_column(parameter: Parameter) -> String {
    format!("{}_source", parameter.as_str())
}

/// Wide hourly table codec: one value and one provenance column per parameter.
pub struct ParquetWriter {
    compression: Compression,
    row_group_size: usize,
}

impl ParquetWriter {
    pub fn new() -> Self {
        Self {
            compression: Compression::SNAPPY,
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }

    pub fn with_compression(mut self, compression: &str) -> Result<Self> {
        self.compression = parse_compression(compression)?;
        Ok(self)
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn schema() -> Arc<Schema> {
        let mut fields = vec![
            Field::new(
                "timestamp_utc",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
            Field::new("location", DataType::Utf8, false),
        ];
        for parameter in Parameter::all() {
            fields.push(Field::new(parameter.as_str(), DataType::Float64, true));
            fields.push(Field::new(source_column(parameter), DataType::Utf8, true));
        }
        fields.extend([
            Field::new("hour", DataType::UInt32, false),
            Field::new("day_of_week", DataType::UInt32, false),
            Field::new("day_of_month", DataType::UInt32, false),
            Field::new("month", DataType::UInt32, false),
            Field::new("season", DataType::Utf8, false),
            Field::new("is_weekend", DataType::Boolean, false),
            Field::new("is_heating_season", DataType::Boolean, false),
            Field::new("completeness_score", DataType::Float64, false),
        ]);

        Arc::new(Schema::new(fields))
    }

    /// Write records in batches of the row group size to any sink.
    pub fn write_to<W: Write + Send>(&self, records: &[HourlyRecord], sink: W) -> Result<()> {
        let schema = Self::schema();
        let props = WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build();

        let mut writer = ArrowWriter::try_new(sink, schema.clone(), Some(props))?;
        for chunk in records.chunks(self.row_group_size) {
            let batch = self.records_to_batch(chunk, schema.clone())?;
            writer.write(&batch)?;
        }
        let mut sink = writer.into_inner()?;
        sink.flush()?;
        Ok(())
    }

    pub fn write_records(&self, records: &[HourlyRecord], path: &Path) -> Result<()> {
        let file = File::create(path)?;
        self.write_to(records, file)
    }

    fn records_to_batch(&self, records: &[HourlyRecord], schema: Arc<Schema>) -> Result<RecordBatch> {
        let timestamps: Vec<i64> = records
            .iter()
            .map(|r| r.timestamp_utc.timestamp_micros())
            .collect();
        let locations: Vec<&str> = records.iter().map(|r| r.location.as_str()).collect();

        let mut columns: Vec<ArrayRef> = vec![
            Arc::new(TimestampMicrosecondArray::from(timestamps).with_timezone("UTC")),
            Arc::new(StringArray::from(locations)),
        ];

        for parameter in Parameter::all() {
            let values: Vec<Option<f64>> = records.iter().map(|r| r.slot(parameter).value).collect();
            let sources: Vec<Option<&str>> = records
                .iter()
                .map(|r| r.slot(parameter).source.map(|s| s.as_str()))
                .collect();
            columns.push(Arc::new(Float64Array::from(values)));
            columns.push(Arc::new(StringArray::from(sources)));
        }

        let features: Vec<_> = records.iter().map(|r| r.features).collect();
        columns.push(Arc::new(UInt32Array::from_iter_values(features.iter().map(|f| f.hour))));
        columns.push(Arc::new(UInt32Array::from_iter_values(
            features.iter().map(|f| f.day_of_week),
        )));
        columns.push(Arc::new(UInt32Array::from_iter_values(
            features.iter().map(|f| f.day_of_month),
        )));
        columns.push(Arc::new(UInt32Array::from_iter_values(features.iter().map(|f| f.month))));
        columns.push(Arc::new(StringArray::from_iter_values(
            features.iter().map(|f| f.season.as_str()),
        )));
        columns.push(Arc::new(BooleanArray::from(
            features.iter().map(|f| f.is_weekend).collect::<Vec<_>>(),
        )));
        columns.push(Arc::new(BooleanArray::from(
            features.iter().map(|f| f.is_heating_season).collect::<Vec<_>>(),
        )));
        columns.push(Arc::new(Float64Array::from_iter_values(
            records.iter().map(|r| r.completeness_score),
        )));

        Ok(RecordBatch::try_new(schema, columns)?)
    }

    /// Read every record of one file. Temporal features are rebuilt from the timestamp.
    pub fn read_records(&self, path: &Path) -> Result<Vec<HourlyRecord>> {
        let file = File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

        let mut records = Vec::new();
        for batch_result in reader {
            let batch = batch_result?;
            let timestamps = downcast::<TimestampMicrosecondArray>(&batch, "timestamp_utc")?;
            let locations = downcast::<StringArray>(&batch, "location")?;
            let scores = downcast::<Float64Array>(&batch, "completeness_score")?;

            let mut slots = Vec::new();
            for parameter in Parameter::all() {
                let values = downcast::<Float64Array>(&batch, parameter.as_str())?;
                let sources = downcast::<StringArray>(&batch, &source_column(parameter))?;
                slots.push((parameter, values, sources));
            }

            for i in 0..batch.num_rows() {
                let timestamp = DateTime::from_timestamp_micros(timestamps.value(i)).ok_or_else(|| {
                    ProcessingError::InvalidTimestamp(format!("{} micros", timestamps.value(i)))
                })?;
                let mut record = HourlyRecord::new(timestamp, locations.value(i));

                for (parameter, values, sources) in &slots {
                    let value = (!values.is_null(i)).then(|| values.value(i));
                    let source = if sources.is_null(i) {
                        None
                    } else {
                        Some(sources.value(i).parse::<Source>()?)
                    };
                    *record.slot_mut(*parameter) = Slot { value, source };
                }
                record.completeness_score = scores.value(i);
                records.push(record);
            }
        }

        Ok(records)
    }

    pub fn get_file_info(&self, path: &Path) -> Result<ParquetFileInfo> {
        use parquet::file::reader::{FileReader, SerializedFileReader};

        let file = File::open(path)?;
        let reader = SerializedFileReader::new(file)?;
        let metadata = reader.metadata();

        let row_groups = metadata.num_row_groups();
        let compression = if row_groups > 0 && metadata.row_group(0).num_columns() > 0 {
            metadata.row_group(0).column(0).compression()
        } else {
            self.compression
        };

        Ok(ParquetFileInfo {
            total_rows: metadata.file_metadata().num_rows(),
            row_groups: row_groups as i32,
            file_size: std::fs::metadata(path)?.len(),
            compression,
        })
    }
}

impl Default for ParquetWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct ParquetFileInfo {
    pub total_rows: i64,
    pub row_groups: i32,
    pub file_size: u64,
    pub compression: Compression,
}

impl ParquetFileInfo {
    pub fn summary(&self) -> String {
        format!(
            "Parquet File Summary:\n\
            - Total rows: {}\n\
            - Row groups: {}\n\
            - File size: {:.2} MB\n\
            - Compression: {:?}",
            self.total_rows,
            self.row_groups,
            self.file_size as f64 / 1_048_576.0,
            self.compression,
        )
    }
}
