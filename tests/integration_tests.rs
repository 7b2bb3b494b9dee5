use aaqis_etl::config::PipelineConfig;
use aaqis_etl::error::{ProcessingError, Result};
use aaqis_etl::models::{LiveReading, Parameter, Pollutant, Source, WeatherField};
use aaqis_etl::processors::Pipeline;
use aaqis_etl::query::{AqiCategory, AqiTable, QueryService};
use aaqis_etl::readers::SourceDirs;
use aaqis_etl::storage::{HourlyStore, ObservationWriter, ParquetStore, ParquetWriter};
use arrow::array::{Float64Array, TimestampMillisecondArray};
use arrow::record_batch::RecordBatch;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use chrono::{DateTime, TimeZone, Utc};
use parquet::arrow::ArrowWriter;
use pretty_assertions::assert_eq;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const PM25: Parameter = Parameter::Pollutant(Pollutant::Pm25);
const PM10: Parameter = Parameter::Pollutant(Pollutant::Pm10);
const CO: Parameter = Parameter::Pollutant(Pollutant::Co);
const TEMPERATURE: Parameter = Parameter::Weather(WeatherField::Temperature);

fn hour(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, h, 0, 0).unwrap()
}

struct Fixture {
    _root: TempDir,
    station: PathBuf,
    reanalysis: PathBuf,
    weather: PathBuf,
    store: PathBuf,
}

impl Fixture {
    fn new() -> Result<Self> {
        let root = TempDir::new()?;
        let station = root.path().join("openaq");
        let reanalysis = root.path().join("cams");
        let weather = root.path().join("weather");
        for dir in [&station, &reanalysis, &weather] {
            std::fs::create_dir_all(dir)?;
        }

        std::fs::write(
            station.join("astana_2024.csv"),
            "datetime,parameter,value,units\n\
             2024-01-15T09:00:00+00:00,pm25,40.0,µg/m³\n\
             2024-01-15T15:30:00+06:00,pm25,50.0,µg/m³\n\
             2024-01-15T09:00:00+00:00,pm10,55.0,µg/m³\n\
             2024-01-15T09:00:00+00:00,co,1500,µg/m³\n\
             2024-01-15T09:00:00+00:00,pm25,-1.0,µg/m³\n\
             2024-01-15T09:00:00+00:00,benzene,2.0,µg/m³\n",
        )?;

        std::fs::write(
            weather.join("open_meteo.csv"),
            "time,temperature_2m,relative_humidity_2m,surface_pressure,wind_speed_10m\n\
             2024-01-15 15:00,-12.0,80,1020.5,3.5\n\
             2024-01-15 16:00,-13.0,82,1021.0,4.0\n",
        )?;

        write_grid(&reanalysis.join("cams_2024-01-15.parquet"))?;

        let store = root.path().join("store");
        Ok(Self {
            station,
            reanalysis,
            weather,
            store,
            _root: root,
        })
    }

    fn dirs(&self) -> SourceDirs {
        SourceDirs::new()
            .with_station(&self.station)
            .with_reanalysis(&self.reanalysis)
            .with_weather(&self.weather)
    }

    fn open_store(&self) -> Result<ParquetStore> {
        ParquetStore::open(&self.store, ParquetWriter::new())
    }
}

/// Three grid points inside the region at 10:00 (10, 20, 30 µg/m³ once
/// converted) and one point far outside it.
fn write_grid(path: &Path) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new(
            "valid_time",
            DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
            false,
        ),
        Field::new("latitude", DataType::Float64, false),
        Field::new("longitude", DataType::Float64, false),
        Field::new("pm2p5", DataType::Float64, true),
    ]));

    let t = hour(10).timestamp_millis();
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(TimestampMillisecondArray::from(vec![t, t, t, t]).with_timezone("UTC")),
            Arc::new(Float64Array::from(vec![51.0, 51.25, 51.5, 60.0])),
            Arc::new(Float64Array::from(vec![71.0, 71.25, 71.5, 90.0])),
            Arc::new(Float64Array::from(vec![1e-8, 2e-8, 3e-8, 9e-7])),
        ],
    )?;

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn approx(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("value should be present");
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {}, got {}",
        expected,
        actual
    );
}

#[tokio::test]
async fn test_full_reprocessing_end_to_end() -> Result<()> {
    let fixture = Fixture::new()?;
    let pipeline = Pipeline::new(PipelineConfig::default())?.with_max_workers(2);

    let report = {
        let mut store = fixture.open_store()?;
        pipeline.process(&fixture.dirs(), &mut store, None).await?
    };

    let store = ParquetStore::open_read_only(&fixture.store)?;
    let records = store.load_all()?;
    assert_eq!(records.len(), 2);

    // 09:00 combines station pollutants with the 15:00 (+06:00) weather row
    let nine = &records[0];
    assert_eq!(nine.timestamp_utc, hour(9));
    assert_eq!(nine.location, "Astana");
    approx(nine.value(PM25), 45.0);
    assert_eq!(nine.pm25_source(), Some(Source::GroundStation));
    approx(nine.value(PM10), 55.0);
    approx(nine.value(CO), 1.5);
    approx(nine.value(TEMPERATURE), -12.0);
    assert_eq!(nine.weather_source(), Some(Source::WeatherArchive));
    assert_eq!(nine.completeness_score, 1.0);
    assert_eq!(nine.features.hour, 9);
    assert!(nine.features.is_heating_season);

    // 10:00 has the region-averaged reanalysis pm25 and weather only
    let ten = &records[1];
    assert_eq!(ten.timestamp_utc, hour(10));
    approx(ten.value(PM25), 20.0);
    assert_eq!(ten.pm25_source(), Some(Source::Reanalysis));
    assert_eq!(ten.value(PM10), None);
    assert_eq!(ten.completeness_score, 0.9);

    assert_eq!(report.records_written, 2);
    assert_eq!(report.grid_points_outside_region, 1);
    assert_eq!(report.aggregation_groups, 1);
    assert_eq!(report.aggregation_groups_dropped, 0);
    assert_eq!(report.sources[&Source::GroundStation].rows_read, 6);
    assert_eq!(report.sources[&Source::GroundStation].rows_skipped, 2);
    assert_eq!(report.completeness.excellent, 2);
    Ok(())
}

#[tokio::test]
async fn test_reprocessing_is_idempotent() -> Result<()> {
    let fixture = Fixture::new()?;
    let pipeline = Pipeline::new(PipelineConfig::default())?;
    let mut store = fixture.open_store()?;

    pipeline.process(&fixture.dirs(), &mut store, None).await?;
    let first = store.load_all()?;

    pipeline.process(&fixture.dirs(), &mut store, None).await?;
    let second = store.load_all()?;

    assert_eq!(first, second);
    drop(store);

    // a fresh handle replays the same parts
    let reopened = ParquetStore::open_read_only(&fixture.store)?;
    assert_eq!(reopened.load_all()?, first);
    Ok(())
}

#[tokio::test]
async fn test_live_feed_priority_survives_reanalysis_refresh() -> Result<()> {
    let fixture = Fixture::new()?;
    let pipeline = Pipeline::new(PipelineConfig::default())?;
    let mut store = fixture.open_store()?;
    pipeline.process(&fixture.dirs(), &mut store, None).await?;

    // 16:00 at +06:00 is the 10:00 UTC hour currently owned by reanalysis
    let reading = LiveReading::from_json(
        r#"{"time": "2024-01-15 16:00:00", "tz": "+06:00", "values": {"pm25": 42.0, "pm10": 60.0}}"#,
    )?;
    let summary = pipeline.ingest_live(&reading, &mut store)?;
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.fields.overwritten, 1);
    assert_eq!(summary.fields.filled, 1);

    let key = (hour(10), "Astana".to_string());
    let updated = store.get(&key)?.expect("hour should exist");
    assert_eq!(updated.value(PM25), Some(42.0));
    assert_eq!(updated.pm25_source(), Some(Source::LiveFeed));
    // weather fields untouched, score recomputed with pm10 now present
    approx(updated.value(TEMPERATURE), -13.0);
    assert_eq!(updated.completeness_score, 1.0);

    let (_, refresh) = pipeline
        .reprocess_reanalysis(&fixture.reanalysis, &mut store, None)
        .await?;
    assert_eq!(refresh.fields.protected, 1);

    let after = store.get(&key)?.expect("hour should exist");
    assert_eq!(after.value(PM25), Some(42.0));
    assert_eq!(after.pm25_source(), Some(Source::LiveFeed));
    Ok(())
}

#[tokio::test]
async fn test_live_reading_for_new_hour_is_inserted() -> Result<()> {
    let fixture = Fixture::new()?;
    let pipeline = Pipeline::new(PipelineConfig::default())?;
    let mut store = fixture.open_store()?;

    let reading = LiveReading::from_json(
        r#"{"time": "2024-01-16 08:00:00", "values": {"pm25": 12.0}}"#,
    )?;
    let summary = pipeline.ingest_live(&reading, &mut store)?;
    assert_eq!(summary.inserted, 1);

    let records = store.load_all()?;
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].timestamp_utc,
        Utc.with_ymd_and_hms(2024, 1, 16, 2, 0, 0).unwrap()
    );
    assert_eq!(records[0].completeness_score, 0.3);
    Ok(())
}

#[test]
fn test_second_writer_is_locked_out() -> Result<()> {
    let fixture = Fixture::new()?;
    let _writer = fixture.open_store()?;

    match fixture.open_store() {
        Err(ProcessingError::StoreLocked(_)) => {}
        other => panic!("expected StoreLocked, got {:?}", other.map(|_| ())),
    }

    // readers are not blocked
    assert!(ParquetStore::open_read_only(&fixture.store).is_ok());
    Ok(())
}

#[tokio::test]
async fn test_validate_only_run_writes_nothing() -> Result<()> {
    let fixture = Fixture::new()?;
    let pipeline = Pipeline::new(PipelineConfig::default())?;

    let output = pipeline.run(&fixture.dirs(), None).await?;
    assert_eq!(output.records.len(), 2);
    assert!(!fixture.store.exists());
    Ok(())
}

#[tokio::test]
async fn test_retained_observations_are_written_per_source() -> Result<()> {
    let fixture = Fixture::new()?;
    let config = PipelineConfig {
        retain_observations: true,
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(config)?.with_audit_dir(&fixture.store);
    let mut store = fixture.open_store()?;
    pipeline.process(&fixture.dirs(), &mut store, None).await?;

    let audit = ObservationWriter::new(&fixture.store);
    let reanalysis = audit.read(Source::Reanalysis)?;
    assert_eq!(reanalysis.len(), 1);
    approx(Some(reanalysis[0].value), 20.0);
    assert_eq!(reanalysis[0].quality.as_deref(), Some("reanalysis"));

    let weather = audit.read(Source::WeatherArchive)?;
    assert_eq!(weather.len(), 8);
    Ok(())
}

#[tokio::test]
async fn test_query_contracts_over_store() -> Result<()> {
    let fixture = Fixture::new()?;
    let pipeline = Pipeline::new(PipelineConfig::default())?;
    {
        let mut store = fixture.open_store()?;
        pipeline.process(&fixture.dirs(), &mut store, None).await?;
    }

    let store = ParquetStore::open_read_only(&fixture.store)?;
    let service = QueryService::from_store(&store, AqiTable::default())?;

    let latest = service.latest_complete(0.95).expect("a complete record");
    assert_eq!(latest.record.timestamp_utc, hour(9));
    assert_eq!(latest.aqi.map(|a| a.category), Some(AqiCategory::UnhealthyForSensitiveGroups));

    let series = service.time_series(PM25, 7);
    assert_eq!(series.len(), 2);
    assert!(series[0].timestamp_utc < series[1].timestamp_utc);

    let daily = service.daily_aggregates(PM25, 7);
    assert_eq!(daily.len(), 1);
    assert_eq!(daily[0].count, 2);
    approx(Some(daily[0].max), 45.0);

    let stats = service.statistics();
    assert_eq!(stats.records, 2);
    assert_eq!(stats.last_hour, Some(hour(10)));
    Ok(())
}

#[test]
fn test_aqi_breakpoints() {
    let table = AqiTable::default();
    assert_eq!(table.compute(12.0).map(|a| a.index), Some(50));
    assert_eq!(table.compute(35.4).map(|a| a.index), Some(100));
    assert_eq!(table.compute(0.0).map(|a| a.index), Some(0));
    assert_eq!(table.compute(600.0).map(|a| a.index), Some(500));
}

#[test]
fn test_reset_and_compact() -> Result<()> {
    let fixture = Fixture::new()?;
    let pipeline = Pipeline::new(PipelineConfig::default())?;
    let mut store = fixture.open_store()?;

    for (i, time) in ["2024-01-15 15:00:00", "2024-01-15 16:00:00", "2024-01-15 17:00:00"]
        .iter()
        .enumerate()
    {
        let reading = LiveReading::from_json(&format!(
            r#"{{"time": "{}", "values": {{"pm25": {}.0}}}}"#,
            time,
            10 + i
        ))?;
        pipeline.ingest_live(&reading, &mut store)?;
    }
    assert_eq!(store.part_count(), 3);

    let written = store.compact(1000)?;
    assert_eq!(written, 3);
    assert_eq!(store.part_count(), 1);
    assert_eq!(store.len()?, 3);

    store.reset()?;
    assert!(store.is_empty()?);
    assert_eq!(store.part_count(), 0);
    Ok(())
}
