use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::cli::args::{Cli, Commands, QueryView};
use crate::config::PipelineConfig;
use crate::models::{LiveReading, Parameter};
use crate::processors::Pipeline;
use crate::query::QueryService;
use crate::readers::SourceDirs;
use crate::storage::{HourlyStore, ParquetStore, ParquetWriter};
use crate::utils::progress::ProgressReporter;

pub async fn run(cli: Cli) -> Result<()> {
    let config = PipelineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Process {
            station_dir,
            reanalysis_dir,
            weather_dir,
            store_dir,
            validate_only,
            max_workers,
        } => {
            let mut dirs = SourceDirs::new();
            if let Some(dir) = station_dir {
                dirs = dirs.with_station(dir);
            }
            if let Some(dir) = reanalysis_dir {
                dirs = dirs.with_reanalysis(dir);
            }
            if let Some(dir) = weather_dir {
                dirs = dirs.with_weather(dir);
            }

            println!("Processing observations into {}", store_dir.display());
            println!("Workers: {}, Chunk size: {}", max_workers, config.chunk_size);

            let pipeline = Pipeline::new(config.clone())?
                .with_max_workers(max_workers)
                .with_audit_dir(&store_dir);
            let progress = ProgressReporter::new_spinner("Processing data...", false);

            if validate_only {
                let output = pipeline.run(&dirs, Some(&progress)).await?;
                progress.finish_with_message(&format!(
                    "Built {} hourly records",
                    output.records.len()
                ));
                println!("\n{}", output.report.summary());
                println!("Validation complete - nothing written");
                return Ok(());
            }

            let mut store = open_store(&store_dir, &config)?;
            let report = pipeline.process(&dirs, &mut store, Some(&progress)).await?;

            println!("\n{}", report.summary());
            println!("{}", store.info()?.summary());
        }

        Commands::IngestLive { reading, store_dir } => {
            let reading = LiveReading::from_path(&reading)
                .with_context(|| format!("Failed to read live reading {}", reading.display()))?;

            let pipeline = Pipeline::new(config.clone())?;
            let mut store = open_store(&store_dir, &config)?;
            let summary = pipeline.ingest_live(&reading, &mut store)?;

            println!(
                "Live reading merged: {} inserted, {} updated, {} fields filled, {} overwritten, {} protected",
                summary.inserted,
                summary.updated,
                summary.fields.filled,
                summary.fields.overwritten,
                summary.fields.protected
            );
        }

        Commands::ReprocessReanalysis {
            reanalysis_dir,
            store_dir,
            max_workers,
        } => {
            let pipeline = Pipeline::new(config.clone())?
                .with_max_workers(max_workers)
                .with_audit_dir(&store_dir);
            let mut store = open_store(&store_dir, &config)?;
            let progress = ProgressReporter::new_spinner("Reprocessing reanalysis...", false);

            let (report, summary) = pipeline
                .reprocess_reanalysis(&reanalysis_dir, &mut store, Some(&progress))
                .await?;

            println!("\n{}", report.summary());
            println!(
                "Merged: {} inserted, {} updated, {} fields protected",
                summary.inserted, summary.updated, summary.fields.protected
            );
        }

        Commands::Query { store_dir, view } => {
            let store = ParquetStore::open_read_only(&store_dir)
                .with_context(|| format!("Failed to open store {}", store_dir.display()))?;
            let service = QueryService::from_store(&store, config.aqi.clone())?;
            info!("Querying {} hourly records", service.len());
            run_query(&service, view, &config)?;
        }

        Commands::Aqi { pm25 } => match config.aqi.compute(pm25) {
            Some(aqi) => println!("PM2.5 {:.1} µg/m³ -> AQI {} ({})", pm25, aqi.index, aqi.category),
            None => bail!("No AQI for concentration {}", pm25),
        },

        Commands::Info { store_dir, sample } => {
            let store = ParquetStore::open_read_only(&store_dir)
                .with_context(|| format!("Failed to open store {}", store_dir.display()))?;
            println!("{}", store.info()?.summary());

            if sample > 0 {
                let records = store.load_all()?;
                println!("\nMost recent records (showing up to {}):", sample);
                for (i, record) in records.iter().rev().take(sample).enumerate() {
                    println!(
                        "{}. {} {}: pm25={} ({}), temp={}, completeness={:.2}",
                        i + 1,
                        record.timestamp_utc,
                        record.location,
                        format_value(record.pm25.value),
                        record
                            .pm25_source()
                            .map(|s| s.as_str())
                            .unwrap_or("-"),
                        format_value(record.temperature.value),
                        record.completeness_score
                    );
                }
            }
        }

        Commands::Compact { store_dir } => {
            let mut store = open_store(&store_dir, &config)?;
            let before = store.part_count();
            let written = store.compact(config.chunk_size)?;
            println!(
                "Compacted {} parts into {} ({} records)",
                before,
                store.part_count(),
                written
            );
        }

        Commands::Reset { store_dir, yes } => {
            if !yes {
                bail!("Refusing to delete {} without --yes", store_dir.display());
            }
            let mut store = open_store(&store_dir, &config)?;
            let records = store.len()?;
            store.reset()?;
            warn!("Deleted {} hourly records from {}", records, store_dir.display());
            println!("Store reset");
        }
    }

    Ok(())
}

fn open_store(dir: &std::path::Path, config: &PipelineConfig) -> Result<ParquetStore> {
    let writer = ParquetWriter::new().with_compression(&config.compression)?;
    let store = ParquetStore::open(dir, writer)
        .with_context(|| format!("Failed to open store {}", dir.display()))?;
    info!("Opened store {} ({} parts)", dir.display(), store.part_count());
    Ok(store)
}

fn run_query(service: &QueryService, view: QueryView, config: &PipelineConfig) -> Result<()> {
    match view {
        QueryView::Latest { min_completeness } => {
            let threshold = min_completeness.unwrap_or(config.min_completeness);
            match service.latest_complete(threshold) {
                Some(latest) => println!("{}", serde_json::to_string_pretty(&latest)?),
                None => println!("No record with PM2.5 and completeness >= {:.2}", threshold),
            }
        }
        QueryView::Series { parameter, days } => {
            let parameter: Parameter = parameter.parse()?;
            let series = service.time_series(parameter, days);
            println!(
                "{} ({}), {} points",
                parameter,
                parameter.canonical_unit(),
                series.len()
            );
            for point in series {
                println!("{}  {:.2}", point.timestamp_utc, point.value);
            }
        }
        QueryView::Daily { parameter, days } => {
            let parameter: Parameter = parameter.parse()?;
            println!("{:<12} {:>10} {:>10} {:>10} {:>6}", "date", "avg", "min", "max", "count");
            for day in service.daily_aggregates(parameter, days) {
                println!(
                    "{:<12} {:>10.2} {:>10.2} {:>10.2} {:>6}",
                    day.date, day.avg, day.min, day.max, day.count
                );
            }
        }
        QueryView::Stats => println!("{}", service.statistics().summary()),
        QueryView::Hourly => print_pattern("hour", &service.hourly_pattern()),
        QueryView::Monthly => print_pattern("month", &service.monthly_pattern()),
    }
    Ok(())
}

fn print_pattern(label: &str, buckets: &[crate::query::PatternBucket]) {
    println!("{:<6} {:>10} {:>10} {:>8}", label, "pm25", "temp", "count");
    for bucket in buckets {
        println!(
            "{:<6} {:>10.2} {:>10} {:>8}",
            bucket.key,
            bucket.avg_pm25,
            format_value(bucket.avg_temperature),
            bucket.count
        );
    }
}

fn format_value(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.1}", v))
        .unwrap_or_else(|| "-".to_string())
}
