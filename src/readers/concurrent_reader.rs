use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::{ProcessingError, Result};
use crate::readers::{
    GridRow, RawBatch, ReanalysisReader, StationReader, StationRow, WeatherReader, WeatherRow,
};

/// Input directory per source. A `None` source is simply not read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceDirs {
    pub station: Option<PathBuf>,
    pub reanalysis: Option<PathBuf>,
    pub weather: Option<PathBuf>,
}

impl SourceDirs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_station(mut self, dir: impl Into<PathBuf>) -> Self {
        self.station = Some(dir.into());
        self
    }

    pub fn with_reanalysis(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reanalysis = Some(dir.into());
        self
    }

    pub fn with_weather(mut self, dir: impl Into<PathBuf>) -> Self {
        self.weather = Some(dir.into());
        self
    }

    /// A configured directory that does not exist means the fetch for that
    /// source failed; the run must not start with partial inputs.
    pub fn check(&self) -> Result<()> {
        for dir in [&self.station, &self.reanalysis, &self.weather]
            .into_iter()
            .flatten()
        {
            if !dir.is_dir() {
                return Err(ProcessingError::MissingData(format!(
                    "Source directory {} does not exist",
                    dir.display()
                )));
            }
        }
        Ok(())
    }
}

/// Raw rows from all three sources.
#[derive(Debug, Default)]
pub struct SourceData {
    pub station: RawBatch<StationRow>,
    pub reanalysis: RawBatch<GridRow>,
    pub weather: RawBatch<WeatherRow>,
}

pub struct ConcurrentReader {
    max_workers: usize,
}

impl ConcurrentReader {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    /// Read all sources concurrently: one blocking task per source, each
    /// parsing its own files on a shared rayon pool.
    pub async fn read_all(&self, dirs: &SourceDirs) -> Result<SourceData> {
        dirs.check()?;

        let pool = Arc::new(
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.max_workers)
                .build()
                .map_err(|e| ProcessingError::Config(format!("Failed to build worker pool: {}", e)))?,
        );

        let station_handle: JoinHandle<Result<RawBatch<StationRow>>> = {
            let pool = pool.clone();
            let dir = dirs.station.clone();
            tokio::task::spawn_blocking(move || {
                read_optional(dir.as_deref(), |d| pool.install(|| StationReader::new().read_dir(d)))
            })
        };

        let reanalysis_handle: JoinHandle<Result<RawBatch<GridRow>>> = {
            let pool = pool.clone();
            let dir = dirs.reanalysis.clone();
            tokio::task::spawn_blocking(move || {
                read_optional(dir.as_deref(), |d| {
                    pool.install(|| ReanalysisReader::new().read_dir(d))
                })
            })
        };

        let weather_handle: JoinHandle<Result<RawBatch<WeatherRow>>> = {
            let pool = pool.clone();
            let dir = dirs.weather.clone();
            tokio::task::spawn_blocking(move || {
                read_optional(dir.as_deref(), |d| pool.install(|| WeatherReader::new().read_dir(d)))
            })
        };

        let (station, reanalysis, weather) =
            tokio::try_join!(station_handle, reanalysis_handle, weather_handle)?;
        let data = SourceData {
            station: station?,
            reanalysis: reanalysis?,
            weather: weather?,
        };

        info!(
            "Read {} station rows, {} grid rows, {} weather rows",
            data.station.rows.len(),
            data.reanalysis.rows.len(),
            data.weather.rows.len()
        );
        Ok(data)
    }
}

impl Default for ConcurrentReader {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

fn read_optional<T, F>(dir: Option<&Path>, read: F) -> Result<RawBatch<T>>
where
    F: FnOnce(&Path) -> Result<RawBatch<T>>,
{
    match dir {
        Some(dir) => read(dir),
        None => Ok(RawBatch::default()),
    }
}
