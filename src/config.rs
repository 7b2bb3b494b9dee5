use chrono::FixedOffset;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;
use validator::Validate;

use crate::error::{ProcessingError, Result};
use crate::processors::completeness::CompletenessWeights;
use crate::processors::reconciler::SourcePriority;
use crate::query::aqi::AqiTable;
use crate::utils::constants::*;
use crate::utils::coordinates::BoundingBox;
use crate::utils::time::parse_utc_offset;

pub const ENV_PREFIX: &str = "AAQIS";

/// Canonical location every source is unified onto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LocationConfig {
    #[validate(length(min = 1))]
    pub name: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_LOCATION.to_string(),
            latitude: DEFAULT_LATITUDE,
            longitude: DEFAULT_LONGITUDE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PipelineConfig {
    #[validate(nested)]
    pub location: LocationConfig,

    /// Reanalysis grid points outside this region are ignored.
    pub region: BoundingBox,

    /// Offset for weather-archive rows and live readings that carry none.
    pub weather_utc_offset: String,

    pub source_priority: SourcePriority,

    pub completeness: CompletenessWeights,

    pub aqi: AqiTable,

    #[validate(range(min = 1))]
    pub chunk_size: usize,

    pub compression: String,

    pub retain_observations: bool,

    /// Threshold used by the "latest complete record" query.
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_completeness: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            location: LocationConfig::default(),
            region: BoundingBox {
                north: REGION_NORTH,
                south: REGION_SOUTH,
                west: REGION_WEST,
                east: REGION_EAST,
            },
            weather_utc_offset: DEFAULT_UTC_OFFSET.to_string(),
            source_priority: SourcePriority::default(),
            completeness: CompletenessWeights::default(),
            aqi: AqiTable::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            compression: COMPRESSION_SNAPPY.to_string(),
            retain_observations: false,
            min_completeness: DEFAULT_MIN_COMPLETENESS,
        }
    }
}

impl PipelineConfig {
    /// Defaults, then the optional file, then `AAQIS_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: PipelineConfig = builder.build()?.try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    /// Field-level validation plus the cross-field rules serde cannot express.
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        self.region.check()?;
        self.utc_offset()?;
        self.completeness.check()?;
        self.aqi.check()?;

        match self.compression.to_lowercase().as_str() {
            COMPRESSION_SNAPPY | COMPRESSION_GZIP | COMPRESSION_LZ4 | COMPRESSION_ZSTD
            | COMPRESSION_NONE => Ok(()),
            other => Err(ProcessingError::Config(format!(
                "Unsupported compression '{}'",
                other
            ))),
        }
    }

    pub fn utc_offset(&self) -> Result<FixedOffset> {
        parse_utc_offset(&self.weather_utc_offset)
    }
}
