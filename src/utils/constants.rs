/// Canonical monitoring area
pub const DEFAULT_LOCATION: &str = "Astana";
pub const DEFAULT_LATITUDE: f64 = 51.1694;
pub const DEFAULT_LONGITUDE: f64 = 71.4491;

/// Reanalysis download region
pub const REGION_NORTH: f64 = 52.5;
pub const REGION_SOUTH: f64 = 50.5;
pub const REGION_WEST: f64 = 70.0;
pub const REGION_EAST: f64 = 73.0;

/// Offset applied to weather-archive and live timestamps without their own
pub const DEFAULT_UTC_OFFSET: &str = "+06:00";

/// Reanalysis mass concentration (kg/m³) to canonical units
pub const KG_TO_UG: f64 = 1e9;
pub const KG_TO_MG: f64 = 1e6;

/// Quality tags
pub const QUALITY_REANALYSIS: &str = "reanalysis";
pub const QUALITY_HISTORICAL_IMPORT: &str = "historical_import";

/// Processing defaults
pub const DEFAULT_CHUNK_SIZE: usize = 5000;
pub const DEFAULT_ROW_GROUP_SIZE: usize = 10000;
pub const DEFAULT_MIN_COMPLETENESS: f64 = 0.5;

/// Store layout
pub const PART_FILE_PREFIX: &str = "part-";
pub const LOCK_FILE: &str = ".lock";
pub const OBSERVATIONS_DIR: &str = "observations";

/// Source file extensions
pub const CSV_EXTENSION: &str = "csv";
pub const PARQUET_EXTENSION: &str = "parquet";
pub const ZIP_EXTENSION: &str = "zip";

/// Parquet compression options
pub const COMPRESSION_SNAPPY: &str = "snappy";
pub const COMPRESSION_GZIP: &str = "gzip";
pub const COMPRESSION_LZ4: &str = "lz4";
pub const COMPRESSION_ZSTD: &str = "zstd";
pub const COMPRESSION_NONE: &str = "none";
