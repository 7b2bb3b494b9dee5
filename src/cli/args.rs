use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "aaqis-etl")]
#[command(about = "Reconcile air-quality and weather observations into a unified hourly table")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Configuration file (TOML, YAML or JSON)")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rebuild the unified table from all raw sources
    Process {
        #[arg(long, help = "Directory of ground-station CSV files")]
        station_dir: Option<PathBuf>,

        #[arg(long, help = "Directory of reanalysis Parquet or zip files")]
        reanalysis_dir: Option<PathBuf>,

        #[arg(long, help = "Directory of weather-archive CSV files")]
        weather_dir: Option<PathBuf>,

        #[arg(short, long, help = "Unified table directory")]
        store_dir: PathBuf,

        #[arg(long, default_value = "false")]
        validate_only: bool,

        #[arg(long, default_value_t = num_cpus::get())]
        max_workers: usize,
    },

    /// Merge one live-feed reading into the unified table
    IngestLive {
        #[arg(short, long, help = "Live reading JSON file")]
        reading: PathBuf,

        #[arg(short, long)]
        store_dir: PathBuf,
    },

    /// Refresh reanalysis-owned fields without touching higher-priority ones
    ReprocessReanalysis {
        #[arg(long)]
        reanalysis_dir: PathBuf,

        #[arg(short, long)]
        store_dir: PathBuf,

        #[arg(long, default_value_t = num_cpus::get())]
        max_workers: usize,
    },

    /// Read-only views over the unified table
    Query {
        #[arg(short, long)]
        store_dir: PathBuf,

        #[command(subcommand)]
        view: QueryView,
    },

    /// Air-quality index for a PM2.5 concentration
    Aqi {
        #[arg(long, help = "PM2.5 concentration in µg/m³", allow_negative_numbers = true)]
        pm25: f64,
    },

    /// Display information about the unified table
    Info {
        #[arg(short, long)]
        store_dir: PathBuf,

        #[arg(long, default_value = "5", help = "Number of most recent records to show")]
        sample: usize,
    },

    /// Rewrite the table's part files into bulk chunks
    Compact {
        #[arg(short, long)]
        store_dir: PathBuf,
    },

    /// Delete the unified table
    Reset {
        #[arg(short, long)]
        store_dir: PathBuf,

        #[arg(long, help = "Confirm deletion")]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum QueryView {
    /// Most recent record with PM2.5 above the completeness threshold
    Latest {
        #[arg(long, help = "Minimum completeness score [default: from config]")]
        min_completeness: Option<f64>,
    },

    /// Hourly values of one parameter over a trailing window
    Series {
        #[arg(short, long, default_value = "pm25")]
        parameter: String,

        #[arg(short, long, default_value = "7")]
        days: i64,
    },

    /// Daily average, minimum and maximum of one parameter
    Daily {
        #[arg(short, long, default_value = "pm25")]
        parameter: String,

        #[arg(short, long, default_value = "30")]
        days: i64,
    },

    /// PM2.5 summary statistics and AQI category distribution
    Stats,

    /// Average PM2.5 and temperature per hour of day
    Hourly,

    /// Average PM2.5 and temperature per month
    Monthly,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_process_arguments() {
        let cli = Cli::try_parse_from([
            "aaqis-etl",
            "--verbose",
            "process",
            "--station-dir",
            "data/openaq",
            "--store-dir",
            "store",
            "--validate-only",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Process {
                station_dir,
                reanalysis_dir,
                store_dir,
                validate_only,
                ..
            } => {
                assert_eq!(station_dir, Some(PathBuf::from("data/openaq")));
                assert!(reanalysis_dir.is_none());
                assert_eq!(store_dir, PathBuf::from("store"));
                assert!(validate_only);
            }
            _ => panic!("expected process command"),
        }
    }

    #[test]
    fn test_query_view_defaults() {
        let cli = Cli::try_parse_from(["aaqis-etl", "query", "-s", "store", "series"]).unwrap();
        match cli.command {
            Commands::Query {
                view: QueryView::Series { parameter, days },
                ..
            } => {
                assert_eq!(parameter, "pm25");
                assert_eq!(days, 7);
            }
            _ => panic!("expected query series"),
        }
    }

    #[test]
    fn test_reset_requires_store_dir() {
        assert!(Cli::try_parse_from(["aaqis-etl", "reset", "--yes"]).is_err());
    }
}
