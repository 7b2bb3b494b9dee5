use chrono::FixedOffset;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::models::{Observation, Parameter, Pollutant, Source, WeatherField};
use crate::processors::run_report::SourceCounts;
use crate::readers::{GridRow, RawBatch, SourceData, StationRow, WeatherRow};
use crate::utils::constants::*;
use crate::utils::coordinates::grid_cell_key;
use crate::utils::text::normalize_unit;
use crate::utils::time::{parse_local_timestamp, parse_timestamp_utc, parse_utc_offset};

/// Canonical pollutant for a reanalysis grid variable name.
pub fn reanalysis_variable(name: &str) -> Option<Pollutant> {
    match name {
        "pm2p5" | "pm25" => Some(Pollutant::Pm25),
        "pm10" => Some(Pollutant::Pm10),
        "nitrogen_dioxide" | "no2" => Some(Pollutant::No2),
        "ozone" | "go3" => Some(Pollutant::O3),
        "sulphur_dioxide" | "so2" => Some(Pollutant::So2),
        "carbon_monoxide" | "co" => Some(Pollutant::Co),
        _ => None,
    }
}

/// kg/m³ to the pollutant's canonical unit.
pub fn reanalysis_factor(pollutant: Pollutant) -> f64 {
    match pollutant {
        Pollutant::Co => KG_TO_MG,
        _ => KG_TO_UG,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    MissingTimestamp,
    InvalidTimestamp(String),
    MissingParameter,
    UnknownParameter(String),
    MissingValue,
    InvalidValue(f64),
    UnsupportedUnit(String),
}

/// Normalized observations from every source plus per-source counts.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub observations: Vec<Observation>,
    pub counts: BTreeMap<Source, SourceCounts>,
}

pub struct Normalizer {
    location: String,
    latitude: f64,
    longitude: f64,
    default_offset: FixedOffset,
}

impl Normalizer {
    pub fn new(
        location: impl Into<String>,
        latitude: f64,
        longitude: f64,
        default_offset: FixedOffset,
    ) -> Self {
        Self {
            location: location.into(),
            latitude,
            longitude,
            default_offset,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self::new(
            config.location.name.clone(),
            config.location.latitude,
            config.location.longitude,
            config.utc_offset()?,
        ))
    }

    /// One station row to one observation at the canonical location.
    pub fn normalize_station(&self, row: &StationRow) -> std::result::Result<Observation, Rejection> {
        let raw_ts = row
            .timestamp_utc
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(Rejection::MissingTimestamp)?;
        let timestamp =
            parse_timestamp_utc(raw_ts).map_err(|_| Rejection::InvalidTimestamp(raw_ts.to_string()))?;

        let raw_param = row
            .parameter
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(Rejection::MissingParameter)?;
        let parameter: Parameter = raw_param
            .parse()
            .map_err(|_| Rejection::UnknownParameter(raw_param.to_lowercase()))?;

        let mut value = row.value.ok_or(Rejection::MissingValue)?;
        if !value.is_finite() || (parameter.is_pollutant() && value < 0.0) {
            return Err(Rejection::InvalidValue(value));
        }

        // A missing unit column is read as the canonical unit.
        let canonical = parameter.canonical_unit();
        if let Some(unit) = row.unit.as_deref().filter(|u| !u.is_empty()) {
            let unit = normalize_unit(unit);
            if unit != canonical {
                value = match (unit.as_str(), canonical) {
                    ("µg/m³", "mg/m³") => value / 1000.0,
                    ("mg/m³", "µg/m³") => value * 1000.0,
                    _ => return Err(Rejection::UnsupportedUnit(unit)),
                };
            }
        }

        let mut observation = Observation::new(
            timestamp,
            self.location.clone(),
            Some(self.latitude),
            Some(self.longitude),
            parameter,
            value,
            canonical,
            Source::GroundStation,
        );
        if let Some(quality) = row.quality.as_deref().filter(|q| !q.is_empty()) {
            observation = observation.with_quality(quality);
        }
        Ok(observation)
    }

    /// Melt one wide grid row into long observations keyed by grid cell.
    /// Returns the observations and the number of values dropped.
    pub fn normalize_grid(&self, row: &GridRow) -> (Vec<Observation>, usize) {
        let location = grid_cell_key(&self.location, row.latitude, row.longitude, row.pressure_level);
        let mut observations = Vec::with_capacity(row.values.len());
        let mut dropped = 0;

        for (name, value) in &row.values {
            let Some(pollutant) = reanalysis_variable(name) else {
                continue;
            };
            let Some(raw) = value else {
                dropped += 1;
                continue;
            };

            let converted = raw * reanalysis_factor(pollutant);
            if !converted.is_finite() || converted < 0.0 {
                dropped += 1;
                continue;
            }

            observations.push(
                Observation::new(
                    row.time,
                    location.clone(),
                    Some(row.latitude),
                    Some(row.longitude),
                    Parameter::Pollutant(pollutant),
                    converted,
                    pollutant.canonical_unit(),
                    Source::Reanalysis,
                )
                .with_quality(QUALITY_REANALYSIS),
            );
        }

        (observations, dropped)
    }

    /// One weather row to one observation per populated canonical field.
    pub fn normalize_weather(&self, row: &WeatherRow) -> std::result::Result<Vec<Observation>, Rejection> {
        let raw_ts = row
            .timestamp_local
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(Rejection::MissingTimestamp)?;

        let offset = match row.utc_offset.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => parse_utc_offset(raw).map_err(|_| Rejection::InvalidTimestamp(raw.to_string()))?,
            None => self.default_offset,
        };
        let timestamp = parse_local_timestamp(raw_ts, offset)
            .map_err(|_| Rejection::InvalidTimestamp(raw_ts.to_string()))?;

        let fields = [
            (WeatherField::Temperature, row.temp_c),
            (WeatherField::Humidity, row.humidity_pct),
            (WeatherField::Pressure, row.surface_pressure_hpa),
            (WeatherField::WindSpeed, row.wind_speed_ms),
            (WeatherField::WindDirection, row.wind_dir_deg),
            (WeatherField::Precipitation, row.precip_mm),
            (WeatherField::CloudCover, row.cloud_cover_pct),
        ];

        let observations: Vec<Observation> = fields
            .into_iter()
            .filter_map(|(field, value)| value.filter(|v| v.is_finite()).map(|v| (field, v)))
            .map(|(field, value)| {
                Observation::new(
                    timestamp,
                    self.location.clone(),
                    Some(self.latitude),
                    Some(self.longitude),
                    Parameter::Weather(field),
                    value,
                    field.canonical_unit(),
                    Source::WeatherArchive,
                )
                .with_quality(QUALITY_HISTORICAL_IMPORT)
            })
            .collect();

        if observations.is_empty() {
            return Err(Rejection::MissingValue);
        }
        Ok(observations)
    }

    /// Normalize everything read in one run. Rejected rows are counted, never fatal.
    pub fn normalize_all(&self, data: &SourceData) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();

        let mut station = counts_from(&data.station);
        for row in &data.station.rows {
            match self.normalize_station(row) {
                Ok(observation) => {
                    batch.observations.push(observation);
                    station.observations += 1;
                }
                Err(reason) => {
                    debug!("Rejected ground-station row: {:?}", reason);
                    station.rows_skipped += 1;
                }
            }
        }
        batch.counts.insert(Source::GroundStation, station);

        let mut reanalysis = counts_from(&data.reanalysis);
        for row in &data.reanalysis.rows {
            let (observations, dropped) = self.normalize_grid(row);
            reanalysis.observations += observations.len();
            reanalysis.values_dropped += dropped;
            batch.observations.extend(observations);
        }
        batch.counts.insert(Source::Reanalysis, reanalysis);

        let mut weather = counts_from(&data.weather);
        for row in &data.weather.rows {
            match self.normalize_weather(row) {
                Ok(observations) => {
                    weather.observations += observations.len();
                    batch.observations.extend(observations);
                }
                Err(reason) => {
                    debug!("Rejected weather-archive row: {:?}", reason);
                    weather.rows_skipped += 1;
                }
            }
        }
        batch.counts.insert(Source::WeatherArchive, weather);

        batch
    }
}

fn counts_from<T>(raw: &RawBatch<T>) -> SourceCounts {
    SourceCounts {
        files_read: raw.files_read,
        files_skipped: raw.files_skipped,
        rows_read: raw.rows_read(),
        rows_skipped: raw.rows_skipped,
        ..SourceCounts::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn normalizer() -> Normalizer {
        Normalizer::new("Astana", 51.1694, 71.4491, parse_utc_offset("+06:00").unwrap())
    }

    fn station_row(param: &str, value: Option<f64>, unit: &str) -> StationRow {
        StationRow {
            timestamp_utc: Some("2024-01-15T09:00:00+00:00".to_string()),
            parameter: Some(param.to_string()),
            value,
            unit: Some(unit.to_string()),
            quality: None,
        }
    }

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, h, 0, 0).unwrap()
    }

    #[test]
    fn test_station_row_gets_canonical_location() {
        let obs = normalizer()
            .normalize_station(&station_row("PM2.5", Some(35.2), "ug/m3"))
            .unwrap();

        assert_eq!(obs.parameter, Parameter::Pollutant(Pollutant::Pm25));
        assert_eq!(obs.location, "Astana");
        assert_eq!(obs.latitude, Some(51.1694));
        assert_eq!(obs.unit, "µg/m³");
        assert_eq!(obs.source, Source::GroundStation);
        assert_eq!(obs.timestamp_utc, ts(9));
    }

    #[test]
    fn test_station_rejections() {
        let n = normalizer();
        assert_eq!(
            n.normalize_station(&station_row("pm25", None, "µg/m³")),
            Err(Rejection::MissingValue)
        );
        assert_eq!(
            n.normalize_station(&station_row("pm25", Some(-999.0), "µg/m³")),
            Err(Rejection::InvalidValue(-999.0))
        );
        assert_eq!(
            n.normalize_station(&station_row("bc", Some(1.0), "µg/m³")),
            Err(Rejection::UnknownParameter("bc".to_string()))
        );
        assert_eq!(
            n.normalize_station(&station_row("o3", Some(0.03), "ppm")),
            Err(Rejection::UnsupportedUnit("ppm".to_string()))
        );
    }

    #[test]
    fn test_station_zero_is_valid() {
        let obs = normalizer()
            .normalize_station(&station_row("so2", Some(0.0), "µg/m³"))
            .unwrap();
        assert_eq!(obs.value, 0.0);
    }

    #[test]
    fn test_station_co_in_micrograms_is_converted() {
        let obs = normalizer()
            .normalize_station(&station_row("co", Some(450.0), "µg/m³"))
            .unwrap();
        assert_eq!(obs.unit, "mg/m³");
        assert!((obs.value - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_reanalysis_unit_conversion() {
        let row = GridRow {
            time: ts(0),
            latitude: 51.0,
            longitude: 71.25,
            pressure_level: None,
            values: vec![
                ("pm2p5".to_string(), Some(1e-8)),
                ("carbon_monoxide".to_string(), Some(2e-7)),
                ("go3".to_string(), Some(5e-8)),
                ("pm10".to_string(), None),
            ],
        };

        let (observations, dropped) = normalizer().normalize_grid(&row);
        assert_eq!(dropped, 1);
        assert_eq!(observations.len(), 3);

        let pm25 = &observations[0];
        assert!((pm25.value - 10.0).abs() < 1e-9);
        assert_eq!(pm25.unit, "µg/m³");
        assert_eq!(pm25.location, "Astana#51.0000,71.2500");
        assert_eq!(pm25.quality.as_deref(), Some("reanalysis"));

        let co = &observations[1];
        assert_eq!(co.parameter, Parameter::Pollutant(Pollutant::Co));
        assert!((co.value - 0.2).abs() < 1e-12);
        assert_eq!(co.unit, "mg/m³");

        assert_eq!(observations[2].parameter, Parameter::Pollutant(Pollutant::O3));
    }

    #[test]
    fn test_pressure_levels_get_separate_cells() {
        let row = |level: f64| GridRow {
            time: ts(0),
            latitude: 51.0,
            longitude: 71.25,
            pressure_level: Some(level),
            values: vec![("pm2p5".to_string(), Some(1e-8))],
        };

        let (upper, _) = normalizer().normalize_grid(&row(850.0));
        let (surface, _) = normalizer().normalize_grid(&row(1000.0));
        assert_eq!(upper[0].location, "Astana#51.0000,71.2500@850");
        assert_eq!(surface[0].location, "Astana#51.0000,71.2500@1000");
    }

    #[test]
    fn test_weather_local_time_to_utc() {
        let row = WeatherRow {
            timestamp_local: Some("2024-01-15T15:00".to_string()),
            temp_c: Some(-12.5),
            humidity_pct: Some(80.0),
            wind_speed_ms: Some(f64::NAN),
            ..WeatherRow::default()
        };

        let observations = normalizer().normalize_weather(&row).unwrap();
        assert_eq!(observations.len(), 2);
        assert!(observations.iter().all(|o| o.timestamp_utc == ts(9)));
        assert!(observations
            .iter()
            .all(|o| o.quality.as_deref() == Some("historical_import")));
        assert_eq!(observations[0].value, -12.5);
    }

    #[test]
    fn test_weather_row_offset_overrides_default() {
        let row = WeatherRow {
            timestamp_local: Some("2024-01-15 14:00:00".to_string()),
            utc_offset: Some("+05:00".to_string()),
            temp_c: Some(-10.0),
            ..WeatherRow::default()
        };
        let observations = normalizer().normalize_weather(&row).unwrap();
        assert_eq!(observations[0].timestamp_utc, ts(9));
    }

    #[test]
    fn test_weather_row_without_fields_is_rejected() {
        let row = WeatherRow {
            timestamp_local: Some("2024-01-15T15:00".to_string()),
            ..WeatherRow::default()
        };
        assert_eq!(normalizer().normalize_weather(&row), Err(Rejection::MissingValue));
    }

    #[test]
    fn test_normalize_all_counts_rejections() {
        let data = SourceData {
            station: RawBatch {
                rows: vec![
                    station_row("pm25", Some(12.0), "µg/m³"),
                    station_row("pm25", Some(-1.0), "µg/m³"),
                ],
                files_read: 1,
                files_skipped: 0,
                rows_skipped: 3,
            },
            ..SourceData::default()
        };

        let batch = normalizer().normalize_all(&data);
        assert_eq!(batch.observations.len(), 1);

        let station = batch.counts[&Source::GroundStation];
        assert_eq!(station.rows_read, 5);
        assert_eq!(station.rows_skipped, 4);
        assert_eq!(station.observations, 1);
    }
}
