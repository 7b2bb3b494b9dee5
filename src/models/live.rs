use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::error::{ProcessingError, Result};
use crate::models::{HourlyRecord, Parameter, Slot, Source, WeatherField};
use crate::utils::text::read_text_file;
use crate::utils::time::{local_to_utc, parse_naive, parse_utc_offset};

/// A single current reading from the live feed, already in canonical units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveReading {
    pub time: String,

    #[serde(default)]
    pub tz: Option<String>,

    #[serde(default)]
    pub values: BTreeMap<String, Option<f64>>,
}

fn resolve_key(key: &str) -> Result<Parameter> {
    match key.trim().to_lowercase().as_str() {
        "t" => Ok(Parameter::Weather(WeatherField::Temperature)),
        "h" => Ok(Parameter::Weather(WeatherField::Humidity)),
        "p" => Ok(Parameter::Weather(WeatherField::Pressure)),
        "w" => Ok(Parameter::Weather(WeatherField::WindSpeed)),
        other => other.parse(),
    }
}

impl LiveReading {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_json(&read_text_file(path)?)
    }

    /// `tz` wins over `default_offset`; a `time` with its own offset wins over both.
    pub fn timestamp_utc(&self, default_offset: FixedOffset) -> Result<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(self.time.trim()) {
            return Ok(dt.with_timezone(&Utc));
        }

        let offset = match self.tz.as_deref() {
            Some(tz) if !tz.trim().is_empty() => parse_utc_offset(tz)?,
            _ => default_offset,
        };
        local_to_utc(parse_naive(&self.time)?, offset)
    }

    /// Recognized, domain-valid values. Unknown keys and nulls are skipped.
    pub fn parameters(&self) -> Vec<(Parameter, f64)> {
        let mut parameters = Vec::new();
        for (key, value) in &self.values {
            let Some(value) = value else {
                continue;
            };
            match resolve_key(key) {
                Ok(parameter) => {
                    if !value.is_finite() || (parameter.is_pollutant() && *value < 0.0) {
                        debug!("Skipping invalid live value {}={}", key, value);
                        continue;
                    }
                    parameters.push((parameter, *value));
                }
                Err(_) => debug!("Ignoring unrecognized live key '{}'", key),
            }
        }
        parameters.sort_by(|a, b| a.0.cmp(&b.0));
        parameters.dedup_by(|a, b| a.0 == b.0);
        parameters
    }

    /// Partial hourly record holding only the supplied fields. The
    /// completeness score is left for the writer to compute.
    pub fn to_record(&self, location: &str, default_offset: FixedOffset) -> Result<HourlyRecord> {
        let parameters = self.parameters();
        if parameters.is_empty() {
            return Err(ProcessingError::MissingData(format!(
                "Live reading at '{}' has no usable values",
                self.time
            )));
        }

        let mut record = HourlyRecord::new(self.timestamp_utc(default_offset)?, location);
        for (parameter, value) in parameters {
            *record.slot_mut(parameter) = Slot::new(value, Source::LiveFeed);
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Pollutant;
    use chrono::TimeZone;

    fn offset() -> FixedOffset {
        parse_utc_offset("+06:00").unwrap()
    }

    #[test]
    fn test_parse_live_reading() {
        let reading = LiveReading::from_json(
            r#"{"time": "2024-01-15 15:00:00", "tz": "+06:00",
                "values": {"pm25": 42.0, "t": -12.5, "h": 80.0, "w": 3.1, "aqi": 118, "dew": null}}"#,
        )
        .unwrap();

        assert_eq!(
            reading.timestamp_utc(offset()).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
        );

        let params = reading.parameters();
        assert_eq!(params.len(), 4);
        assert!(params.contains(&(Parameter::Weather(WeatherField::Temperature), -12.5)));
    }

    #[test]
    fn test_missing_tz_uses_default() {
        let reading =
            LiveReading::from_json(r#"{"time": "2024-01-15 15:20", "values": {"pm25": 5.0}}"#)
                .unwrap();
        assert_eq!(
            reading.timestamp_utc(offset()).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 15, 9, 20, 0).unwrap()
        );
    }

    #[test]
    fn test_to_record_populates_supplied_fields_only() {
        let reading = LiveReading::from_json(
            r#"{"time": "2024-01-15 15:20:00", "tz": "+06:00", "values": {"pm25": 42.0, "pm10": -3.0}}"#,
        )
        .unwrap();
        let record = reading.to_record("Astana", offset()).unwrap();

        assert_eq!(
            record.timestamp_utc,
            Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
        );
        assert_eq!(record.value(Parameter::Pollutant(Pollutant::Pm25)), Some(42.0));
        assert_eq!(record.pm25_source(), Some(Source::LiveFeed));
        assert_eq!(record.value(Parameter::Pollutant(Pollutant::Pm10)), None);
        assert!(!record.has_weather_data());
    }

    #[test]
    fn test_empty_reading_is_rejected() {
        let reading =
            LiveReading::from_json(r#"{"time": "2024-01-15 15:00:00", "values": {"aqi": 10}}"#)
                .unwrap();
        assert!(reading.to_record("Astana", offset()).is_err());
    }
}
