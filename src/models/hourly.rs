use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::error::{ProcessingError, Result};
use crate::models::{Parameter, Pollutant, Source, WeatherField};
use crate::utils::time::truncate_to_hour;

/// Primary key of the unified table.
pub type HourlyKey = (DateTime<Utc>, String);

/// One nullable column together with the source that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Slot {
    pub value: Option<f64>,
    pub source: Option<Source>,
}

impl Slot {
    pub const EMPTY: Slot = Slot {
        value: None,
        source: None,
    };

    pub fn new(value: f64, source: Source) -> Self {
        Self {
            value: Some(value),
            source: Some(source),
        }
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    pub fn from_month(month: u32) -> Self {
        match month {
            12 | 1 | 2 => Season::Winter,
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            _ => Season::Autumn,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Season {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "winter" => Ok(Season::Winter),
            "spring" => Ok(Season::Spring),
            "summer" => Ok(Season::Summer),
            "autumn" => Ok(Season::Autumn),
            other => Err(ProcessingError::InvalidFormat(format!(
                "Unknown season: '{}'",
                other
            ))),
        }
    }
}

/// Calendar features derived from the hour timestamp (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalFeatures {
    pub hour: u32,
    /// 0 = Monday .. 6 = Sunday
    pub day_of_week: u32,
    pub day_of_month: u32,
    pub month: u32,
    pub season: Season,
    pub is_weekend: bool,
    pub is_heating_season: bool,
}

impl TemporalFeatures {
    pub fn from_timestamp(ts: DateTime<Utc>) -> Self {
        let month = ts.month();
        let day_of_week = ts.weekday().num_days_from_monday();

        Self {
            hour: ts.hour(),
            day_of_week,
            day_of_month: ts.day(),
            month,
            season: Season::from_month(month),
            is_weekend: day_of_week >= 5,
            is_heating_season: matches!(month, 10..=12 | 1..=4),
        }
    }
}

/// The unified, hour-bucketed, wide-format record for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct HourlyRecord {
    pub timestamp_utc: DateTime<Utc>,

    #[validate(length(min = 1))]
    pub location: String,

    pub pm25: Slot,
    pub pm10: Slot,
    pub no2: Slot,
    pub o3: Slot,
    pub so2: Slot,
    pub co: Slot,

    pub temperature: Slot,
    pub humidity: Slot,
    pub pressure: Slot,
    pub wind_speed: Slot,
    pub wind_direction: Slot,
    pub precipitation: Slot,
    pub cloud_cover: Slot,

    pub features: TemporalFeatures,

    #[validate(range(min = 0.0, max = 1.0))]
    pub completeness_score: f64,
}

impl HourlyRecord {
    /// Empty record for the hour containing `timestamp`.
    pub fn new(timestamp: DateTime<Utc>, location: impl Into<String>) -> Self {
        let hour = truncate_to_hour(timestamp);
        Self {
            timestamp_utc: hour,
            location: location.into(),
            pm25: Slot::EMPTY,
            pm10: Slot::EMPTY,
            no2: Slot::EMPTY,
            o3: Slot::EMPTY,
            so2: Slot::EMPTY,
            co: Slot::EMPTY,
            temperature: Slot::EMPTY,
            humidity: Slot::EMPTY,
            pressure: Slot::EMPTY,
            wind_speed: Slot::EMPTY,
            wind_direction: Slot::EMPTY,
            precipitation: Slot::EMPTY,
            cloud_cover: Slot::EMPTY,
            features: TemporalFeatures::from_timestamp(hour),
            completeness_score: 0.0,
        }
    }

    pub fn builder() -> HourlyRecordBuilder {
        HourlyRecordBuilder::new()
    }

    pub fn key(&self) -> HourlyKey {
        (self.timestamp_utc, self.location.clone())
    }

    pub fn slot(&self, parameter: Parameter) -> &Slot {
        match parameter {
            Parameter::Pollutant(Pollutant::Pm25) => &self.pm25,
            Parameter::Pollutant(Pollutant::Pm10) => &self.pm10,
            Parameter::Pollutant(Pollutant::No2) => &self.no2,
            Parameter::Pollutant(Pollutant::O3) => &self.o3,
            Parameter::Pollutant(Pollutant::So2) => &self.so2,
            Parameter::Pollutant(Pollutant::Co) => &self.co,
            Parameter::Weather(WeatherField::Temperature) => &self.temperature,
            Parameter::Weather(WeatherField::Humidity) => &self.humidity,
            Parameter::Weather(WeatherField::Pressure) => &self.pressure,
            Parameter::Weather(WeatherField::WindSpeed) => &self.wind_speed,
            Parameter::Weather(WeatherField::WindDirection) => &self.wind_direction,
            Parameter::Weather(WeatherField::Precipitation) => &self.precipitation,
            Parameter::Weather(WeatherField::CloudCover) => &self.cloud_cover,
        }
    }

    pub fn slot_mut(&mut self, parameter: Parameter) -> &mut Slot {
        match parameter {
            Parameter::Pollutant(Pollutant::Pm25) => &mut self.pm25,
            Parameter::Pollutant(Pollutant::Pm10) => &mut self.pm10,
            Parameter::Pollutant(Pollutant::No2) => &mut self.no2,
            Parameter::Pollutant(Pollutant::O3) => &mut self.o3,
            Parameter::Pollutant(Pollutant::So2) => &mut self.so2,
            Parameter::Pollutant(Pollutant::Co) => &mut self.co,
            Parameter::Weather(WeatherField::Temperature) => &mut self.temperature,
            Parameter::Weather(WeatherField::Humidity) => &mut self.humidity,
            Parameter::Weather(WeatherField::Pressure) => &mut self.pressure,
            Parameter::Weather(WeatherField::WindSpeed) => &mut self.wind_speed,
            Parameter::Weather(WeatherField::WindDirection) => &mut self.wind_direction,
            Parameter::Weather(WeatherField::Precipitation) => &mut self.precipitation,
            Parameter::Weather(WeatherField::CloudCover) => &mut self.cloud_cover,
        }
    }

    pub fn value(&self, parameter: Parameter) -> Option<f64> {
        self.slot(parameter).value
    }

    /// Source that populated the primary pollutant slot.
    pub fn pm25_source(&self) -> Option<Source> {
        self.pm25.source
    }

    /// Source of the weather block, taken from the first populated weather slot.
    pub fn weather_source(&self) -> Option<Source> {
        WeatherField::ALL
            .iter()
            .find_map(|field| self.slot(Parameter::Weather(*field)).source)
    }

    pub fn has_pollutant_data(&self) -> bool {
        Pollutant::ALL
            .iter()
            .any(|p| self.slot(Parameter::Pollutant(*p)).is_present())
    }

    pub fn has_weather_data(&self) -> bool {
        WeatherField::ALL
            .iter()
            .any(|w| self.slot(Parameter::Weather(*w)).is_present())
    }

    pub fn populated_parameters(&self) -> Vec<Parameter> {
        Parameter::all()
            .filter(|p| self.slot(*p).is_present())
            .collect()
    }
}

pub struct HourlyRecordBuilder {
    timestamp: Option<DateTime<Utc>>,
    location: Option<String>,
    values: Vec<(Parameter, f64, Source)>,
}

impl Default for HourlyRecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HourlyRecordBuilder {
    pub fn new() -> Self {
        Self {
            timestamp: None,
            location: None,
            values: Vec::new(),
        }
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn value(mut self, parameter: Parameter, value: f64, source: Source) -> Self {
        self.values.push((parameter, value, source));
        self
    }

    /// Builds the record without a completeness score; callers score it.
    pub fn build(self) -> Result<HourlyRecord> {
        let timestamp = self
            .timestamp
            .ok_or_else(|| ProcessingError::MissingData("timestamp".to_string()))?;
        let location = self
            .location
            .ok_or_else(|| ProcessingError::MissingData("location".to_string()))?;

        let mut record = HourlyRecord::new(timestamp, location);
        for (parameter, value, source) in self.values {
            *record.slot_mut(parameter) = Slot::new(value, source);
        }

        record.validate()?;
        Ok(record)
    }
}
