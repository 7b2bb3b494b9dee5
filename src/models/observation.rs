use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::error::{ProcessingError, Result};

/// Origin of an observation. Ordering is only used for deterministic sorting;
/// overwrite precedence lives in `SourcePriority`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    GroundStation,
    Reanalysis,
    WeatherArchive,
    LiveFeed,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::GroundStation,
        Source::Reanalysis,
        Source::WeatherArchive,
        Source::LiveFeed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::GroundStation => "ground-station",
            Source::Reanalysis => "reanalysis",
            Source::WeatherArchive => "weather-archive",
            Source::LiveFeed => "live-feed",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ground-station" | "openaq" => Ok(Source::GroundStation),
            "reanalysis" | "cams" => Ok(Source::Reanalysis),
            "weather-archive" | "open-meteo" => Ok(Source::WeatherArchive),
            "live-feed" | "aqicn" => Ok(Source::LiveFeed),
            other => Err(ProcessingError::InvalidFormat(format!(
                "Unknown source: '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pollutant {
    Pm25,
    Pm10,
    No2,
    O3,
    So2,
    Co,
}

impl Pollutant {
    pub const ALL: [Pollutant; 6] = [
        Pollutant::Pm25,
        Pollutant::Pm10,
        Pollutant::No2,
        Pollutant::O3,
        Pollutant::So2,
        Pollutant::Co,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "pm25",
            Pollutant::Pm10 => "pm10",
            Pollutant::No2 => "no2",
            Pollutant::O3 => "o3",
            Pollutant::So2 => "so2",
            Pollutant::Co => "co",
        }
    }

    /// Canonical unit. Carbon monoxide is reported in mg/m³, everything else in µg/m³.
    pub fn canonical_unit(&self) -> &'static str {
        match self {
            Pollutant::Co => "mg/m³",
            _ => "µg/m³",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherField {
    Temperature,
    Humidity,
    Pressure,
    WindSpeed,
    WindDirection,
    Precipitation,
    CloudCover,
}

impl WeatherField {
    pub const ALL: [WeatherField; 7] = [
        WeatherField::Temperature,
        WeatherField::Humidity,
        WeatherField::Pressure,
        WeatherField::WindSpeed,
        WeatherField::WindDirection,
        WeatherField::Precipitation,
        WeatherField::CloudCover,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherField::Temperature => "temperature",
            WeatherField::Humidity => "humidity",
            WeatherField::Pressure => "pressure",
            WeatherField::WindSpeed => "wind_speed",
            WeatherField::WindDirection => "wind_direction",
            WeatherField::Precipitation => "precipitation",
            WeatherField::CloudCover => "cloud_cover",
        }
    }

    pub fn canonical_unit(&self) -> &'static str {
        match self {
            WeatherField::Temperature => "°C",
            WeatherField::Humidity => "%",
            WeatherField::Pressure => "hPa",
            WeatherField::WindSpeed => "m/s",
            WeatherField::WindDirection => "°",
            WeatherField::Precipitation => "mm",
            WeatherField::CloudCover => "%",
        }
    }
}

/// A measurable quantity: either a pollutant concentration or a weather field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Parameter {
    Pollutant(Pollutant),
    Weather(WeatherField),
}

impl Parameter {
    pub fn all() -> impl Iterator<Item = Parameter> {
        Pollutant::ALL
            .into_iter()
            .map(Parameter::Pollutant)
            .chain(WeatherField::ALL.into_iter().map(Parameter::Weather))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Parameter::Pollutant(p) => p.as_str(),
            Parameter::Weather(w) => w.as_str(),
        }
    }

    pub fn canonical_unit(&self) -> &'static str {
        match self {
            Parameter::Pollutant(p) => p.canonical_unit(),
            Parameter::Weather(w) => w.canonical_unit(),
        }
    }

    pub fn is_pollutant(&self) -> bool {
        matches!(self, Parameter::Pollutant(_))
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Parameter {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_lowercase();
        let parameter = match name.as_str() {
            "pm25" | "pm2.5" | "pm2_5" => Parameter::Pollutant(Pollutant::Pm25),
            "pm10" => Parameter::Pollutant(Pollutant::Pm10),
            "no2" => Parameter::Pollutant(Pollutant::No2),
            "o3" => Parameter::Pollutant(Pollutant::O3),
            "so2" => Parameter::Pollutant(Pollutant::So2),
            "co" => Parameter::Pollutant(Pollutant::Co),
            "temperature" => Parameter::Weather(WeatherField::Temperature),
            "humidity" => Parameter::Weather(WeatherField::Humidity),
            "pressure" => Parameter::Weather(WeatherField::Pressure),
            "wind_speed" => Parameter::Weather(WeatherField::WindSpeed),
            "wind_direction" => Parameter::Weather(WeatherField::WindDirection),
            "precipitation" => Parameter::Weather(WeatherField::Precipitation),
            "cloud_cover" => Parameter::Weather(WeatherField::CloudCover),
            _ => return Err(ProcessingError::UnknownParameter(s.to_string())),
        };
        Ok(parameter)
    }
}

/// One normalized single-parameter measurement from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Observation {
    pub timestamp_utc: DateTime<Utc>,
    pub location: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,

    pub parameter: Parameter,
    pub value: f64,
    pub unit: String,
    pub source: Source,
    pub quality: Option<String>,
}

impl Observation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp_utc: DateTime<Utc>,
        location: impl Into<String>,
        latitude: Option<f64>,
        longitude: Option<f64>,
        parameter: Parameter,
        value: f64,
        unit: impl Into<String>,
        source: Source,
    ) -> Self {
        Self {
            timestamp_utc,
            location: location.into(),
            latitude,
            longitude,
            parameter,
            value,
            unit: unit.into(),
            source,
            quality: None,
        }
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = Some(quality.into());
        self
    }

    /// Pollutant concentrations must be non-negative; weather fields may be negative.
    pub fn is_domain_valid(&self) -> bool {
        self.value.is_finite() && (!self.parameter.is_pollutant() || self.value >= 0.0)
    }
}
