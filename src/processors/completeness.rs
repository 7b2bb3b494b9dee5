use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};
use crate::models::{HourlyRecord, Parameter, Pollutant, WeatherField};

/// Presence weights for the six priority fields. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletenessWeights {
    pub pm25: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub pressure: f64,
    pub pm10: f64,
}

impl Default for CompletenessWeights {
    fn default() -> Self {
        Self {
            pm25: 0.30,
            temperature: 0.20,
            humidity: 0.15,
            wind_speed: 0.15,
            pressure: 0.10,
            pm10: 0.10,
        }
    }
}

impl CompletenessWeights {
    pub fn entries(&self) -> [(Parameter, f64); 6] {
        [
            (Parameter::Pollutant(Pollutant::Pm25), self.pm25),
            (Parameter::Weather(WeatherField::Temperature), self.temperature),
            (Parameter::Weather(WeatherField::Humidity), self.humidity),
            (Parameter::Weather(WeatherField::WindSpeed), self.wind_speed),
            (Parameter::Weather(WeatherField::Pressure), self.pressure),
            (Parameter::Pollutant(Pollutant::Pm10), self.pm10),
        ]
    }

    pub fn check(&self) -> Result<()> {
        let entries = self.entries();
        if let Some((parameter, weight)) = entries
            .iter()
            .find(|(_, w)| !w.is_finite() || *w < 0.0 || *w > 1.0)
        {
            return Err(ProcessingError::Config(format!(
                "Completeness weight for {} must be within [0, 1], got {}",
                parameter, weight
            )));
        }

        let total: f64 = entries.iter().map(|(_, w)| w).sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(ProcessingError::Config(format!(
                "Completeness weights must sum to 1.0, got {:.4}",
                total
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletenessScorer {
    weights: CompletenessWeights,
}

impl CompletenessScorer {
    pub fn new(weights: CompletenessWeights) -> Self {
        Self { weights }
    }

    /// Weighted presence score in [0, 1], rounded to two decimals.
    pub fn score(&self, record: &HourlyRecord) -> f64 {
        let raw: f64 = self
            .weights
            .entries()
            .iter()
            .filter(|(parameter, _)| record.slot(*parameter).is_present())
            .map(|(_, weight)| weight)
            .sum();
        ((raw * 100.0).round() / 100.0).clamp(0.0, 1.0)
    }

    pub fn apply(&self, record: &mut HourlyRecord) {
        record.completeness_score = self.score(record);
    }

    pub fn apply_all(&self, records: &mut [HourlyRecord]) {
        for record in records.iter_mut() {
            self.apply(record);
        }
    }
}
