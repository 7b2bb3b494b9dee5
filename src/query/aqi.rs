use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ProcessingError, Result};

/// One breakpoint row: concentrations in `[conc_lo, conc_hi]` map linearly onto
/// `[index_lo, index_hi]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AqiBand {
    pub conc_lo: f64,
    pub conc_hi: f64,
    pub index_lo: f64,
    pub index_hi: f64,
}

impl AqiBand {
    pub const fn new(conc_lo: f64, conc_hi: f64, index_lo: f64, index_hi: f64) -> Self {
        Self {
            conc_lo,
            conc_hi,
            index_lo,
            index_hi,
        }
    }

    fn interpolate(&self, value: f64) -> f64 {
        let raw = (self.index_hi - self.index_lo) / (self.conc_hi - self.conc_lo)
            * (value - self.conc_lo)
            + self.index_lo;
        raw.clamp(self.index_lo, self.index_hi)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    pub const ALL: [AqiCategory; 6] = [
        AqiCategory::Good,
        AqiCategory::Moderate,
        AqiCategory::UnhealthyForSensitiveGroups,
        AqiCategory::Unhealthy,
        AqiCategory::VeryUnhealthy,
        AqiCategory::Hazardous,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AqiCategory::Good => "good",
            AqiCategory::Moderate => "moderate",
            AqiCategory::UnhealthyForSensitiveGroups => "unhealthy-for-sensitive-groups",
            AqiCategory::Unhealthy => "unhealthy",
            AqiCategory::VeryUnhealthy => "very-unhealthy",
            AqiCategory::Hazardous => "hazardous",
        }
    }

    fn from_band(position: usize) -> Self {
        Self::ALL[position.min(Self::ALL.len() - 1)]
    }
}

impl fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Aqi {
    pub index: u32,
    pub category: AqiCategory,
}

/// Piecewise-linear PM2.5 breakpoint table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AqiTable {
    pub bands: Vec<AqiBand>,
}

impl Default for AqiTable {
    fn default() -> Self {
        Self {
            bands: vec![
                AqiBand::new(0.0, 12.0, 0.0, 50.0),
                AqiBand::new(12.1, 35.4, 51.0, 100.0),
                AqiBand::new(35.5, 55.4, 101.0, 150.0),
                AqiBand::new(55.5, 150.4, 151.0, 200.0),
                AqiBand::new(150.5, 250.4, 201.0, 300.0),
                AqiBand::new(250.5, 500.4, 301.0, 500.0),
            ],
        }
    }
}

impl AqiTable {
    pub fn check(&self) -> Result<()> {
        if self.bands.len() != AqiCategory::ALL.len() {
            return Err(ProcessingError::Config(format!(
                "AQI table needs {} bands, got {}",
                AqiCategory::ALL.len(),
                self.bands.len()
            )));
        }

        for (i, band) in self.bands.iter().enumerate() {
            if !(band.conc_lo < band.conc_hi && band.index_lo <= band.index_hi) {
                return Err(ProcessingError::Config(format!(
                    "AQI band {} is not increasing: {:?}",
                    i + 1,
                    band
                )));
            }
            if i > 0 {
                let prev = &self.bands[i - 1];
                if band.conc_lo < prev.conc_hi || band.index_lo < prev.index_hi {
                    return Err(ProcessingError::Config(format!(
                        "AQI band {} overlaps the band below it",
                        i + 1
                    )));
                }
            }
        }
        Ok(())
    }

    /// Index and category for a concentration. Values between two bands use
    /// the upper band; values above the table clamp to its top index.
    pub fn compute(&self, value: f64) -> Option<Aqi> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let top = self.bands.last()?;

        let (position, index) = match self.bands.iter().position(|b| value <= b.conc_hi) {
            Some(position) => (position, self.bands[position].interpolate(value)),
            None => (self.bands.len() - 1, top.index_hi),
        };

        Some(Aqi {
            index: index.round() as u32,
            category: AqiCategory::from_band(position),
        })
    }

    pub fn category(&self, value: f64) -> Option<AqiCategory> {
        self.compute(value).map(|aqi| aqi.category)
    }
}
