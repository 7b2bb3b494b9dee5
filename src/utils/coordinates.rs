use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};

/// Rectangular lat/lon region. Edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub west: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn new(north: f64, south: f64, west: f64, east: f64) -> Result<Self> {
        let bbox = Self {
            north,
            south,
            west,
            east,
        };
        bbox.check()?;
        Ok(bbox)
    }

    pub fn check(&self) -> Result<()> {
        validate_coordinates(self.north, self.west)?;
        validate_coordinates(self.south, self.east)?;

        if self.south > self.north {
            return Err(ProcessingError::Config(format!(
                "Bounding box south edge {} is above north edge {}",
                self.south, self.north
            )));
        }
        if self.west > self.east {
            return Err(ProcessingError::Config(format!(
                "Bounding box west edge {} is east of east edge {}",
                self.west, self.east
            )));
        }
        Ok(())
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.south..=self.north).contains(&latitude) && (self.west..=self.east).contains(&longitude)
    }
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(ProcessingError::Config(format!(
            "Latitude {} is outside [-90, 90]",
            latitude
        )));
    }

    if !(-180.0..=180.0).contains(&longitude) {
        return Err(ProcessingError::Config(format!(
            "Longitude {} is outside [-180, 180]",
            longitude
        )));
    }

    Ok(())
}

/// Location key for one reanalysis grid cell before spatial aggregation.
/// Each pressure level is its own cell.
pub fn grid_cell_key(location: &str, latitude: f64, longitude: f64, pressure_level: Option<f64>) -> String {
    match pressure_level {
        Some(level) => format!("{}#{:.4},{:.4}@{}", location, latitude, longitude, level),
        None => format!("{}#{:.4},{:.4}", location, latitude, longitude),
    }
}
