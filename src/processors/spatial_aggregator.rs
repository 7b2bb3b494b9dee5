use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::ProcessingError;
use crate::models::{Observation, Parameter, Source};
use crate::utils::coordinates::BoundingBox;

type GroupKey = (DateTime<Utc>, Parameter, Source);

#[derive(Debug, Default)]
pub struct AggregationOutcome {
    pub observations: Vec<Observation>,
    pub groups: usize,
    pub groups_dropped: usize,
    pub outside_region: usize,
}

/// Collapses gridded reanalysis observations to one value per
/// (timestamp, parameter) at the canonical location. Other sources pass through.
pub struct SpatialAggregator {
    location: String,
    latitude: f64,
    longitude: f64,
    region: BoundingBox,
}

impl SpatialAggregator {
    pub fn new(location: impl Into<String>, latitude: f64, longitude: f64, region: BoundingBox) -> Self {
        Self {
            location: location.into(),
            latitude,
            longitude,
            region,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.location.name.clone(),
            config.location.latitude,
            config.location.longitude,
            config.region,
        )
    }

    pub fn aggregate(&self, observations: Vec<Observation>) -> AggregationOutcome {
        let mut outcome = AggregationOutcome::default();
        let mut groups: BTreeMap<GroupKey, Vec<Observation>> = BTreeMap::new();

        for observation in observations {
            if observation.source != Source::Reanalysis {
                outcome.observations.push(observation);
                continue;
            }

            let inside = match (observation.latitude, observation.longitude) {
                (Some(lat), Some(lon)) => self.region.contains(lat, lon),
                _ => true,
            };
            if !inside {
                outcome.outside_region += 1;
                continue;
            }

            groups
                .entry((observation.timestamp_utc, observation.parameter, observation.source))
                .or_default()
                .push(observation);
        }

        outcome.groups = groups.len();
        for (key, members) in groups {
            match self.reduce_group(&key, members) {
                Ok(observation) => outcome.observations.push(observation),
                Err(e) => {
                    warn!("Dropping aggregation group: {}", e);
                    outcome.groups_dropped += 1;
                }
            }
        }

        debug!(
            "Aggregated {} reanalysis groups ({} dropped, {} points outside region)",
            outcome.groups, outcome.groups_dropped, outcome.outside_region
        );
        outcome
    }

    /// Arithmetic mean of one group. Unit and quality must be uniform.
    fn reduce_group(
        &self,
        key: &GroupKey,
        members: Vec<Observation>,
    ) -> std::result::Result<Observation, ProcessingError> {
        let Some(first) = members.first() else {
            return Err(ProcessingError::MissingData("empty aggregation group".to_string()));
        };

        let mixed_unit = members.iter().any(|m| m.unit != first.unit);
        let mixed_quality = members.iter().any(|m| m.quality != first.quality);
        if mixed_unit || mixed_quality {
            let mut units: Vec<String> = members
                .iter()
                .map(|m| format!("{}/{}", m.unit, m.quality.as_deref().unwrap_or("-")))
                .collect();
            units.sort();
            units.dedup();
            return Err(ProcessingError::UnitMismatch {
                group: format!("{} {} {}", key.0, key.1, key.2),
                units: units.join(", "),
            });
        }

        let mean = members.iter().map(|m| m.value).sum::<f64>() / members.len() as f64;

        let mut aggregated = Observation::new(
            key.0,
            self.location.clone(),
            Some(self.latitude),
            Some(self.longitude),
            key.1,
            mean,
            first.unit.clone(),
            key.2,
        );
        aggregated.quality = first.quality.clone();
        Ok(aggregated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Pollutant;
    use crate::utils::coordinates::grid_cell_key;
    use chrono::TimeZone;

    fn aggregator() -> SpatialAggregator {
        SpatialAggregator::new(
            "Astana",
            51.1694,
            71.4491,
            BoundingBox::new(52.5, 50.5, 70.0, 73.0).unwrap(),
        )
    }

    fn grid_obs(lat: f64, lon: f64, value: f64, unit: &str) -> Observation {
        Observation::new(
            Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
            grid_cell_key("Astana", lat, lon, None),
            Some(lat),
            Some(lon),
            Parameter::Pollutant(Pollutant::Pm25),
            value,
            unit,
            Source::Reanalysis,
        )
        .with_quality("reanalysis")
    }

    #[test]
    fn test_three_grid_points_average_to_canonical_location() {
        let input = vec![
            grid_obs(51.0, 71.0, 10.0, "µg/m³"),
            grid_obs(51.0, 71.75, 20.0, "µg/m³"),
            grid_obs(51.75, 71.0, 30.0, "µg/m³"),
        ];

        let outcome = aggregator().aggregate(input);
        assert_eq!(outcome.groups, 1);
        assert_eq!(outcome.observations.len(), 1);

        let aggregated = &outcome.observations[0];
        assert_eq!(aggregated.value, 20.0);
        assert_eq!(aggregated.location, "Astana");
        assert_eq!(aggregated.latitude, Some(51.1694));
        assert_eq!(aggregated.longitude, Some(71.4491));
        assert_eq!(aggregated.unit, "µg/m³");
        assert_eq!(aggregated.quality.as_deref(), Some("reanalysis"));
    }

    #[test]
    fn test_mixed_units_drop_the_group() {
        let input = vec![
            grid_obs(51.0, 71.0, 10.0, "µg/m³"),
            grid_obs(51.0, 71.75, 0.02, "mg/m³"),
        ];

        let outcome = aggregator().aggregate(input);
        assert_eq!(outcome.groups, 1);
        assert_eq!(outcome.groups_dropped, 1);
        assert!(outcome.observations.is_empty());
    }

    #[test]
    fn test_points_outside_region_are_excluded() {
        let input = vec![
            grid_obs(51.0, 71.0, 10.0, "µg/m³"),
            grid_obs(55.0, 71.0, 500.0, "µg/m³"),
        ];

        let outcome = aggregator().aggregate(input);
        assert_eq!(outcome.outside_region, 1);
        assert_eq!(outcome.observations[0].value, 10.0);
    }

    #[test]
    fn test_other_sources_pass_through() {
        let station = Observation::new(
            Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
            "Astana",
            Some(51.1694),
            Some(71.4491),
            Parameter::Pollutant(Pollutant::Pm25),
            42.0,
            "µg/m³",
            Source::GroundStation,
        );

        let outcome = aggregator().aggregate(vec![station.clone()]);
        assert_eq!(outcome.groups, 0);
        assert_eq!(outcome.observations, vec![station]);
    }
}
