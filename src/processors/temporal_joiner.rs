use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use crate::models::{HourlyKey, HourlyRecord, Observation, Parameter, Slot, Source};
use crate::processors::reconciler::SourcePriority;
use crate::utils::time::truncate_to_hour;

#[derive(Debug, Default)]
struct HourlyMean {
    sum: f64,
    count: usize,
    sources: Vec<Source>,
}

impl HourlyMean {
    fn add(&mut self, value: f64, source: Source) {
        self.sum += value;
        self.count += 1;
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
    }
}

type Pivot = BTreeMap<HourlyKey, HourlyRecord>;

/// Buckets observations into hours, pivots them wide and outer-joins the
/// pollutant block with the weather block on (hour, location).
pub struct TemporalJoiner {
    priority: SourcePriority,
}

impl TemporalJoiner {
    pub fn new(priority: SourcePriority) -> Self {
        Self { priority }
    }

    /// Records come back sorted by hour, then location. Scores are left at zero.
    pub fn join(&self, observations: &[Observation]) -> Vec<HourlyRecord> {
        let means = self.hourly_means(observations);

        let mut pollutants = Pivot::new();
        let mut weather = Pivot::new();
        for ((hour, location, parameter), mean) in means {
            let target = if parameter.is_pollutant() {
                &mut pollutants
            } else {
                &mut weather
            };
            let record = target
                .entry((hour, location.clone()))
                .or_insert_with(|| HourlyRecord::new(hour, location));
            *record.slot_mut(parameter) = Slot {
                value: Some(mean.sum / mean.count as f64),
                source: self.provenance(&mean.sources),
            };
        }

        debug!(
            "Pivoted {} pollutant hours and {} weather hours",
            pollutants.len(),
            weather.len()
        );
        full_outer_join(pollutants, weather)
    }

    fn hourly_means(
        &self,
        observations: &[Observation],
    ) -> BTreeMap<(DateTime<Utc>, String, Parameter), HourlyMean> {
        let mut means: BTreeMap<(DateTime<Utc>, String, Parameter), HourlyMean> = BTreeMap::new();
        for observation in observations {
            means
                .entry((
                    truncate_to_hour(observation.timestamp_utc),
                    observation.location.clone(),
                    observation.parameter,
                ))
                .or_default()
                .add(observation.value, observation.source);
        }
        means
    }

    /// Highest-priority contributor; equal ranks resolve to the later `Source` variant.
    fn provenance(&self, sources: &[Source]) -> Option<Source> {
        sources
            .iter()
            .copied()
            .max_by_key(|s| (self.priority.rank(*s), *s))
    }
}

impl Default for TemporalJoiner {
    fn default() -> Self {
        Self::new(SourcePriority::default())
    }
}

/// A key present on either side yields one record; the absent side stays null.
fn full_outer_join(mut pollutants: Pivot, weather: Pivot) -> Vec<HourlyRecord> {
    for (key, weather_record) in weather {
        match pollutants.get_mut(&key) {
            Some(record) => {
                for parameter in weather_record.populated_parameters() {
                    *record.slot_mut(parameter) = *weather_record.slot(parameter);
                }
            }
            None => {
                pollutants.insert(key, weather_record);
            }
        }
    }
    pollutants.into_values().collect()
}
