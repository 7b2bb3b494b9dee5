use std::cmp::Ordering;
use tracing::debug;

use crate::models::Observation;

/// Total order used before dedup so the survivor never depends on input order.
fn observation_order(a: &Observation, b: &Observation) -> Ordering {
    a.timestamp_utc
        .cmp(&b.timestamp_utc)
        .then_with(|| a.location.cmp(&b.location))
        .then_with(|| a.parameter.cmp(&b.parameter))
        .then_with(|| a.source.cmp(&b.source))
        .then_with(|| a.value.total_cmp(&b.value))
        .then_with(|| a.unit.cmp(&b.unit))
        .then_with(|| a.quality.cmp(&b.quality))
}

fn same_key(a: &Observation, b: &Observation) -> bool {
    a.timestamp_utc == b.timestamp_utc
        && a.location == b.location
        && a.parameter == b.parameter
        && a.source == b.source
}

/// Keeps one observation per (timestamp_utc, location, parameter, source).
#[derive(Debug, Default)]
pub struct Deduplicator;

impl Deduplicator {
    pub fn new() -> Self {
        Self
    }

    /// Sort ascending by timestamp (then by the rest of the row) and keep the
    /// first observation of each key. Returns the survivors and the number removed.
    pub fn deduplicate(&self, mut observations: Vec<Observation>) -> (Vec<Observation>, usize) {
        let before = observations.len();
        observations.sort_by(observation_order);
        observations.dedup_by(|later, earlier| same_key(earlier, later));

        let removed = before - observations.len();
        debug!("Deduplicated {} observations, removed {}", before, removed);
        (observations, removed)
    }
}
