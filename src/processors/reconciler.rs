use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{HourlyKey, HourlyRecord, Parameter, Slot, Source};
use crate::processors::completeness::CompletenessScorer;
use crate::storage::HourlyStore;

/// Rank per source; higher wins. Equal ranks overwrite each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcePriority {
    pub live_feed: u8,
    pub ground_station: u8,
    pub weather_archive: u8,
    pub reanalysis: u8,
}

impl Default for SourcePriority {
    fn default() -> Self {
        Self {
            live_feed: 2,
            ground_station: 2,
            weather_archive: 2,
            reanalysis: 1,
        }
    }
}

impl SourcePriority {
    pub fn rank(&self, source: Source) -> u8 {
        match source {
            Source::LiveFeed => self.live_feed,
            Source::GroundStation => self.ground_station,
            Source::WeatherArchive => self.weather_archive,
            Source::Reanalysis => self.reanalysis,
        }
    }

    /// Values without provenance rank below every source.
    fn rank_of(&self, source: Option<Source>) -> i16 {
        source.map(|s| self.rank(s) as i16).unwrap_or(-1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMergeOutcome {
    /// Existing value and provenance unchanged.
    Kept,
    /// Empty slot populated.
    Filled,
    /// Existing value replaced by an equal- or higher-priority source.
    Overwritten,
}

/// Per-field state machine: (existing, incoming, priority) -> new slot.
/// Zero is an ordinary value; only null and provenance drive the decision.
pub fn merge_field(existing: Slot, incoming: Slot, priority: &SourcePriority) -> (Slot, FieldMergeOutcome) {
    if incoming.value.is_none() {
        return (existing, FieldMergeOutcome::Kept);
    }
    if existing.value.is_none() {
        return (incoming, FieldMergeOutcome::Filled);
    }
    if priority.rank_of(existing.source) > priority.rank_of(incoming.source) {
        return (existing, FieldMergeOutcome::Kept);
    }
    (incoming, FieldMergeOutcome::Overwritten)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub kept: usize,
    pub filled: usize,
    pub overwritten: usize,
    /// Incoming values rejected because a higher-priority source owns the field.
    pub protected: usize,
}

impl MergeStats {
    pub fn add(&mut self, other: &MergeStats) {
        self.kept += other.kept;
        self.filled += other.filled;
        self.overwritten += other.overwritten;
        self.protected += other.protected;
    }
}

/// Merge every slot of `incoming` into `existing`. Key and temporal features
/// come from `existing`; the score must be recomputed by the caller.
pub fn merge_record(
    mut existing: HourlyRecord,
    incoming: &HourlyRecord,
    priority: &SourcePriority,
) -> (HourlyRecord, MergeStats) {
    let mut stats = MergeStats::default();
    for parameter in Parameter::all() {
        let incoming_slot = *incoming.slot(parameter);
        let (slot, outcome) = merge_field(*existing.slot(parameter), incoming_slot, priority);
        match outcome {
            FieldMergeOutcome::Kept => {
                stats.kept += 1;
                if incoming_slot.is_present() {
                    stats.protected += 1;
                    debug!(
                        "Keeping {} at {} owned by {:?} over {:?}",
                        parameter, existing.timestamp_utc, existing.slot(parameter).source, incoming_slot.source
                    );
                }
            }
            FieldMergeOutcome::Filled => stats.filled += 1,
            FieldMergeOutcome::Overwritten => stats.overwritten += 1,
        }
        *existing.slot_mut(parameter) = slot;
    }
    (existing, stats)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
    pub fields: MergeStats,
}

/// Writes hourly records into a store, either as a full rebuild or as
/// field-level merges governed by source priority.
pub struct UpsertWriter<'a, S: HourlyStore> {
    store: &'a mut S,
    priority: SourcePriority,
    scorer: CompletenessScorer,
    chunk_size: usize,
}

impl<'a, S: HourlyStore> UpsertWriter<'a, S> {
    pub fn new(store: &'a mut S, priority: SourcePriority, scorer: CompletenessScorer) -> Self {
        Self {
            store,
            priority,
            scorer,
            chunk_size: crate::utils::constants::DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Full rebuild: the table is replaced by `records` in bounded chunks.
    pub fn write_full_batch(&mut self, records: &[HourlyRecord]) -> Result<usize> {
        let written = self.store.replace_all(records, self.chunk_size)?;
        info!("Wrote {} hourly records in chunks of {}", written, self.chunk_size);
        Ok(written)
    }

    /// Merge one record into its hour. Absent hours are inserted with only the
    /// supplied fields and a score computed from them.
    pub fn upsert_incremental(&mut self, incoming: HourlyRecord) -> Result<UpsertSummary> {
        self.upsert_many(vec![incoming])
    }

    /// Incremental merge of several records. Records sharing an hour are
    /// merged in input order, each on top of the previous result.
    pub fn upsert_many(&mut self, incoming: Vec<HourlyRecord>) -> Result<UpsertSummary> {
        let mut summary = UpsertSummary::default();
        let mut pending: BTreeMap<HourlyKey, HourlyRecord> = BTreeMap::new();

        for record in incoming {
            let key = record.key();
            let existing = match pending.remove(&key) {
                Some(merged) => Some(merged),
                None => self.store.get(&key)?,
            };
            let merged = match existing {
                Some(existing) => {
                    let (merged, stats) = merge_record(existing, &record, &self.priority);
                    summary.updated += 1;
                    summary.fields.add(&stats);
                    merged
                }
                None => {
                    summary.inserted += 1;
                    summary.fields.filled += record.populated_parameters().len();
                    record
                }
            };
            let mut merged = merged;
            self.scorer.apply(&mut merged);
            pending.insert(key, merged);
        }

        let merged_records: Vec<HourlyRecord> = pending.into_values().collect();

        for chunk in merged_records.chunks(self.chunk_size) {
            self.store.put_batch(chunk)?;
        }

        debug!(
            "Upserted {} new and {} existing hours ({} fields protected)",
            summary.inserted, summary.updated, summary.fields.protected
        );
        Ok(summary)
    }
}
