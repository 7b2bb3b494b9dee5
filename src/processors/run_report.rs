use serde::Serialize;
use std::collections::BTreeMap;

use crate::models::{HourlyRecord, Source};

/// Per-source read and rejection counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub files_read: usize,
    pub files_skipped: usize,
    pub rows_read: usize,
    pub rows_skipped: usize,
    /// Null or out-of-domain values dropped from otherwise readable rows.
    pub values_dropped: usize,
    pub observations: usize,
}

impl SourceCounts {
    pub fn merge(&mut self, other: &SourceCounts) {
        self.files_read += other.files_read;
        self.files_skipped += other.files_skipped;
        self.rows_read += other.rows_read;
        self.rows_skipped += other.rows_skipped;
        self.values_dropped += other.values_dropped;
        self.observations += other.observations;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompletenessDistribution {
    pub excellent: usize,
    pub good: usize,
    pub fair: usize,
    pub poor: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl CompletenessDistribution {
    /// Buckets: excellent >= 0.8, good >= 0.6, fair >= 0.4, poor below.
    pub fn from_records(records: &[HourlyRecord]) -> Self {
        let mut scores: Vec<f64> = records.iter().map(|r| r.completeness_score).collect();
        if scores.is_empty() {
            return Self::default();
        }
        scores.sort_by(|a, b| a.total_cmp(b));

        let mut distribution = Self::default();
        for score in &scores {
            match *score {
                s if s >= 0.8 => distribution.excellent += 1,
                s if s >= 0.6 => distribution.good += 1,
                s if s >= 0.4 => distribution.fair += 1,
                _ => distribution.poor += 1,
            }
        }

        let n = scores.len();
        distribution.mean = Some(scores.iter().sum::<f64>() / n as f64);
        distribution.median = Some(if n % 2 == 0 {
            (scores[n / 2 - 1] + scores[n / 2]) / 2.0
        } else {
            scores[n / 2]
        });
        distribution.min = scores.first().copied();
        distribution.max = scores.last().copied();
        distribution
    }

    pub fn total(&self) -> usize {
        self.excellent + self.good + self.fair + self.poor
    }
}

/// Totals for one processing run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub sources: BTreeMap<Source, SourceCounts>,
    pub observations_before_dedup: usize,
    pub observations_after_dedup: usize,
    pub aggregation_groups: usize,
    pub aggregation_groups_dropped: usize,
    pub grid_points_outside_region: usize,
    pub hourly_records: usize,
    pub records_written: usize,
    pub completeness: CompletenessDistribution,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_source(&mut self, source: Source, counts: &SourceCounts) {
        self.sources.entry(source).or_default().merge(counts);
    }

    pub fn duplicates_removed(&self) -> usize {
        self.observations_before_dedup
            .saturating_sub(self.observations_after_dedup)
    }

    pub fn total_rows_read(&self) -> usize {
        self.sources.values().map(|c| c.rows_read).sum()
    }

    pub fn total_rows_skipped(&self) -> usize {
        self.sources.values().map(|c| c.rows_skipped).sum()
    }

    pub fn summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str("=== Processing Report ===\n");
        summary.push_str(&format!("Rows Read: {}\n", self.total_rows_read()));
        summary.push_str(&format!("Rows Skipped: {}\n", self.total_rows_skipped()));
        for (source, counts) in &self.sources {
            summary.push_str(&format!(
                "  {:<16} files {:>4} (+{} skipped), rows {:>8}, skipped {:>6}, null values {:>6}, observations {:>8}\n",
                source.as_str(),
                counts.files_read,
                counts.files_skipped,
                counts.rows_read,
                counts.rows_skipped,
                counts.values_dropped,
                counts.observations
            ));
        }

        summary.push_str(&format!(
            "\nObservations: {} -> {} after dedup ({} duplicates removed)\n",
            self.observations_before_dedup,
            self.observations_after_dedup,
            self.duplicates_removed()
        ));
        summary.push_str(&format!(
            "Reanalysis Groups: {} formed, {} dropped, {} grid points outside region\n",
            self.aggregation_groups, self.aggregation_groups_dropped, self.grid_points_outside_region
        ));
        summary.push_str(&format!("Hourly Records: {}\n", self.hourly_records));
        summary.push_str(&format!("Records Written: {}\n", self.records_written));

        let c = &self.completeness;
        let total = c.total().max(1) as f64;
        summary.push_str("\nCompleteness:\n");
        for (label, count) in [
            ("Excellent (>=0.8)", c.excellent),
            ("Good (0.6-0.8)", c.good),
            ("Fair (0.4-0.6)", c.fair),
            ("Poor (<0.4)", c.poor),
        ] {
            summary.push_str(&format!(
                "  {:<18} {:>8} ({:.1}%)\n",
                label,
                count,
                100.0 * count as f64 / total
            ));
        }
        if let (Some(mean), Some(median), Some(min), Some(max)) = (c.mean, c.median, c.min, c.max) {
            summary.push_str(&format!(
                "  mean {:.2}, median {:.2}, min {:.2}, max {:.2}\n",
                mean, median, min, max
            ));
        }

        summary
    }
}
