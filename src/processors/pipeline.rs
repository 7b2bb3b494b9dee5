use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::models::{HourlyRecord, LiveReading, Observation};
use crate::processors::{
    CompletenessDistribution, CompletenessScorer, Deduplicator, Normalizer, RunReport,
    SpatialAggregator, TemporalJoiner, UpsertSummary, UpsertWriter,
};
use crate::readers::{ConcurrentReader, SourceData, SourceDirs};
use crate::storage::{HourlyStore, ObservationWriter};
use crate::utils::progress::ProgressReporter;

/// Result of running the transformation stages over one set of raw inputs.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub records: Vec<HourlyRecord>,
    /// Deduplicated and aggregated observations the records were built from.
    pub observations: Vec<Observation>,
    pub report: RunReport,
}

/// Read, normalize, deduplicate, aggregate, join and score.
pub struct Pipeline {
    config: PipelineConfig,
    max_workers: usize,
    audit_dir: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.check()?;
        Ok(Self {
            config,
            max_workers: num_cpus::get(),
            audit_dir: None,
        })
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    /// Directory that receives the per-source observation tables when
    /// `retain_observations` is enabled.
    pub fn with_audit_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.audit_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn scorer(&self) -> CompletenessScorer {
        CompletenessScorer::new(self.config.completeness)
    }

    pub async fn read(&self, dirs: &SourceDirs) -> Result<SourceData> {
        ConcurrentReader::new(self.max_workers).read_all(dirs).await
    }

    /// Pure transformation of already-read inputs. The same `data` always
    /// yields the same records.
    pub fn build_records(&self, data: &SourceData) -> Result<PipelineOutput> {
        let mut report = RunReport::new();

        let normalized = Normalizer::from_config(&self.config)?.normalize_all(data);
        for (source, counts) in &normalized.counts {
            report.record_source(*source, counts);
        }
        report.observations_before_dedup = normalized.observations.len();

        let (deduplicated, removed) = Deduplicator::new().deduplicate(normalized.observations);
        report.observations_after_dedup = deduplicated.len();
        debug!("Removed {} duplicate observations", removed);

        let aggregated = SpatialAggregator::from_config(&self.config).aggregate(deduplicated);
        report.aggregation_groups = aggregated.groups;
        report.aggregation_groups_dropped = aggregated.groups_dropped;
        report.grid_points_outside_region = aggregated.outside_region;

        let mut records = TemporalJoiner::new(self.config.source_priority).join(&aggregated.observations);
        self.scorer().apply_all(&mut records);

        report.hourly_records = records.len();
        report.completeness = CompletenessDistribution::from_records(&records);

        Ok(PipelineOutput {
            records,
            observations: aggregated.observations,
            report,
        })
    }

    pub async fn run(
        &self,
        dirs: &SourceDirs,
        progress: Option<&ProgressReporter>,
    ) -> Result<PipelineOutput> {
        if let Some(p) = progress {
            p.set_message("Reading source files...");
        }
        let data = self.read(dirs).await?;

        if let Some(p) = progress {
            p.set_message("Building hourly records...");
        }
        self.build_records(&data)
    }

    /// Full reprocessing: the store is replaced by the rebuilt table.
    pub async fn process<S: HourlyStore>(
        &self,
        dirs: &SourceDirs,
        store: &mut S,
        progress: Option<&ProgressReporter>,
    ) -> Result<RunReport> {
        let mut output = self.run(dirs, progress).await?;

        if let Some(p) = progress {
            p.set_message(&format!("Writing {} hourly records...", output.records.len()));
        }
        let mut writer = UpsertWriter::new(store, self.config.source_priority, self.scorer())
            .with_chunk_size(self.config.chunk_size);
        output.report.records_written = writer.write_full_batch(&output.records)?;

        self.retain(&output.observations)?;

        if let Some(p) = progress {
            p.finish_with_message(&format!(
                "Processed {} hourly records",
                output.report.records_written
            ));
        }
        info!(
            "Full reprocessing wrote {} records from {} rows",
            output.report.records_written,
            output.report.total_rows_read()
        );
        Ok(output.report)
    }

    /// Rebuild hours from reanalysis input alone and merge them field by field,
    /// so fields owned by higher-priority sources are left untouched.
    pub async fn reprocess_reanalysis<S: HourlyStore>(
        &self,
        reanalysis_dir: &Path,
        store: &mut S,
        progress: Option<&ProgressReporter>,
    ) -> Result<(RunReport, UpsertSummary)> {
        let dirs = SourceDirs::new().with_reanalysis(reanalysis_dir);
        let mut output = self.run(&dirs, progress).await?;

        if let Some(p) = progress {
            p.set_message(&format!("Merging {} reanalysis hours...", output.records.len()));
        }
        let mut writer = UpsertWriter::new(store, self.config.source_priority, self.scorer())
            .with_chunk_size(self.config.chunk_size);
        let summary = writer.upsert_many(output.records.clone())?;
        output.report.records_written = summary.inserted + summary.updated;

        self.retain(&output.observations)?;

        if let Some(p) = progress {
            p.finish_with_message("Reanalysis reprocessing complete");
        }
        info!(
            "Reanalysis reprocessing: {} inserted, {} updated, {} fields protected",
            summary.inserted, summary.updated, summary.fields.protected
        );
        Ok((output.report, summary))
    }

    /// Incremental upsert of a single live-feed reading.
    pub fn ingest_live<S: HourlyStore>(&self, reading: &LiveReading, store: &mut S) -> Result<UpsertSummary> {
        let record = reading.to_record(&self.config.location.name, self.config.utc_offset()?)?;
        debug!(
            "Live reading for {} carries {} fields",
            record.timestamp_utc,
            record.populated_parameters().len()
        );

        let mut writer = UpsertWriter::new(store, self.config.source_priority, self.scorer());
        writer.upsert_incremental(record)
    }

    fn retain(&self, observations: &[Observation]) -> Result<()> {
        if !self.config.retain_observations {
            return Ok(());
        }
        let Some(dir) = &self.audit_dir else {
            return Ok(());
        };

        let written = ObservationWriter::new(dir)
            .with_compression(&self.config.compression)?
            .write(observations)?;
        for (source, rows) in written {
            debug!("Retained {} {} observations", rows, source);
        }
        Ok(())
    }
}
