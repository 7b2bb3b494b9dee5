pub mod completeness;
pub mod deduplicator;
pub mod normalizer;
pub mod pipeline;
pub mod reconciler;
pub mod run_report;
pub mod spatial_aggregator;
pub mod temporal_joiner;

pub use completeness::{CompletenessScorer, CompletenessWeights};
pub use deduplicator::Deduplicator;
pub use normalizer::{NormalizedBatch, Normalizer, Rejection};
pub use pipeline::{Pipeline, PipelineOutput};
pub use reconciler::{
    merge_field, merge_record, FieldMergeOutcome, MergeStats, SourcePriority, UpsertSummary,
    UpsertWriter,
};
pub use run_report::{CompletenessDistribution, RunReport, SourceCounts};
pub use spatial_aggregator::{AggregationOutcome, SpatialAggregator};
pub use temporal_joiner::TemporalJoiner;
