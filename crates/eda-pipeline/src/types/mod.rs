//! Core types for jobs, datasets and results

pub mod dataset;
pub mod job;
pub mod response;

pub use dataset::{Cell, Column, ColumnBuilder, ColumnData, ColumnKind, Dataset};
pub use job::{artifact_key, ArtifactRef, JobDescriptor, SubmitRequest};
pub use response::{
    AnalysisReport, AnomalyReport, CompressionSummary, CorrelationHeatmap, Histogram,
    JobStatusView, ModelRecommendation, ResultPayload, Visualizations,
};
