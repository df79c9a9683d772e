//! Dataset analysis: the runner seam used by workers and the built-in pipeline

mod anomalies;
mod automl;
mod compression;
mod insights;
mod profile;
pub mod stats;
mod visualization;

pub use anomalies::detect_anomalies;
pub use automl::{infer_task, recommend_model, TaskKind};
pub use compression::{compress_summary, schema_summary};
pub use insights::basic_insights;
pub use profile::profile_html;
pub use visualization::{correlation_heatmap, histogram, numeric_histograms};

use std::time::Instant;

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::types::{AnalysisReport, Dataset};

/// Turns a dataset into a report.
///
/// Runs on the blocking thread pool, so implementations may be CPU heavy.
/// A returned error (or a panic) becomes the job's error result.
pub trait PipelineRunner: Send + Sync {
    /// Analyze the dataset, adding a model recommendation when `target` is set
    fn run(&self, dataset: &Dataset, target: Option<&str>) -> Result<AnalysisReport>;

    /// Get runner name for logging
    fn name(&self) -> &str;
}

/// Default analysis stages
#[derive(Debug, Clone, Default)]
pub struct AnalysisPipeline {
    config: AnalysisConfig,
}

impl AnalysisPipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }
}

impl PipelineRunner for AnalysisPipeline {
    fn run(&self, dataset: &Dataset, target: Option<&str>) -> Result<AnalysisReport> {
        let start = Instant::now();

        let compression_summary = compress_summary(dataset)?;
        let profile_html = profile_html(dataset);
        let visualizations = visualization::visualizations(
            dataset,
            self.config.histogram_max_columns,
            self.config.histogram_bins,
            self.config.heatmap_top_k,
        );
        let insights = basic_insights(dataset);
        let anomalies = detect_anomalies(
            dataset,
            self.config.anomaly_max_samples,
            self.config.anomaly_threshold,
        );
        let model_recommendation = target.map(|target| recommend_model(dataset, target));

        tracing::debug!(
            "Analyzed {}x{} dataset in {:?}",
            dataset.n_rows(),
            dataset.n_cols(),
            start.elapsed()
        );

        Ok(AnalysisReport {
            insights,
            profile_html,
            visualizations,
            anomalies,
            compression_summary,
            model_recommendation,
        })
    }

    fn name(&self) -> &str {
        "eda"
    }
}
