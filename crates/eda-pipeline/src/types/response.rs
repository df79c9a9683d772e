//! Result payloads and the status view returned to pollers

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Terminal outcome stored for a job.
///
/// Errors are data: `{"error": "..."}` is just another completed result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultPayload {
    Failure { error: String },
    Success(serde_json::Value),
}

impl ResultPayload {
    pub fn success(report: &AnalysisReport) -> Result<Self> {
        Ok(Self::Success(serde_json::to_value(report)?))
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failure { error } => Some(error),
            Self::Success(_) => None,
        }
    }
}

/// What a poller sees.
///
/// There is no "unknown" state: a job id that was never submitted reports
/// `running`, exactly like one still waiting in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatusView {
    Running,
    Completed { result: ResultPayload },
}

impl JobStatusView {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Output of the analysis pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub insights: Vec<String>,
    pub profile_html: String,
    pub visualizations: Visualizations,
    pub anomalies: AnomalyReport,
    #[serde(rename = "scaledown")]
    pub compression_summary: CompressionSummary,
    /// Present only when a target column was requested
    #[serde(rename = "automl")]
    pub model_recommendation: Option<ModelRecommendation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visualizations {
    pub histograms: Vec<Histogram>,
    /// `None` with fewer than two numeric columns
    pub heatmap: Option<CorrelationHeatmap>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub column: String,
    /// `counts.len() + 1` edges
    pub bin_edges: Vec<f64>,
    pub counts: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationHeatmap {
    pub columns: Vec<String>,
    /// Pearson coefficients; `None` where undefined (constant column)
    pub matrix: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnomalyReport {
    Checked {
        n_checked: usize,
        n_anomalies: usize,
        anomaly_indices: Vec<usize>,
    },
    Skipped {
        note: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionSummary {
    pub method: String,
    pub original_bytes: usize,
    pub compressed_bytes: usize,
    pub compression_ratio: f64,
    pub compressed_b64: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelRecommendation {
    Classification {
        task: String,
        model: String,
        score: f64,
    },
    Regression {
        task: String,
        model: String,
        r2: f64,
    },
    Unavailable {
        error: String,
    },
}
