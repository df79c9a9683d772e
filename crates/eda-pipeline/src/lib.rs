//! eda-pipeline: asynchronous dataset analysis jobs
//!
//! Callers upload a dataset and get a job id back immediately. The job sits
//! in a durable SQLite-backed queue until a worker claims it, loads the
//! dataset, runs the analysis pipeline and stores the outcome, success or
//! error, in the result store. Pollers read the result store by job id.

pub mod analysis;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod processing;
pub mod server;
pub mod storage;
pub mod types;

pub use analysis::{AnalysisPipeline, PipelineRunner};
pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use processing::{Backend, JobService, WorkerPool};
pub use types::{
    AnalysisReport, Dataset, JobDescriptor, JobStatusView, ResultPayload, SubmitRequest,
};

/// Install the default tracing subscriber used by the binaries
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eda_pipeline=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
