//! Standalone worker binary
//!
//! Shares the job database and artifact directory with eda-server, so any
//! number of these can run next to it on the same host.
//!
//! Run with: cargo run -p eda-pipeline --bin eda-worker -- --workers 4

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use eda_pipeline::{init_tracing, AnalysisPipeline, Backend, PipelineConfig, WorkerPool};

#[derive(Debug, Parser)]
#[command(name = "eda-worker", version, about = "Dataset analysis job worker")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "EDA_CONFIG")]
    config: Option<PathBuf>,

    /// Number of consume loops (overrides the configuration)
    #[arg(short, long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    let mut config = PipelineConfig::load(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config.worker.workers = Some(workers);
    }

    let backend = Backend::open(&config)?;
    let stats = backend.queue.stats().await?;
    tracing::info!(
        "Queue at startup: {} queued, {} running, {} done, {} dead",
        stats.queued,
        stats.running,
        stats.done,
        stats.dead
    );

    let pool = WorkerPool::spawn(
        &backend,
        Arc::new(AnalysisPipeline::new(config.analysis.clone())),
        &config,
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, finishing in-flight jobs...");
    pool.shutdown().await;

    Ok(())
}
