//! Job pipeline server binary: submission, status and embedded workers
//!
//! Run with: cargo run -p eda-pipeline --bin eda-server -- --config eda.toml

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use eda_pipeline::{
    init_tracing, server::EdaServer, AnalysisPipeline, Backend, PipelineConfig, WorkerPool,
};

#[derive(Debug, Parser)]
#[command(name = "eda-server", version, about = "Dataset analysis job server")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "EDA_CONFIG")]
    config: Option<PathBuf>,

    /// Accept submissions only; leave processing to eda-worker processes
    #[arg(long)]
    no_workers: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    let mut config = PipelineConfig::load(args.config.as_deref())?;
    if args.no_workers {
        config.worker.embedded = false;
    }

    tracing::info!("Configuration loaded");
    tracing::info!("  - Data directory: {}", config.storage.data_dir.display());
    tracing::info!("  - Job timeout: {}s", config.queue.job_timeout_secs);
    tracing::info!("  - Max attempts: {}", config.queue.max_attempts);
    match config.storage.result_ttl_secs {
        Some(ttl) => tracing::info!("  - Result retention: {}s", ttl),
        None => tracing::info!("  - Result retention: unlimited"),
    }

    let backend = Backend::open(&config)?;

    let pool = if config.worker.embedded {
        Some(WorkerPool::spawn(
            &backend,
            Arc::new(AnalysisPipeline::new(config.analysis.clone())),
            &config,
        ))
    } else {
        tracing::info!("Embedded workers disabled; run eda-worker to process jobs");
        None
    };

    let server = EdaServer::new(config, backend);

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("\nEndpoints:");
    println!("  POST /create-job          - Upload a dataset");
    println!("  GET  /job-status/:job_id  - Poll a job");
    println!("  GET  /api/queue/stats     - Queue counts");
    println!("\nPress Ctrl+C to stop\n");

    server.start(shutdown_signal()).await?;

    if let Some(pool) = pool {
        tracing::info!("Waiting for in-flight jobs to finish...");
        pool.shutdown().await;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
