//! Worker pool and lease reaper

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::analysis::PipelineRunner;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::storage::{ArtifactStore, DeadLetter, ResultStore};
use crate::types::ResultPayload;

use super::backend::Backend;
use super::job_queue::JobQueue;
use super::worker::Worker;

/// Summary of one reaper pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReapSummary {
    pub requeued: usize,
    pub dead_lettered: usize,
    /// Dead letters left for the next pass after a store failure
    pub deferred: usize,
    pub results_purged: usize,
    pub entries_purged: usize,
}

/// Returns expired deliveries to the queue and settles dead letters.
///
/// A dead-lettered job gets an error result (unless one is already stored)
/// and its artifact is released before its queue entry is marked dead, so
/// pollers never wait on it forever.
pub struct Reaper {
    queue: Arc<JobQueue>,
    artifacts: Arc<dyn ArtifactStore>,
    results: Arc<dyn ResultStore>,
    result_ttl: Option<Duration>,
}

impl Reaper {
    pub fn new(backend: &Backend, result_ttl: Option<Duration>) -> Self {
        Self {
            queue: backend.queue.clone(),
            artifacts: backend.artifacts.clone(),
            results: backend.results.clone(),
            result_ttl,
        }
    }

    pub async fn run_once(&self) -> Result<ReapSummary> {
        let outcome = self.queue.reap_expired().await?;
        let mut summary = ReapSummary {
            requeued: outcome.requeued,
            ..Default::default()
        };

        for letter in &outcome.dead {
            match self.settle(letter).await {
                Ok(()) => summary.dead_lettered += 1,
                Err(e) => {
                    tracing::error!(
                        "Failed to settle dead letter {}, retrying next pass: {}",
                        letter.descriptor.id,
                        e
                    );
                    summary.deferred += 1;
                }
            }
        }

        if let Some(ttl) = self.result_ttl {
            summary.results_purged = self.results.purge_older_than(ttl).await?;
            summary.entries_purged = self.queue.purge_settled(ttl).await?;
        }

        if summary.requeued > 0
            || summary.dead_lettered > 0
            || summary.deferred > 0
            || summary.results_purged > 0
            || summary.entries_purged > 0
        {
            tracing::info!(
                "Reaper: {} requeued, {} dead-lettered, {} deferred, {} results and {} entries purged",
                summary.requeued,
                summary.dead_lettered,
                summary.deferred,
                summary.results_purged,
                summary.entries_purged
            );
        }

        Ok(summary)
    }

    async fn settle(&self, letter: &DeadLetter) -> Result<()> {
        let descriptor = &letter.descriptor;

        if self.results.get(descriptor.id).await?.is_none() {
            let payload = ResultPayload::failure(format!(
                "job exceeded its execution budget after {} attempts",
                letter.expired_count
            ));
            self.results.put(descriptor.id, &payload).await?;
        }
        self.artifacts.delete(&descriptor.artifact).await?;

        if self.queue.bury(letter).await? {
            tracing::error!(
                "Job {} dead-lettered after {} expired leases",
                descriptor.id,
                letter.expired_count
            );
        } else {
            tracing::warn!("Dead letter {} was taken over by another pass", descriptor.id);
        }
        Ok(())
    }

    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        tracing::error!("Reaper pass failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

/// Running workers plus the reaper
pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    worker_count: usize,
}

impl WorkerPool {
    /// Spawn `worker.workers` consume loops and one reaper on the current runtime
    pub fn spawn(
        backend: &Backend,
        runner: Arc<dyn PipelineRunner>,
        config: &PipelineConfig,
    ) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let worker_count = config.worker.worker_count().max(1);
        let mut handles = Vec::with_capacity(worker_count + 1);

        let process_tag = std::process::id();
        for i in 0..worker_count {
            let worker = Worker::new(
                format!("worker-{}-{}", process_tag, i),
                backend,
                runner.clone(),
                &config.worker,
            );
            handles.push(tokio::spawn(worker.run(rx.clone())));
        }

        let reaper = Reaper::new(backend, config.storage.result_ttl());
        handles.push(tokio::spawn(
            reaper.run(config.queue.reaper_interval(), rx),
        ));

        tracing::info!(
            "Worker pool started: {} workers, runner '{}'",
            worker_count,
            runner.name()
        );

        Self {
            shutdown,
            handles,
            worker_count,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Signal shutdown and wait for in-flight jobs to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                tracing::error!("Worker task ended abnormally: {}", e);
            }
        }
        tracing::info!("Worker pool stopped");
    }
}
