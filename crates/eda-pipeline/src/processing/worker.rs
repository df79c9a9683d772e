//! Queue consumer: load, analyze, record, release

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::analysis::PipelineRunner;
use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::storage::{ArtifactStore, ResultStore};
use crate::types::{AnalysisReport, JobDescriptor, ResultPayload};

use super::backend::Backend;
use super::job_queue::{ClaimedJob, JobQueue};

/// What happened to one delivery
#[derive(Debug, Clone, PartialEq)]
pub enum HandleOutcome {
    /// Report stored
    Completed,
    /// Load or pipeline failure stored as an error result
    Failed(String),
    /// An earlier delivery already finished this job; its result stands
    Duplicate,
    /// The lease expired mid-run and the job was redelivered; outcome discarded
    LeaseLost,
}

/// A single consume loop. Workers share nothing but the backend clients.
pub struct Worker {
    id: String,
    queue: Arc<JobQueue>,
    artifacts: Arc<dyn ArtifactStore>,
    results: Arc<dyn ResultStore>,
    runner: Arc<dyn PipelineRunner>,
    retry_backoff: Duration,
    slow_job_warn: Duration,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        backend: &Backend,
        runner: Arc<dyn PipelineRunner>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            id: id.into(),
            queue: backend.queue.clone(),
            artifacts: backend.artifacts.clone(),
            results: backend.results.clone(),
            runner,
            retry_backoff: config.retry_backoff(),
            slow_job_warn: Duration::from_secs(config.slow_job_warn_secs),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Consume jobs until shutdown is signalled
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Worker {} started (runner: {})", self.id, self.runner.name());

        loop {
            let job = match self.queue.dequeue(&self.id, &mut shutdown).await {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Worker {} failed to dequeue: {}", self.id, e);
                    tokio::time::sleep(self.retry_backoff).await;
                    continue;
                }
            };

            let job_id = job.descriptor.id;
            match self.handle(&job).await {
                Ok(HandleOutcome::Completed) => {
                    tracing::info!("Job {} completed", job_id);
                }
                Ok(HandleOutcome::Failed(message)) => {
                    tracing::info!("Job {} completed with error: {}", job_id, message);
                }
                Ok(HandleOutcome::Duplicate) => {
                    tracing::info!("Job {} was already completed, acknowledged redelivery", job_id);
                }
                Ok(HandleOutcome::LeaseLost) => {
                    tracing::warn!(
                        "Job {} outlived its lease (attempt {}), outcome discarded",
                        job_id,
                        job.lease.token
                    );
                }
                Err(e) => {
                    tracing::error!("Job {} aborted, returning to queue: {}", job_id, e);
                    if let Err(nack_err) = self.queue.nack(&job.lease, &e.to_string()).await {
                        tracing::error!("Failed to requeue job {}: {}", job_id, nack_err);
                    }
                    tokio::time::sleep(self.retry_backoff).await;
                }
            }
        }

        tracing::info!("Worker {} stopped", self.id);
    }

    /// Handle one delivery.
    ///
    /// Load and pipeline failures become error results. Store failures are
    /// returned so the caller can hand the job back to the queue; the artifact
    /// is kept for that redelivery.
    pub async fn handle(&self, job: &ClaimedJob) -> Result<HandleOutcome> {
        let descriptor = &job.descriptor;
        let start = Instant::now();

        tracing::info!(
            "Worker {} processing job {} ('{}', {} bytes, attempt {})",
            self.id,
            descriptor.id,
            descriptor.artifact.filename,
            descriptor.artifact.size,
            job.lease.token
        );

        if self.already_completed(descriptor).await? {
            self.queue.ack(&job.lease).await?;
            return Ok(HandleOutcome::Duplicate);
        }

        let payload = match self.analyze(descriptor).await {
            Ok(report) => ResultPayload::success(&report)
                .unwrap_or_else(|e| ResultPayload::failure(e.to_string())),
            Err(e) if e.is_store() => return Err(e),
            Err(e) => {
                // A stale delivery may have finished and released the artifact mid-load
                if self.already_completed(descriptor).await? {
                    self.queue.ack(&job.lease).await?;
                    return Ok(HandleOutcome::Duplicate);
                }
                tracing::warn!("Job {} failed: {}", descriptor.id, e);
                ResultPayload::failure(e.to_string())
            }
        };

        let elapsed = start.elapsed();
        if elapsed > self.slow_job_warn {
            tracing::warn!(
                "Slow job {} ('{}'): took {:.1}s",
                descriptor.id,
                descriptor.artifact.filename,
                elapsed.as_secs_f64()
            );
        }

        // The lease can still lapse between this check and the writes below. The
        // late write is then a result for the same input, and the new holder treats
        // the released artifact as a finished duplicate.
        if !self.queue.holds_lease(&job.lease).await? {
            return Ok(HandleOutcome::LeaseLost);
        }

        self.results.put(descriptor.id, &payload).await?;
        self.artifacts.delete(&descriptor.artifact).await?;

        if !self.queue.ack(&job.lease).await? {
            tracing::warn!("Job {} lease expired before acknowledgement", descriptor.id);
        }

        Ok(match payload.error_message() {
            Some(message) => HandleOutcome::Failed(message.to_string()),
            None => HandleOutcome::Completed,
        })
    }

    /// Artifact released and a result stored means an earlier delivery finished
    async fn already_completed(&self, descriptor: &JobDescriptor) -> Result<bool> {
        Ok(!self.artifacts.exists(&descriptor.artifact).await?
            && self.results.get(descriptor.id).await?.is_some())
    }

    async fn analyze(&self, descriptor: &JobDescriptor) -> Result<AnalysisReport> {
        let dataset = self.artifacts.load_dataset(&descriptor.artifact).await?;

        let runner = self.runner.clone();
        let target = descriptor.target.clone();
        let task = tokio::task::spawn_blocking(move || runner.run(&dataset, target.as_deref()));

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(Error::pipeline(format!(
                "{} pipeline panicked: {}",
                self.runner.name(),
                panic_message(&*e.into_panic())
            ))),
            Err(e) => Err(Error::pipeline(format!("pipeline task failed: {}", e))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
