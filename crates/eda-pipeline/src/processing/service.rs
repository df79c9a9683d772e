//! Submission gateway and status lookup

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::storage::{ArtifactStore, ResultStore};
use crate::types::{artifact_key, JobDescriptor, JobStatusView, SubmitRequest};

use super::backend::Backend;
use super::job_queue::JobQueue;

/// Front door for callers: create jobs, poll them
#[derive(Clone)]
pub struct JobService {
    queue: Arc<JobQueue>,
    artifacts: Arc<dyn ArtifactStore>,
    results: Arc<dyn ResultStore>,
    job_timeout: Duration,
}

impl JobService {
    pub fn new(backend: &Backend, job_timeout: Duration) -> Self {
        Self {
            queue: backend.queue.clone(),
            artifacts: backend.artifacts.clone(),
            results: backend.results.clone(),
            job_timeout,
        }
    }

    /// Store the dataset and enqueue a job for it.
    ///
    /// Exactly one artifact write, then one enqueue. If the enqueue fails the
    /// artifact is removed again, so a failed submission leaves nothing behind.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Uuid> {
        let job_id = Uuid::new_v4();
        let key = artifact_key(job_id, &request.filename);

        let artifact = self
            .artifacts
            .save(&key, &request.filename, &request.data)
            .await
            .map_err(|e| Error::submission(format!("failed to store upload: {}", e)))?;

        let descriptor = JobDescriptor {
            id: job_id,
            artifact,
            prompt: request.prompt,
            target: request.target,
            submitted_at: Utc::now(),
        };

        if let Err(e) = self.queue.enqueue(&descriptor, self.job_timeout).await {
            if let Err(cleanup) = self.artifacts.delete(&descriptor.artifact).await {
                tracing::error!(
                    "Failed to remove artifact {} after enqueue failure: {}",
                    descriptor.artifact.key,
                    cleanup
                );
            }
            return Err(Error::submission(format!("failed to enqueue job: {}", e)));
        }

        tracing::info!(
            "Submitted job {} ('{}', {} bytes)",
            job_id,
            request.filename,
            descriptor.artifact.size
        );
        Ok(job_id)
    }

    /// Current state of a job.
    ///
    /// Reads the result store only. An id that was never submitted is
    /// indistinguishable from a queued or running job and reports `running`.
    pub async fn status(&self, job_id: Uuid) -> Result<JobStatusView> {
        Ok(match self.results.get(job_id).await? {
            Some(result) => JobStatusView::Completed { result },
            None => JobStatusView::Running,
        })
    }
}
