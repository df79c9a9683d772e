//! Durable job queue with claim leases
//!
//! Entries live in the shared SQLite database, so any process opened on the
//! same data directory can enqueue or claim. Within a process, enqueue wakes
//! an idle worker directly; across processes idle workers poll.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::error::{Error, Result};
use crate::storage::{DeadLetter, JobDatabase, QueueCounts, QueueEntryStatus, ReapOutcome};
use crate::types::JobDescriptor;

/// A worker's exclusive claim on one delivery of a job.
///
/// `token` is the delivery attempt number. Once the lease expires and the
/// job is redelivered, the old token no longer settles anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub job_id: Uuid,
    pub token: u32,
    pub worker_id: String,
    pub expires_at_ms: i64,
}

/// A dequeued descriptor together with its lease
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub descriptor: JobDescriptor,
    pub lease: Lease,
}

/// Queue statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub running: usize,
    pub done: usize,
    pub dead: usize,
}

impl From<QueueCounts> for QueueStats {
    fn from(counts: QueueCounts) -> Self {
        Self {
            queued: counts.queued,
            running: counts.claimed,
            done: counts.done,
            dead: counts.dead,
        }
    }
}

/// FIFO, at-least-once job queue
pub struct JobQueue {
    database: Arc<JobDatabase>,
    notify: Notify,
    poll_interval: Duration,
    max_attempts: u32,
}

impl JobQueue {
    pub fn new(database: Arc<JobDatabase>, config: &QueueConfig) -> Self {
        Self {
            database,
            notify: Notify::new(),
            poll_interval: config.poll_interval(),
            max_attempts: config.max_attempts.max(1),
        }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&JobDatabase) -> Result<T> + Send + 'static,
    {
        let db = self.database.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| Error::store(format!("Queue task failed: {}", e)))?
    }

    /// Append a job; `timeout` bounds each delivery's lease
    pub async fn enqueue(&self, descriptor: &JobDescriptor, timeout: Duration) -> Result<()> {
        let descriptor = descriptor.clone();
        let job_id = descriptor.id;
        self.blocking(move |db| db.enqueue(&descriptor, timeout))
            .await?;

        tracing::debug!("Enqueued job {}", job_id);
        self.notify.notify_one();
        Ok(())
    }

    /// Claim the oldest queued job without waiting
    pub async fn claim(&self, worker_id: &str) -> Result<Option<ClaimedJob>> {
        let owner = worker_id.to_string();
        let claimed = self
            .blocking(move |db| db.claim_next(&owner, Utc::now().timestamp_millis()))
            .await?;

        Ok(claimed.map(|(descriptor, token, expires_at_ms)| ClaimedJob {
            lease: Lease {
                job_id: descriptor.id,
                token,
                worker_id: worker_id.to_string(),
                expires_at_ms,
            },
            descriptor,
        }))
    }

    /// Wait for the next job. Returns `None` once shutdown is signalled.
    pub async fn dequeue(
        &self,
        worker_id: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<ClaimedJob>> {
        loop {
            if *shutdown.borrow() {
                return Ok(None);
            }

            if let Some(job) = self.claim(worker_id).await? {
                return Ok(Some(job));
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// True while this lease is still the job's current delivery
    pub async fn holds_lease(&self, lease: &Lease) -> Result<bool> {
        let (job_id, token) = (lease.job_id, lease.token);
        self.blocking(move |db| db.lease_is_current(job_id, token))
            .await
    }

    /// Mark the delivery done. Returns false if the lease was lost.
    pub async fn ack(&self, lease: &Lease) -> Result<bool> {
        let (job_id, token) = (lease.job_id, lease.token);
        self.blocking(move |db| db.settle_lease(job_id, token, QueueEntryStatus::Done, None))
            .await
    }

    /// Return the job to the queue for another delivery.
    ///
    /// Used when handling was aborted by an infrastructure failure. Only lease
    /// expiries count against the attempt cap, so a nack never dead-letters.
    pub async fn nack(&self, lease: &Lease, reason: &str) -> Result<bool> {
        let (job_id, token) = (lease.job_id, lease.token);
        let reason = reason.to_string();
        let requeued = self
            .blocking(move |db| {
                db.settle_lease(job_id, token, QueueEntryStatus::Queued, Some(&reason))
            })
            .await?;

        if requeued {
            self.notify.notify_one();
        }
        Ok(requeued)
    }

    /// Requeue deliveries whose lease expired; hand back those out of attempts
    pub async fn reap_expired(&self) -> Result<ReapOutcome> {
        let max_attempts = self.max_attempts;
        let outcome = self
            .blocking(move |db| db.reap_expired(Utc::now().timestamp_millis(), max_attempts))
            .await?;

        if outcome.requeued > 0 {
            self.notify.notify_waiters();
        }
        Ok(outcome)
    }

    /// Settle a dead letter once its outcome is recorded. Returns false if
    /// another reaper pass already took it over.
    pub async fn bury(&self, letter: &DeadLetter) -> Result<bool> {
        let (job_id, token) = (letter.descriptor.id, letter.token);
        self.blocking(move |db| {
            db.settle_lease(job_id, token, QueueEntryStatus::Dead, Some("lease expired"))
        })
        .await
    }

    /// Drop `done` and `dead` entries last touched more than `age` ago
    pub async fn purge_settled(&self, age: Duration) -> Result<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(age)
                .map_err(|e| Error::Config(format!("Retention out of range: {}", e)))?;
        self.blocking(move |db| db.purge_settled_entries_before(cutoff))
            .await
    }

    /// Queue status and attempt count for one job
    pub async fn entry(&self, job_id: Uuid) -> Result<Option<(QueueEntryStatus, u32)>> {
        self.blocking(move |db| db.queue_entry(job_id)).await
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let counts = self.blocking(|db| db.queue_counts()).await?;
        Ok(counts.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ArtifactRef;

    fn descriptor() -> JobDescriptor {
        let id = Uuid::new_v4();
        JobDescriptor {
            id,
            artifact: ArtifactRef {
                key: format!("{}_data.csv", id),
                filename: "data.csv".to_string(),
                size: 0,
                sha256: String::new(),
            },
            prompt: None,
            target: None,
            submitted_at: Utc::now(),
        }
    }

    fn queue() -> JobQueue {
        let db = Arc::new(JobDatabase::in_memory().unwrap());
        JobQueue::new(db, &QueueConfig::default())
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let queue = Arc::new(queue());
        let (_tx, mut rx) = watch::channel(false);

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue("w1", &mut rx).await })
        };
        tokio::task::yield_now().await;

        let job = descriptor();
        queue.enqueue(&job, Duration::from_secs(60)).await.unwrap();

        let claimed = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(claimed.descriptor.id, job.id);
        assert_eq!(claimed.lease.token, 1);
        assert_eq!(claimed.lease.worker_id, "w1");
    }

    #[tokio::test]
    async fn test_dequeue_returns_none_on_shutdown() {
        let queue = Arc::new(queue());
        let (tx, mut rx) = watch::channel(false);

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue("w1", &mut rx).await })
        };
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_stale_lease_cannot_settle() {
        let queue = queue();
        let job = descriptor();
        queue.enqueue(&job, Duration::ZERO).await.unwrap();

        let first = queue.claim("w1").await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(queue.reap_expired().await.unwrap().requeued, 1);

        let second = queue.claim("w2").await.unwrap().unwrap();
        assert_eq!(second.lease.token, 2);

        assert!(!queue.holds_lease(&first.lease).await.unwrap());
        assert!(!queue.ack(&first.lease).await.unwrap());
        assert!(queue.holds_lease(&second.lease).await.unwrap());
        assert!(queue.ack(&second.lease).await.unwrap());

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.done, 1);
        assert_eq!(stats.running, 0);
    }

    #[tokio::test]
    async fn test_nack_requeues_for_redelivery() {
        let queue = queue();
        let job = descriptor();
        queue.enqueue(&job, Duration::from_secs(60)).await.unwrap();

        let claimed = queue.claim("w1").await.unwrap().unwrap();
        assert!(queue.nack(&claimed.lease, "store down").await.unwrap());

        let again = queue.claim("w2").await.unwrap().unwrap();
        assert_eq!(again.descriptor.id, job.id);
        assert_eq!(again.lease.token, 2);
    }

    #[tokio::test]
    async fn test_nacked_job_survives_a_later_timeout() {
        let queue = queue();
        let job = descriptor();
        queue.enqueue(&job, Duration::ZERO).await.unwrap();

        for _ in 0..2 {
            let claimed = queue.claim("w1").await.unwrap().unwrap();
            assert!(queue.nack(&claimed.lease, "store down").await.unwrap());
        }

        queue.claim("w1").await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let outcome = queue.reap_expired().await.unwrap();
        assert_eq!(outcome.requeued, 1);
        assert!(outcome.dead.is_empty());
        assert_eq!(queue.stats().await.unwrap().queued, 1);
    }
}
