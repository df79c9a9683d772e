//! Result store: job id to terminal payload

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::ResultPayload;

use super::database::JobDatabase;

/// Keyed store of job outcomes.
///
/// A present entry means the job is finished. `put` overwrites, so a
/// redelivered job that runs twice leaves the last writer's payload.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Record a terminal payload for a job
    async fn put(&self, job_id: Uuid, payload: &ResultPayload) -> Result<()>;

    /// Read the payload for a job, if one was stored
    async fn get(&self, job_id: Uuid) -> Result<Option<ResultPayload>>;

    /// Drop payloads stored longer ago than `ttl`; returns how many
    async fn purge_older_than(&self, ttl: Duration) -> Result<usize>;

    /// Get store name for logging
    fn name(&self) -> &str;
}

fn cutoff_ms(ttl: Duration) -> i64 {
    Utc::now().timestamp_millis() - ttl.as_millis() as i64
}

/// Results kept in the shared SQLite job database
pub struct SqliteResultStore {
    db: Arc<JobDatabase>,
}

impl SqliteResultStore {
    pub fn new(db: Arc<JobDatabase>) -> Self {
        Self { db }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&JobDatabase) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| Error::store(format!("Result store task failed: {}", e)))?
    }
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn put(&self, job_id: Uuid, payload: &ResultPayload) -> Result<()> {
        let payload = payload.clone();
        self.blocking(move |db| db.put_result(job_id, &payload)).await
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<ResultPayload>> {
        self.blocking(move |db| db.get_result(job_id)).await
    }

    async fn purge_older_than(&self, ttl: Duration) -> Result<usize> {
        let cutoff = cutoff_ms(ttl);
        self.blocking(move |db| db.purge_results_before(cutoff)).await
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

/// Process-local result store, useful for tests and single-process setups
#[derive(Default)]
pub struct InMemoryResultStore {
    entries: DashMap<Uuid, (ResultPayload, i64)>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn put(&self, job_id: Uuid, payload: &ResultPayload) -> Result<()> {
        self.entries
            .insert(job_id, (payload.clone(), Utc::now().timestamp_millis()));
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<ResultPayload>> {
        Ok(self.entries.get(&job_id).map(|entry| entry.0.clone()))
    }

    async fn purge_older_than(&self, ttl: Duration) -> Result<usize> {
        let cutoff = cutoff_ms(ttl);
        let before = self.entries.len();
        self.entries.retain(|_, (_, stored_at)| *stored_at >= cutoff);
        Ok(before - self.entries.len())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}
