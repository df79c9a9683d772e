//! Shared client objects, built once per process

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::storage::{ArtifactStore, JobDatabase, LocalArtifactStore, ResultStore, SqliteResultStore};

use super::job_queue::JobQueue;

/// Handles to the queue and both stores.
///
/// Cloning shares the same underlying connections.
#[derive(Clone)]
pub struct Backend {
    pub database: Arc<JobDatabase>,
    pub queue: Arc<JobQueue>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub results: Arc<dyn ResultStore>,
}

impl Backend {
    /// Open the database and artifact directory under `storage.data_dir`
    pub fn open(config: &PipelineConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.storage.data_dir)?;

        let database = Arc::new(JobDatabase::new(config.storage.database_path())?);
        let artifacts: Arc<dyn ArtifactStore> =
            Arc::new(LocalArtifactStore::new(config.storage.artifact_dir())?);

        tracing::info!(
            "Opened job database at {}",
            config.storage.database_path().display()
        );

        Ok(Self::with_stores(database, artifacts, config))
    }

    /// Assemble a backend around an existing database and artifact store
    pub fn with_stores(
        database: Arc<JobDatabase>,
        artifacts: Arc<dyn ArtifactStore>,
        config: &PipelineConfig,
    ) -> Self {
        let queue = Arc::new(JobQueue::new(database.clone(), &config.queue));
        let results: Arc<dyn ResultStore> = Arc::new(SqliteResultStore::new(database.clone()));

        Self {
            database,
            queue,
            artifacts,
            results,
        }
    }
}
