//! Artifact store trait for uploaded datasets

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ArtifactRef, Dataset};

/// Storage for uploaded datasets, one entry per in-flight job.
///
/// Implementations:
/// - `LocalArtifactStore`: Local filesystem
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist bytes under `key` (original name `filename`)
    ///
    /// Returns the reference carried by the job descriptor
    async fn save(&self, key: &str, filename: &str, data: &[u8]) -> Result<ArtifactRef>;

    /// Read the artifact and parse it as a dataset.
    ///
    /// Unreadable, corrupted or unsupported content is a `LoadError`.
    async fn load_dataset(&self, artifact: &ArtifactRef) -> Result<Dataset>;

    /// Check if the artifact is still stored
    async fn exists(&self, artifact: &ArtifactRef) -> Result<bool>;

    /// Delete the artifact. Deleting a missing artifact succeeds.
    async fn delete(&self, artifact: &ArtifactRef) -> Result<()>;

    /// Check if the store is usable
    async fn health_check(&self) -> Result<bool>;

    /// Get store name for logging
    fn name(&self) -> &str;
}
