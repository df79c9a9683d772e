//! Filesystem artifact store

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::ingestion::DatasetLoader;
use crate::types::{ArtifactRef, Dataset};

use super::artifact_store::ArtifactStore;

/// Local artifact store: one file per job under a single directory
pub struct LocalArtifactStore {
    /// Directory to store uploads
    storage_dir: PathBuf,
}

impl LocalArtifactStore {
    /// Create a new local artifact store
    pub fn new(storage_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&storage_dir)?;
        Ok(Self { storage_dir })
    }

    /// Get path for an artifact key
    fn artifact_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(Error::InvalidRequest(format!("Invalid artifact key '{}'", key)));
        }
        Ok(self.storage_dir.join(key))
    }

    pub fn storage_dir(&self) -> &PathBuf {
        &self.storage_dir
    }
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn save(&self, key: &str, filename: &str, data: &[u8]) -> Result<ArtifactRef> {
        let path = self.artifact_path(key)?;

        tokio::fs::write(&path, data)
            .await
            .map_err(|e| Error::store(format!("Failed to write artifact {}: {}", key, e)))?;

        Ok(ArtifactRef {
            key: key.to_string(),
            filename: filename.to_string(),
            size: data.len() as u64,
            sha256: sha256_hex(data),
        })
    }

    async fn load_dataset(&self, artifact: &ArtifactRef) -> Result<Dataset> {
        let path = self.artifact_path(&artifact.key)?;
        let data = tokio::fs::read(&path).await.map_err(|e| {
            Error::load(&artifact.filename, format!("failed to read artifact: {}", e))
        })?;

        if sha256_hex(&data) != artifact.sha256 {
            return Err(Error::load(
                &artifact.filename,
                "artifact content does not match its checksum",
            ));
        }

        // Parsing is CPU-bound; keep it off the async workers
        let filename = artifact.filename.clone();
        tokio::task::spawn_blocking(move || DatasetLoader::load(&filename, &data))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    async fn exists(&self, artifact: &ArtifactRef) -> Result<bool> {
        let path = self.artifact_path(&artifact.key)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Error::store(format!("Failed to stat artifact {}: {}", artifact.key, e)))
    }

    async fn delete(&self, artifact: &ArtifactRef) -> Result<()> {
        let path = self.artifact_path(&artifact.key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::store(format!(
                "Failed to delete artifact {}: {}",
                artifact.key, e
            ))),
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.storage_dir.exists())
    }

    fn name(&self) -> &str {
        "local-filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_load_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path().join("uploads")).unwrap();

        let artifact = store
            .save("job1_data.csv", "data.csv", b"a,b\n1,2\n")
            .await
            .unwrap();
        assert_eq!(artifact.size, 8);
        assert!(store.exists(&artifact).await.unwrap());

        let dataset = store.load_dataset(&artifact).await.unwrap();
        assert_eq!(dataset.n_rows(), 1);

        store.delete(&artifact).await.unwrap();
        assert!(!store.exists(&artifact).await.unwrap());
        // Redundant deletes are fine
        store.delete(&artifact).await.unwrap();
        assert!(matches!(
            store.load_dataset(&artifact).await,
            Err(Error::Load { .. })
        ));
    }

    #[tokio::test]
    async fn test_tampered_artifact_fails_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path().to_path_buf()).unwrap();

        let artifact = store.save("job2_x.csv", "x.csv", b"a\n1\n").await.unwrap();
        std::fs::write(dir.path().join("job2_x.csv"), b"a\n2\n").unwrap();

        let err = store.load_dataset(&artifact).await.unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path().to_path_buf()).unwrap();
        assert!(store.save("../escape.csv", "escape.csv", b"a").await.is_err());
    }
}
