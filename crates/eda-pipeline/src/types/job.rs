//! Job descriptors and artifact references

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pointer to an uploaded dataset held by an artifact store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Storage key, unique per job
    pub key: String,
    /// Original upload filename; its extension selects the loader
    pub filename: String,
    /// Size in bytes
    pub size: u64,
    /// SHA-256 of the stored bytes, hex encoded
    pub sha256: String,
}

impl ArtifactRef {
    /// Lowercased file extension of the original upload
    pub fn extension(&self) -> String {
        std::path::Path::new(&self.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default()
    }
}

/// Unit of work carried by the queue. Never mutated after enqueue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: Uuid,
    pub artifact: ArtifactRef,
    /// Free-text hint, passed through untouched
    pub prompt: Option<String>,
    /// Target column enabling model recommendation
    pub target: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// A new job request as received by the gateway
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub filename: String,
    pub data: Vec<u8>,
    pub prompt: Option<String>,
    pub target: Option<String>,
}

impl SubmitRequest {
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            data,
            prompt: None,
            target: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }
}

/// Storage key for a job's artifact: the job id plus a filesystem-safe filename
pub fn artifact_key(job_id: Uuid, filename: &str) -> String {
    let base = std::path::Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");

    let safe: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!("{}_{}", job_id, safe.trim_start_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_key_strips_directories() {
        let id = Uuid::new_v4();
        let key = artifact_key(id, "../../etc/passwd");
        assert_eq!(key, format!("{}_passwd", id));

        let key = artifact_key(id, "sales report 2024.csv");
        assert_eq!(key, format!("{}_sales_report_2024.csv", id));
    }

    #[test]
    fn test_extension_is_lowercased() {
        let artifact = ArtifactRef {
            key: "k".to_string(),
            filename: "Data.PARQUET".to_string(),
            size: 0,
            sha256: String::new(),
        };
        assert_eq!(artifact.extension(), "parquet");
    }
}
