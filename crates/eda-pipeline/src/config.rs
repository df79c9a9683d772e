//! Configuration for the job pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Artifact and database locations, result retention
    pub storage: StorageConfig,
    /// Queue delivery policy
    pub queue: QueueConfig,
    /// Worker pool configuration
    pub worker: WorkerConfig,
    /// Default analysis pipeline tuning
    pub analysis: AnalysisConfig,
}

impl PipelineConfig {
    /// Load configuration from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                toml::from_str::<PipelineConfig>(&content).map_err(|e| {
                    Error::Config(format!("Failed to parse {}: {}", path.display(), e))
                })?
            }
            None => PipelineConfig::default(),
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Override selected settings from `HOST`, `PORT`, `EDA_DATA_DIR` and `EDA_WORKERS`
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| Error::Config(format!("Invalid PORT '{}': {}", port, e)))?;
        }
        if let Ok(dir) = std::env::var("EDA_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Ok(workers) = std::env::var("EDA_WORKERS") {
            let count = workers
                .parse()
                .map_err(|e| Error::Config(format!("Invalid EDA_WORKERS '{}': {}", workers, e)))?;
            self.worker.workers = Some(count);
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 100MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
            max_upload_size: 100 * 1024 * 1024, // 100MB
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory holding the job database and uploaded artifacts
    pub data_dir: PathBuf,
    /// Drop results older than this many seconds. `None` keeps results forever.
    pub result_ttl_secs: Option<u64>,
}

impl StorageConfig {
    /// SQLite database holding the queue and result tables
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("jobs.db")
    }

    /// Directory for uploaded artifacts awaiting processing
    pub fn artifact_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    /// Result retention window, if any
    pub fn result_ttl(&self) -> Option<Duration> {
        self.result_ttl_secs.map(Duration::from_secs)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
            .join("eda-pipeline");

        Self {
            data_dir,
            result_ttl_secs: None,
        }
    }
}

/// Queue delivery policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Execution budget per delivery; a lease expires after this long (default: 900s)
    pub job_timeout_secs: u64,
    /// Lease expiries before a job is dead-lettered; nacks do not count
    pub max_attempts: u32,
    /// How often idle workers re-check the queue for jobs enqueued by other processes
    pub poll_interval_ms: u64,
    /// How often expired leases are reaped
    pub reaper_interval_secs: u64,
}

impl QueueConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            job_timeout_secs: 900, // 15 minutes
            max_attempts: 3,
            poll_interval_ms: 500,
            reaper_interval_secs: 5,
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Number of consume loops (default: CPU count, max 4)
    pub workers: Option<usize>,
    /// Run workers inside the server process
    pub embedded: bool,
    /// Pause after a store failure before claiming again
    pub retry_backoff_ms: u64,
    /// Jobs running longer than this are logged as slow
    pub slow_job_warn_secs: u64,
}

impl WorkerConfig {
    /// Resolved worker count
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| num_cpus::get().min(4))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: None, // Auto-detect from CPU count
            embedded: true,
            retry_backoff_ms: 1000,
            slow_job_warn_secs: 60,
        }
    }
}

/// Tuning for the built-in analysis stages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Numeric columns that get a histogram
    pub histogram_max_columns: usize,
    /// Bins per histogram
    pub histogram_bins: usize,
    /// Columns (by variance) in the correlation heatmap
    pub heatmap_top_k: usize,
    /// Rows checked by anomaly detection
    pub anomaly_max_samples: usize,
    /// Robust z-score above which a value is anomalous
    pub anomaly_threshold: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            histogram_max_columns: 4,
            histogram_bins: 40,
            heatmap_top_k: 8,
            anomaly_max_samples: 5000,
            anomaly_threshold: 3.5,
        }
    }
}
