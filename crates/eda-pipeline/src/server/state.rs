//! Application state shared by the HTTP handlers

use parking_lot::RwLock;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::processing::{Backend, JobService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: PipelineConfig,
    /// Queue and store clients
    backend: Backend,
    /// Submission gateway and status lookup
    service: JobService,
    /// Ready state
    ready: RwLock<bool>,
}

impl AppState {
    /// Create application state around already-opened backend clients
    pub fn new(config: PipelineConfig, backend: Backend) -> Self {
        let service = JobService::new(&backend, config.queue.job_timeout());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                backend,
                service,
                ready: RwLock::new(true),
            }),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn backend(&self) -> &Backend {
        &self.inner.backend
    }

    pub fn service(&self) -> &JobService {
        &self.inner.service
    }

    /// Check if the server is ready to accept submissions
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }

    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }
}
