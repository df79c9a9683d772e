//! HTTP adapter: submission gateway and status endpoint

pub mod routes;
pub mod state;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::processing::Backend;
use state::AppState;

/// Job pipeline HTTP server
pub struct EdaServer {
    config: PipelineConfig,
    state: AppState,
}

impl EdaServer {
    /// Create a server over already-opened backend clients
    pub fn new(config: PipelineConfig, backend: Backend) -> Self {
        let state = AppState::new(config.clone(), backend);
        Self { config, state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Start the server and run until `shutdown` resolves
    pub async fn start<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = self
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let router = self.build_router();

        tracing::info!("Starting job pipeline server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

        self.state.set_ready(false);
        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }
}

/// Router over the given state
pub fn build_router(state: AppState) -> Router {
    let config = state.config();
    let max_upload_size = config.server.max_upload_size;
    let enable_cors = config.server.enable_cors;

    let router = Router::new()
        // Health check
        .route("/", get(health_check))
        .route("/ready", get(readiness))
        .merge(routes::job_routes(max_upload_size))
        .with_state(state)
        // Middleware layers (applied bottom to top)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new());

    if enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router.layer(cors)
    } else {
        router
    }
}

/// Health check endpoint
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Readiness check endpoint: queue database and artifact store reachable
async fn readiness(State(state): State<AppState>) -> StatusCode {
    if !state.is_ready() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    let backend = state.backend();
    let queue_ok = backend.queue.stats().await.is_ok();
    let artifacts_ok = backend.artifacts.health_check().await.unwrap_or(false);

    if queue_ok && artifacts_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::analysis::AnalysisPipeline;
    use crate::processing::Worker;
    use crate::storage::{ArtifactStore, JobDatabase, LocalArtifactStore};

    const BOUNDARY: &str = "eda-test-boundary";

    fn test_state() -> (TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();

        let database = Arc::new(JobDatabase::in_memory().unwrap());
        let artifacts: Arc<dyn ArtifactStore> =
            Arc::new(LocalArtifactStore::new(config.storage.artifact_dir()).unwrap());
        let backend = Backend::with_stores(database, artifacts, &config);

        (dir, AppState::new(config, backend))
    }

    fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match filename {
                Some(filename) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: text/csv\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                ),
            }
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn create_job_request(parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/create-job")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn get(router: &Router, uri: &str) -> axum::response::Response {
        router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, state) = test_state();
        let router = build_router(state);

        let response = get(&router, "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"status": "healthy"}));

        assert_eq!(get(&router, "/ready").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_job_then_poll_until_completed() {
        let (_dir, state) = test_state();
        let router = build_router(state.clone());

        let response = router
            .clone()
            .oneshot(create_job_request(&[
                ("file", Some("scores.csv"), &b"a,b\n1,2\n3,4\n5,7\n"[..]),
                ("prompt", None, &b"look for outliers"[..]),
                ("target", None, &b""[..]),
            ]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let job_id = json_body(response).await["job_id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = get(&router, &format!("/job-status/{}", job_id)).await;
        assert_eq!(json_body(response).await, json!({"status": "running"}));

        let backend = state.backend();
        let job = backend.queue.claim("http-test").await.unwrap().unwrap();
        assert_eq!(job.descriptor.prompt.as_deref(), Some("look for outliers"));
        assert_eq!(job.descriptor.target, None);

        Worker::new(
            "http-test",
            backend,
            Arc::new(AnalysisPipeline::default()),
            &state.config().worker,
        )
        .handle(&job)
        .await
        .unwrap();

        let body = json_body(get(&router, &format!("/job-status/{}", job_id)).await).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["result"]["insights"][0], "Rows: 3, Columns: 2");
        assert!(body["result"]["automl"].is_null());

        let stats = json_body(get(&router, "/api/queue/stats").await).await;
        assert_eq!(stats["queue"]["done"], 1);
    }

    #[tokio::test]
    async fn test_create_job_without_file_is_rejected() {
        let (_dir, state) = test_state();
        let router = build_router(state);

        let response = router
            .oneshot(create_job_request(&[("prompt", None, &b"hello"[..])]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["type"], "invalid_request");
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_ids_report_running() {
        let (_dir, state) = test_state();
        let router = build_router(state);

        for id in [uuid::Uuid::new_v4().to_string(), "not-a-uuid".to_string()] {
            let response = get(&router, &format!("/job-status/{}", id)).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(json_body(response).await, json!({"status": "running"}));
        }
    }
}
