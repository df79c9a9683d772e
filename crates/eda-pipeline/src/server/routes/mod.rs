//! HTTP routes for the job pipeline

pub mod jobs;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Build job routes
pub fn job_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Submission - with larger body limit for dataset uploads
        .route(
            "/create-job",
            post(jobs::create_job).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/job-status/:job_id", get(jobs::job_status))
        .route("/api/queue/stats", get(jobs::queue_stats))
        .route("/api/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "eda-pipeline",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Asynchronous dataset analysis jobs",
        "endpoints": {
            "POST /create-job": "Upload a dataset (multipart: file, prompt, target)",
            "GET /job-status/:job_id": "Poll a job: running or completed with its result",
            "GET /api/queue/stats": "Queue entry counts",
            "GET /": "Health check"
        }
    }))
}
