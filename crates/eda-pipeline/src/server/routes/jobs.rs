//! Job submission and status endpoints

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::processing::QueueStats;
use crate::server::state::AppState;
use crate::types::{JobStatusView, SubmitRequest};

/// Response from job creation
#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: Uuid,
}

/// Treat blank form values as absent
fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// POST /create-job - Upload a dataset (`file`) with optional `prompt` and `target`
pub async fn create_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<CreateJobResponse>> {
    if !state.is_ready() {
        return Err(Error::store("server is not accepting submissions"));
    }

    let mut upload: Option<(String, Vec<u8>)> = None;
    let mut prompt = None;
    let mut target = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidRequest(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field.bytes().await.map_err(|e| {
                    Error::InvalidRequest(format!("Failed to read file {}: {}", filename, e))
                })?;
                upload = Some((filename, data.to_vec()));
            }
            "prompt" | "target" => {
                let value = field.text().await.map_err(|e| {
                    Error::InvalidRequest(format!("Failed to read {}: {}", name, e))
                })?;
                if name == "prompt" {
                    prompt = non_empty(value);
                } else {
                    target = non_empty(value);
                }
            }
            other => {
                tracing::debug!("Ignoring unexpected form field '{}'", other);
            }
        }
    }

    let (filename, data) =
        upload.ok_or_else(|| Error::InvalidRequest("No file provided".to_string()))?;

    let request = SubmitRequest {
        filename,
        data,
        prompt,
        target,
    };
    let job_id = state.service().submit(request).await?;

    Ok(Json(CreateJobResponse { job_id }))
}

/// GET /job-status/:job_id - Running indicator or the stored result.
///
/// Ids that were never issued, including ones that are not UUIDs, report
/// `running` just like queued jobs.
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusView>> {
    let Ok(job_id) = Uuid::parse_str(&job_id) else {
        tracing::debug!("Status requested for malformed job id '{}'", job_id);
        return Ok(Json(JobStatusView::Running));
    };

    Ok(Json(state.service().status(job_id).await?))
}

/// Queue statistics response
#[derive(Debug, Serialize)]
pub struct QueueStatsResponse {
    pub queue: QueueStats,
    pub embedded_workers: Option<usize>,
}

/// GET /api/queue/stats - Queue entry counts
pub async fn queue_stats(State(state): State<AppState>) -> Result<Json<QueueStatsResponse>> {
    let queue = state.backend().queue.stats().await?;
    let worker = &state.config().worker;

    Ok(Json(QueueStatsResponse {
        queue,
        embedded_workers: worker.embedded.then(|| worker.worker_count()),
    }))
}
