use std::sync::Arc;

use aide::axum::ApiRouter;
use aide::axum::routing::{get_with, post_with};
use aide::transform::TransformOperation;
use axum::extract::{Multipart, Path, State};
use axum::Json;
use schemars::JsonSchema;
use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;
use crate::db::pool::Database;
use crate::db::{jobs, models::ProcessingJob};
use crate::error::{AppError, AppResult};
use crate::queue::{TaskType, table};
use crate::storage::{S3Storage, layer_key};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub storage: Arc<S3Storage>,
    pub config: Arc<Config>,
}

const MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024 * 1024;

#[derive(Debug, Serialize, JsonSchema)]
pub struct EnqueueResponse {
    pub job_id: String,
    pub layer_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub layer_id: String,
    pub status: String,
    pub progress: i32,
    pub metadata: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<ProcessingJob> for JobStatusResponse {
    fn from(j: ProcessingJob) -> Self {
        Self {
            job_id: j.id,
            layer_id: j.layer_id,
            status: j.status,
            progress: j.progress,
            metadata: j.metadata,
            created_at: j.created_at,
            updated_at: j.updated_at,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct CancelResponse {
    pub message: String,
}

/// Per-queue depth, standing in for Celery's per-worker stats: this
/// runtime has no separate worker registry, only claimed rows in
/// `task_queue`, so "workers" is reported as activity per named queue
/// rather than per process.
#[derive(Debug, Serialize, JsonSchema)]
pub struct QueueDepthEntry {
    pub queue: String,
    pub pending: i64,
    pub claimed: i64,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct JobCountEntry {
    pub status: String,
    pub count: i64,
    pub avg_duration_secs: Option<f64>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct QueueStats {
    pub worker_stats: Vec<QueueDepthEntry>,
    pub active_tasks: i64,
    pub job_counts_24h: Vec<JobCountEntry>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct QueueStatusResponse {
    pub queue_stats: QueueStats,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

/// A default `layer_id` when the caller didn't supply one: a
/// time-plus-random id.
fn generate_layer_id() -> String {
    format!(
        "{:x}-{}",
        chrono::Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    )
}

/// Accept a multipart upload containing a single file field named
/// `file`, an optional `layer_id` field, and an optional `priority`
/// field (`normal` or `high`). Persists the original to object storage,
/// creates the job/layer rows and publishes the processing task. The
/// durable row is written before the task is published so a later
/// publish failure never leaves an orphaned queue entry.
async fn enqueue(State(state): State<AppState>, mut multipart: Multipart) -> AppResult<Json<EnqueueResponse>> {
    let mut filename: Option<String> = None;
    let mut bytes: Option<bytes::Bytes> = None;
    let mut layer_id: Option<String> = None;
    let mut priority: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        match field.name() {
            Some("file") => {
                filename = field.file_name().map(|s| s.to_string());
                bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("failed to read upload: {}", e)))?,
                );
            }
            Some("layer_id") => {
                layer_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("invalid layer_id field: {}", e)))?,
                );
            }
            Some("priority") => {
                priority = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("invalid priority field: {}", e)))?,
                );
            }
            _ => {}
        }
    }

    let filename = filename.ok_or_else(|| AppError::BadRequest("missing file field".into()))?;
    let bytes = bytes.ok_or_else(|| AppError::BadRequest("missing file field".into()))?;

    if bytes.is_empty() {
        return Err(AppError::BadRequest("empty_file".into()));
    }

    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::BadRequest(format!(
            "upload exceeds maximum size of {} bytes",
            MAX_UPLOAD_BYTES
        )));
    }

    let lower = filename.to_lowercase();
    let task_type = if lower.ends_with(".tif") || lower.ends_with(".tiff") {
        TaskType::ProcessGeotiff
    } else if lower.ends_with(".zip") {
        TaskType::ProcessZipArchive
    } else {
        return Err(AppError::BadRequest("unsupported_kind".into()));
    };

    let high_priority = matches!(priority.as_deref(), Some("high"));

    let job_id = Uuid::new_v4().to_string();
    let layer_id = layer_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(generate_layer_id);

    let key = layer_key(&layer_id, &format!("original/{}", filename));
    state.storage.put(&key, bytes.clone()).await?;

    jobs::create_job_and_layer(&state.db, &job_id, &layer_id, &filename, bytes.len() as i64)
        .await?;

    let queue = if high_priority {
        crate::queue::QueueName::HighPriority
    } else {
        task_type.default_queue()
    };
    let payload = serde_json::json!({
        "job_id": job_id,
        "layer_id": layer_id,
        "storage_key": key,
        "original_filename": filename,
    });

    let publish_result = table::publish(
        &state.db,
        queue,
        task_type,
        Some(&job_id),
        payload,
        state.config.worker.max_retries,
    )
    .await;

    if let Err(e) = publish_result {
        // Publication failed after the row was durably written; mark it
        // failed rather than leaving it stuck in `queued` forever.
        let _ = jobs::fail_job(&state.db, &job_id, "io_transient", &e.to_string()).await;
        return Err(e);
    }

    Ok(Json(EnqueueResponse {
        job_id,
        layer_id,
        status: "queued".to_string(),
        message: "job enqueued".to_string(),
    }))
}

fn enqueue_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Enqueue a raster for processing")
        .description("Accepts a multipart upload containing a GeoTIFF or ZIP archive and schedules it for asynchronous processing.")
        .tag("Ingestion")
}

async fn get_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<JobStatusResponse>> {
    let job = jobs::get_job(&state.db, &job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("job '{}' not found", job_id)))?;
    Ok(Json(job.into()))
}

fn get_status_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Get job status")
        .description("Returns the current status, progress and metadata for a processing job.")
        .tag("Ingestion")
}

async fn cancel(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<CancelResponse>> {
    jobs::get_job(&state.db, &job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("job '{}' not found", job_id)))?;

    let cancelled = jobs::cancel_job(&state.db, &job_id).await?;
    if !cancelled {
        return Err(AppError::BadRequest("not_cancellable".into()));
    }
    table::revoke_pending(&state.db, &job_id).await?;

    Ok(Json(CancelResponse {
        message: "job cancelled".to_string(),
    }))
}

fn cancel_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Cancel a job")
        .description("Cancels a job that is still queued or processing. No-op if the job already reached a terminal state.")
        .tag("Ingestion")
}

async fn queue_status(State(state): State<AppState>) -> AppResult<Json<QueueStatusResponse>> {
    let depths = table::depths(&state.db).await?;
    let counts = jobs::status_counts_24h(&state.db).await?;

    let worker_stats: Vec<QueueDepthEntry> = depths
        .into_iter()
        .map(|d| QueueDepthEntry {
            queue: d.queue_name,
            pending: d.pending,
            claimed: d.claimed,
        })
        .collect();
    let active_tasks = worker_stats.iter().map(|q| q.claimed).sum();

    Ok(Json(QueueStatusResponse {
        queue_stats: QueueStats {
            worker_stats,
            active_tasks,
            job_counts_24h: counts
                .into_iter()
                .map(|c| JobCountEntry {
                    status: c.status,
                    count: c.count,
                    avg_duration_secs: c.avg_duration_secs,
                })
                .collect(),
        },
        timestamp: chrono::Utc::now(),
    }))
}

fn queue_status_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Queue status")
        .description("Reports per-queue depth and job counts/durations over the last 24 hours.")
        .tag("Ingestion")
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "geoingest".to_string(),
    })
}

fn health_docs(op: TransformOperation) -> TransformOperation {
    op.summary("Health check").tag("Core")
}

pub fn routes() -> ApiRouter<AppState> {
    ApiRouter::new()
        .api_route("/enqueue", post_with(enqueue, enqueue_docs))
        .api_route("/jobs/{job_id}", get_with(get_status, get_status_docs))
        .api_route("/jobs/{job_id}/cancel", post_with(cancel, cancel_docs))
        .api_route("/queue/status", get_with(queue_status, queue_status_docs))
        .api_route("/health", get_with(health, health_docs))
}
