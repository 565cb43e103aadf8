use chrono::Utc;
use serde_json::json;

use crate::db::models::{ProcessingJob, StatusCount};
use crate::db::pool::Database;
use crate::error::AppResult;

/// Create the job + layer rows for a freshly accepted upload in one
/// transaction. The durable row always precedes publication, to avoid
/// lost acknowledgments.
pub async fn create_job_and_layer(
    db: &Database,
    job_id: &str,
    layer_id: &str,
    original_filename: &str,
    file_size: i64,
) -> AppResult<()> {
    let mut tx = db.pool().begin().await?;

    let metadata = json!({
        "original_filename": original_filename,
        "file_size": file_size,
    });

    sqlx::query(
        r#"
        INSERT INTO processing_jobs (id, layer_id, status, progress, metadata)
        VALUES ($1, $2, 'queued', 0, $3)
        "#,
    )
    .bind(job_id)
    .bind(layer_id)
    .bind(&metadata)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO gis_layers (id, filename, status)
        VALUES ($1, $2, 'processing')
        ON CONFLICT (id) DO UPDATE SET
            filename = EXCLUDED.filename,
            status = 'processing',
            updated_at = NOW()
        "#,
    )
    .bind(layer_id)
    .bind(original_filename)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn get_job(db: &Database, job_id: &str) -> AppResult<Option<ProcessingJob>> {
    let job = sqlx::query_as::<_, ProcessingJob>(
        "SELECT * FROM processing_jobs WHERE id = $1",
    )
    .bind(job_id)
    .fetch_optional(db.pool())
    .await?;
    Ok(job)
}

/// Transition `queued -> processing`. Returns `false` if the job was
/// already cancelled or otherwise not `queued` (the caller should
/// abort rather than proceed).
pub async fn start_processing(db: &Database, job_id: &str) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE processing_jobs
        SET status = 'processing', progress = 10, updated_at = NOW()
        WHERE id = $1 AND status = 'queued'
        "#,
    )
    .bind(job_id)
    .execute(db.pool())
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Publish a progress milestone (10/25/50/75). Progress writes are
/// monotonic and only apply while the job is still `processing`; a
/// `false` return means the job was cancelled out from under the
/// worker and it should abort.
pub async fn update_progress(db: &Database, job_id: &str, progress: i32) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE processing_jobs
        SET progress = $2, updated_at = NOW()
        WHERE id = $1 AND status = 'processing' AND progress <= $2
        "#,
    )
    .bind(job_id)
    .bind(progress)
    .execute(db.pool())
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Terminal success write. A `completed` write wins even over a
/// `cancelled` row (the worker finished before observing the
/// cancellation) but never overwrites an already terminal row.
/// `metadata` is merged rather than replaced so the original
/// filename/byte size recorded at enqueue survive alongside the final
/// artifact manifest.
pub async fn complete_job(
    db: &Database,
    job_id: &str,
    metadata: &serde_json::Value,
) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE processing_jobs
        SET status = 'completed', progress = 100, metadata = metadata || $2::jsonb, updated_at = NOW()
        WHERE id = $1 AND status NOT IN ('completed', 'failed')
        "#,
    )
    .bind(job_id)
    .bind(metadata)
    .execute(db.pool())
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Terminal failure write: error kind and detail recorded in metadata.
pub async fn fail_job(
    db: &Database,
    job_id: &str,
    error_kind: &str,
    error_message: &str,
) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE processing_jobs
        SET status = 'failed',
            metadata = metadata || jsonb_build_object('error', $3::text, 'error_kind', $2::text),
            updated_at = NOW()
        WHERE id = $1 AND status NOT IN ('completed', 'failed')
        "#,
    )
    .bind(job_id)
    .bind(error_kind)
    .bind(error_message)
    .execute(db.pool())
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Cancel a job. Only legal from `queued` or `processing`; returns
/// `false` (mapped to `not_cancellable` by the caller) otherwise.
pub async fn cancel_job(db: &Database, job_id: &str) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE processing_jobs
        SET status = 'cancelled', updated_at = NOW()
        WHERE id = $1 AND status IN ('queued', 'processing')
        "#,
    )
    .bind(job_id)
    .execute(db.pool())
    .await?;
    Ok(result.rows_affected() > 0)
}

/// `cleanup_old_jobs` periodic task: delete terminal jobs older than
/// the retention window. Returns the number of deleted rows.
pub async fn cleanup_old_jobs(db: &Database, retention_days: i64) -> AppResult<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM processing_jobs
        WHERE status IN ('completed', 'failed')
        AND updated_at < NOW() - ($1 || ' days')::interval
        "#,
    )
    .bind(retention_days.to_string())
    .execute(db.pool())
    .await?;
    Ok(result.rows_affected())
}

/// `update_processing_statistics` periodic task and the data backing
/// `/queue/status`'s `job_counts_24h`.
pub async fn status_counts_24h(db: &Database) -> AppResult<Vec<StatusCount>> {
    let rows = sqlx::query_as::<_, StatusCount>(
        r#"
        SELECT
            status,
            COUNT(*) AS count,
            AVG(EXTRACT(EPOCH FROM (updated_at - created_at))) AS avg_duration_secs
        FROM processing_jobs
        WHERE created_at > NOW() - INTERVAL '24 hours'
        GROUP BY status
        "#,
    )
    .fetch_all(db.pool())
    .await?;
    Ok(rows)
}

pub fn now() -> chrono::DateTime<Utc> {
    Utc::now()
}
