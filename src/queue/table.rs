use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::pool::Database;
use crate::error::AppResult;
use crate::queue::types::{QueueName, Task, TaskType};

#[derive(FromRow)]
struct TaskRow {
    id: String,
    queue_name: String,
    task_type: String,
    job_id: Option<String>,
    payload: serde_json::Value,
    attempts: i32,
    max_attempts: i32,
}

impl TaskRow {
    fn into_task(self) -> Option<Task> {
        Some(Task {
            id: self.id,
            queue: QueueName::from_str(&self.queue_name)?,
            task_type: task_type_from_str(&self.task_type)?,
            job_id: self.job_id,
            payload: self.payload,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
        })
    }
}

fn task_type_from_str(s: &str) -> Option<TaskType> {
    match s {
        "process_geotiff" => Some(TaskType::ProcessGeotiff),
        "process_zip_archive" => Some(TaskType::ProcessZipArchive),
        "cleanup_old_jobs" => Some(TaskType::CleanupOldJobs),
        "update_processing_statistics" => Some(TaskType::UpdateProcessingStatistics),
        _ => None,
    }
}

/// Publish a task onto its queue. The row is durable before the
/// worker ever sees it, same guarantee the dispatcher relies on for
/// job rows.
pub async fn publish(
    db: &Database,
    queue: QueueName,
    task_type: TaskType,
    job_id: Option<&str>,
    payload: serde_json::Value,
    max_attempts: i32,
) -> AppResult<String> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO task_queue (id, queue_name, task_type, job_id, payload, max_attempts)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&id)
    .bind(queue.as_str())
    .bind(task_type.as_str())
    .bind(job_id)
    .bind(payload)
    .bind(max_attempts)
    .execute(db.pool())
    .await?;
    Ok(id)
}

/// Claim the oldest pending, due task on a queue using the same
/// `FOR UPDATE SKIP LOCKED` idiom the job poller uses, so multiple
/// worker processes never pick up the same task.
pub async fn claim_next(db: &Database, queue: QueueName) -> AppResult<Option<Task>> {
    let mut tx = db.pool().begin().await?;

    let row = sqlx::query_as::<_, TaskRow>(
        r#"
        SELECT id, queue_name, task_type, job_id, payload, attempts, max_attempts
        FROM task_queue
        WHERE queue_name = $1 AND status = 'pending' AND available_at <= NOW()
        ORDER BY created_at ASC
        FOR UPDATE SKIP LOCKED
        LIMIT 1
        "#,
    )
    .bind(queue.as_str())
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        tx.commit().await?;
        return Ok(None);
    };

    sqlx::query(
        r#"
        UPDATE task_queue
        SET status = 'claimed', claimed_at = NOW(), updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(&row.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row.into_task())
}

pub async fn ack(db: &Database, task_id: &str) -> AppResult<()> {
    sqlx::query(
        "UPDATE task_queue SET status = 'done', updated_at = NOW() WHERE id = $1",
    )
    .bind(task_id)
    .execute(db.pool())
    .await?;
    Ok(())
}

/// Either reschedule the task after an exponentially backed-off delay
/// (`initial_delay_secs * 2^attempts`, incrementing `attempts`) or,
/// once `max_attempts` is reached, mark it permanently failed.
pub async fn nack_retry(db: &Database, task_id: &str, initial_delay_secs: u64) -> AppResult<bool> {
    let row: Option<(i32, i32)> = sqlx::query_as(
        "SELECT attempts, max_attempts FROM task_queue WHERE id = $1",
    )
    .bind(task_id)
    .fetch_optional(db.pool())
    .await?;

    let Some((attempts, max_attempts)) = row else {
        return Ok(false);
    };

    if attempts + 1 >= max_attempts {
        sqlx::query(
            "UPDATE task_queue SET status = 'failed', attempts = attempts + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(task_id)
        .execute(db.pool())
        .await?;
        return Ok(false);
    }

    let backoff_secs = initial_delay_secs.saturating_mul(1u64 << attempts.max(0).min(16) as u32);

    sqlx::query(
        r#"
        UPDATE task_queue
        SET status = 'pending',
            attempts = attempts + 1,
            available_at = NOW() + ($2 || ' seconds')::interval,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(task_id)
    .bind(backoff_secs.to_string())
    .execute(db.pool())
    .await?;
    Ok(true)
}

/// Best-effort cancellation: only stops a task that hasn't been claimed
/// yet. A task already running is not interrupted; the worker observes
/// cancellation on its own job-status guard writes instead.
pub async fn revoke_pending(db: &Database, job_id: &str) -> AppResult<u64> {
    let result = sqlx::query(
        "UPDATE task_queue SET status = 'revoked', updated_at = NOW() WHERE job_id = $1 AND status = 'pending'",
    )
    .bind(job_id)
    .execute(db.pool())
    .await?;
    Ok(result.rows_affected())
}

/// `reject_on_worker_lost`: requeue tasks stuck in `'claimed'` past
/// `staleness_secs` back to `'pending'` so a worker that died
/// mid-execution doesn't strand its task forever. Not counted against
/// `attempts` — this is the task re-appearing after a lost worker, not
/// a failed attempt by the task itself. Returns the number of rows
/// reclaimed.
pub async fn reap_stale_claims(db: &Database, staleness_secs: u64) -> AppResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE task_queue
        SET status = 'pending', available_at = NOW(), claimed_at = NULL, updated_at = NOW()
        WHERE status = 'claimed'
        AND claimed_at < NOW() - ($1 || ' seconds')::interval
        "#,
    )
    .bind(staleness_secs.to_string())
    .execute(db.pool())
    .await?;
    Ok(result.rows_affected())
}

#[derive(Debug, Clone, FromRow)]
pub struct QueueDepth {
    pub queue_name: String,
    pub pending: i64,
    pub claimed: i64,
}

pub async fn depths(db: &Database) -> AppResult<Vec<QueueDepth>> {
    let rows = sqlx::query_as::<_, QueueDepth>(
        r#"
        SELECT
            queue_name,
            COUNT(*) FILTER (WHERE status = 'pending') AS pending,
            COUNT(*) FILTER (WHERE status = 'claimed') AS claimed
        FROM task_queue
        GROUP BY queue_name
        "#,
    )
    .fetch_all(db.pool())
    .await?;
    Ok(rows)
}

pub type TaskTimestamp = DateTime<Utc>;
