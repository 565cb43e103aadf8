use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Asia::Aden;

use crate::config::WorkerConfig;
use crate::db::pool::Database;
use crate::error::ErrorKind;
use crate::queue::{QueueName, Task, TaskType, table};
use crate::storage::S3Storage;
use crate::worker::ratelimit::RateLimiters;
use crate::worker::tasks::{self, WorkerContext};

/// Drives the worker's background loops: one poller per named queue,
/// plus periodic housekeeping tasks. Generalizes a single poll-and-claim
/// loop to many queues, each with its own rate limit and concurrency.
pub struct WorkerRuntime {
    ctx: Arc<WorkerContext>,
    limiters: Arc<RateLimiters>,
}

impl WorkerRuntime {
    pub fn new(db: Database, storage: S3Storage, config: WorkerConfig) -> Self {
        let limiters = Arc::new(RateLimiters::new(&config));
        Self {
            ctx: Arc::new(WorkerContext {
                db,
                storage,
                config,
            }),
            limiters,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let mut handles = Vec::new();

        for queue in QueueName::all() {
            let ctx = self.ctx.clone();
            let limiters = self.limiters.clone();
            handles.push(tokio::spawn(async move {
                queue_supervisor(ctx, limiters, queue).await;
            }));
        }

        {
            let ctx = self.ctx.clone();
            let interval = Duration::from_secs(ctx.config.cleanup_interval_secs);
            handles.push(tokio::spawn(async move {
                periodic_loop(ctx, interval, |ctx| Box::pin(run_cleanup(ctx))).await;
            }));
        }

        {
            let ctx = self.ctx.clone();
            let interval = Duration::from_secs(ctx.config.stats_interval_secs);
            handles.push(tokio::spawn(async move {
                periodic_loop(ctx, interval, |ctx| Box::pin(run_stats(ctx))).await;
            }));
        }

        {
            let ctx = self.ctx.clone();
            let interval = Duration::from_secs(ctx.config.reaper_interval_secs);
            handles.push(tokio::spawn(async move {
                periodic_loop(ctx, interval, |ctx| Box::pin(run_reaper(ctx))).await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        Ok(())
    }
}

/// Outer supervisor around a single queue's poll loop: a worker "process"
/// is modeled as one run of [`run_queue_worker`], which returns once it has
/// handled `max_tasks_per_worker` tasks. The supervisor immediately spawns
/// a fresh run in its place, the same way a Celery pool respawns a child
/// process that hit `--max-tasks-per-child`.
async fn queue_supervisor(ctx: Arc<WorkerContext>, limiters: Arc<RateLimiters>, queue: QueueName) {
    loop {
        let processed = run_queue_worker(&ctx, &limiters, queue).await;
        tracing::info!(queue = queue.as_str(), processed, "worker recycled after max tasks, respawning");
    }
}

/// Polls `queue` and runs claimed tasks until `max_tasks_per_worker` have
/// been processed, then returns the count so the caller can respawn.
async fn run_queue_worker(ctx: &Arc<WorkerContext>, limiters: &Arc<RateLimiters>, queue: QueueName) -> u32 {
    let max_tasks = ctx.config.max_tasks_per_worker;
    let mut processed: u32 = 0;

    while processed < max_tasks {
        match table::claim_next(&ctx.db, queue).await {
            Ok(Some(task)) => {
                limiters.for_task(task.task_type).acquire().await;
                run_claimed_task(ctx, &task).await;
                processed += 1;
            }
            Ok(None) => {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            Err(e) => {
                tracing::error!(queue = queue.as_str(), error = %e, "failed to claim task");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }

    processed
}

async fn run_claimed_task(ctx: &Arc<WorkerContext>, task: &Task) {
    let time_limit = task.task_type.time_limit_secs(&ctx.config);
    let outcome = match time_limit {
        Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), execute(ctx, task)).await {
            Ok(result) => result,
            Err(_) => Err((ErrorKind::Timeout, format!("task exceeded {}s time limit", secs))),
        },
        None => execute(ctx, task).await,
    };

    match outcome {
        Ok(()) => {
            if let Err(e) = table::ack(&ctx.db, &task.id).await {
                tracing::error!(task_id = %task.id, error = %e, "failed to ack task");
            }
        }
        Err((kind, message)) => {
            tracing::warn!(task_id = %task.id, kind = kind.as_str(), %message, "task failed");

            if kind.is_retriable() {
                match table::nack_retry(&ctx.db, &task.id, ctx.config.retry_delay_secs).await {
                    Ok(true) => {}
                    Ok(false) => finalize_job_failure(ctx, task, kind, &message).await,
                    Err(e) => tracing::error!(task_id = %task.id, error = %e, "failed to reschedule task"),
                }
            } else {
                let _ = table::ack(&ctx.db, &task.id).await;
                finalize_job_failure(ctx, task, kind, &message).await;
            }
        }
    }
}

async fn finalize_job_failure(ctx: &Arc<WorkerContext>, task: &Task, kind: ErrorKind, message: &str) {
    let Some(job_id) = &task.job_id else { return };
    let _ = crate::db::jobs::fail_job(&ctx.db, job_id, kind.as_str(), message).await;
    if let Some(layer_id) = task.payload.get("layer_id").and_then(|v| v.as_str()) {
        let _ = crate::db::layers::mark_error(&ctx.db, layer_id, message).await;
    }
}

async fn execute(ctx: &Arc<WorkerContext>, task: &Task) -> tasks::TaskOutcome {
    match task.task_type {
        TaskType::ProcessGeotiff => tasks::process_geotiff(ctx, task).await,
        TaskType::ProcessZipArchive => tasks::process_zip_archive(ctx, task).await,
        TaskType::CleanupOldJobs => tasks::cleanup_old_jobs(ctx).await,
        TaskType::UpdateProcessingStatistics => tasks::update_processing_statistics(ctx).await,
    }
}

async fn run_cleanup(ctx: Arc<WorkerContext>) {
    let now_aden = chrono::Utc::now().with_timezone(&Aden);
    tracing::info!(at = %now_aden, "running scheduled cleanup");
    if let Err((kind, msg)) = tasks::cleanup_old_jobs(&ctx).await {
        tracing::error!(kind = kind.as_str(), error = %msg, "cleanup task failed");
    }
}

async fn run_stats(ctx: Arc<WorkerContext>) {
    if let Err((kind, msg)) = tasks::update_processing_statistics(&ctx).await {
        tracing::error!(kind = kind.as_str(), error = %msg, "stats task failed");
    }
}

/// Requeue tasks whose claiming worker never came back, mirroring
/// `acks_late` + `task_reject_on_worker_lost`.
async fn run_reaper(ctx: Arc<WorkerContext>) {
    match table::reap_stale_claims(&ctx.db, ctx.config.claim_staleness_secs).await {
        Ok(0) => {}
        Ok(n) => tracing::warn!(reclaimed = n, "reaped stale task claims"),
        Err(e) => tracing::error!(error = %e, "stale claim reaper failed"),
    }
}

async fn periodic_loop<F>(ctx: Arc<WorkerContext>, interval: Duration, f: F)
where
    F: Fn(Arc<WorkerContext>) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>,
{
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        f(ctx.clone()).await;
    }
}
