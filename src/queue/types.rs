use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Named queues, mirrored from a Celery-style routing table: each
/// carries its own worker pool sizing and rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Default,
    Processing,
    Validation,
    Cleanup,
    Notifications,
    HighPriority,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Default => "default",
            QueueName::Processing => "processing",
            QueueName::Validation => "validation",
            QueueName::Cleanup => "cleanup",
            QueueName::Notifications => "notifications",
            QueueName::HighPriority => "high_priority",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "default" => Some(QueueName::Default),
            "processing" => Some(QueueName::Processing),
            "validation" => Some(QueueName::Validation),
            "cleanup" => Some(QueueName::Cleanup),
            "notifications" => Some(QueueName::Notifications),
            "high_priority" => Some(QueueName::HighPriority),
            _ => None,
        }
    }

    pub fn all() -> [QueueName; 6] {
        [
            QueueName::Default,
            QueueName::Processing,
            QueueName::Validation,
            QueueName::Cleanup,
            QueueName::Notifications,
            QueueName::HighPriority,
        ]
    }
}

/// Task kinds routed onto the queues above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    ProcessGeotiff,
    ProcessZipArchive,
    CleanupOldJobs,
    UpdateProcessingStatistics,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::ProcessGeotiff => "process_geotiff",
            TaskType::ProcessZipArchive => "process_zip_archive",
            TaskType::CleanupOldJobs => "cleanup_old_jobs",
            TaskType::UpdateProcessingStatistics => "update_processing_statistics",
        }
    }

    /// Routing queue for a freshly enqueued task. Periodic housekeeping
    /// tasks (`cleanup_old_jobs`, `update_processing_statistics`) get
    /// their own queues so they never share a worker slot with user
    /// jobs.
    pub fn default_queue(&self) -> QueueName {
        match self {
            TaskType::ProcessGeotiff | TaskType::ProcessZipArchive => QueueName::Processing,
            TaskType::CleanupOldJobs => QueueName::Cleanup,
            TaskType::UpdateProcessingStatistics => QueueName::Default,
        }
    }

    /// Per-task-type time limit: GeoTIFF tasks get 30 minutes, ZIP
    /// archives (which may contain many rasters) get an hour, everything
    /// else is unbounded here and relies on the queue's default rate
    /// limit alone.
    pub fn time_limit_secs(&self, worker: &crate::config::WorkerConfig) -> Option<u64> {
        match self {
            TaskType::ProcessGeotiff => Some(worker.geotiff_time_limit_secs),
            TaskType::ProcessZipArchive => Some(worker.zip_time_limit_secs),
            _ => None,
        }
    }
}

/// A unit of work enqueued onto `task_queue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub queue: QueueName,
    pub task_type: TaskType,
    pub job_id: Option<String>,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub max_attempts: i32,
}
