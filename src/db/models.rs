use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Job lifecycle states. Terminal states are `Completed`, `Failed`,
/// `Cancelled`; only `Queued` and `Processing` may be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Layer lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerStatus {
    Pending,
    Processing,
    Processed,
    Error,
}

impl LayerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerStatus::Pending => "pending",
            LayerStatus::Processing => "processing",
            LayerStatus::Processed => "processed",
            LayerStatus::Error => "error",
        }
    }
}

/// Row in `processing_jobs`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProcessingJob {
    pub id: String,
    pub layer_id: String,
    pub status: String,
    pub progress: i32,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row in `gis_layers`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GisLayer {
    pub id: String,
    pub filename: Option<String>,
    pub status: String,
    pub image_url: Option<String>,
    pub cog_url: Option<String>,
    pub bounds_wgs84: Option<serde_json::Value>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub crs: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate row produced by `update_processing_statistics` and used by
/// `/queue/status`'s `job_counts_24h`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
    pub avg_duration_secs: Option<f64>,
}
