use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub s3: S3Config,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_environment")]
    pub environment: String,
}

// Custom Debug implementation to prevent secrets from being logged
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("s3", &self.s3)
            .field("worker", &self.worker)
            .field("base_url", &self.base_url)
            .field("environment", &self.environment)
            .finish()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_environment() -> String {
    "production".to_string()
}

#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

// Custom Debug implementation to redact database URL (may contain password)
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Clone, Deserialize)]
pub struct S3Config {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
}

fn default_bucket() -> String {
    "binaa-layers".to_string()
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            bucket: default_bucket(),
            region: None,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

// Custom Debug implementation to redact S3 credentials
impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field(
                "access_key_id",
                &self.access_key_id.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Worker runtime knobs: rate limits, time limits, retries and
/// periodic task intervals.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_broker_url")]
    pub broker_url: String,
    #[serde(default = "default_result_backend")]
    pub result_backend: String,
    #[serde(default = "default_geotiff_rate_per_sec")]
    pub geotiff_rate_per_sec: u32,
    #[serde(default = "default_zip_rate_per_sec")]
    pub zip_rate_per_sec: u32,
    #[serde(default = "default_rate_per_sec")]
    pub default_rate_per_sec: u32,
    #[serde(default = "default_geotiff_time_limit_secs")]
    pub geotiff_time_limit_secs: u64,
    #[serde(default = "default_zip_time_limit_secs")]
    pub zip_time_limit_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_max_tasks_per_worker")]
    pub max_tasks_per_worker: u32,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
    #[serde(default = "default_job_retention_days")]
    pub job_retention_days: i64,
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
    #[serde(default = "default_claim_staleness_secs")]
    pub claim_staleness_secs: u64,
}

fn default_broker_url() -> String {
    "redis://localhost:6379/0".to_string()
}
fn default_result_backend() -> String {
    "redis://localhost:6379/0".to_string()
}
fn default_geotiff_rate_per_sec() -> u32 {
    5
}
fn default_zip_rate_per_sec() -> u32 {
    3
}
fn default_rate_per_sec() -> u32 {
    10
}
fn default_geotiff_time_limit_secs() -> u64 {
    30 * 60
}
fn default_zip_time_limit_secs() -> u64 {
    60 * 60
}
fn default_max_retries() -> i32 {
    3
}
fn default_retry_delay_secs() -> u64 {
    60
}
fn default_max_tasks_per_worker() -> u32 {
    100
}
fn default_cleanup_interval_secs() -> u64 {
    3600
}
fn default_stats_interval_secs() -> u64 {
    300
}
fn default_job_retention_days() -> i64 {
    7
}
fn default_reaper_interval_secs() -> u64 {
    120
}
/// Past the longest task time limit (ZIP archives, 60 min) plus a
/// safety margin, so the reaper never races a still-running task.
fn default_claim_staleness_secs() -> u64 {
    3900
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            broker_url: default_broker_url(),
            result_backend: default_result_backend(),
            geotiff_rate_per_sec: default_geotiff_rate_per_sec(),
            zip_rate_per_sec: default_zip_rate_per_sec(),
            default_rate_per_sec: default_rate_per_sec(),
            geotiff_time_limit_secs: default_geotiff_time_limit_secs(),
            zip_time_limit_secs: default_zip_time_limit_secs(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            max_tasks_per_worker: default_max_tasks_per_worker(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            stats_interval_secs: default_stats_interval_secs(),
            job_retention_days: default_job_retention_days(),
            reaper_interval_secs: default_reaper_interval_secs(),
            claim_staleness_secs: default_claim_staleness_secs(),
        }
    }
}

impl Config {
    /// Load configuration from `config.toml` (if present), then layer
    /// environment variables on top. Beyond the `GEOINGEST__*` prefixed
    /// overrides, a handful of service-specific variables
    /// (`DATABASE_URL`, `MINIO_*`, `CELERY_*`, `ENVIRONMENT`) are mapped
    /// in explicitly for operational compatibility with existing
    /// deployment env files.
    pub fn load() -> Result<Arc<Self>, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config").required(false));

        if let Ok(url) = std::env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", url)?;
        }
        if let Ok(bucket) = std::env::var("MINIO_BUCKET") {
            builder = builder.set_override("s3.bucket", bucket)?;
        }
        if let Ok(endpoint) = std::env::var("MINIO_ENDPOINT") {
            let endpoint = if endpoint.starts_with("http") {
                endpoint
            } else {
                format!("http://{endpoint}")
            };
            builder = builder.set_override("s3.endpoint", endpoint)?;
        }
        if let Ok(key) = std::env::var("MINIO_ACCESS_KEY") {
            builder = builder.set_override("s3.access_key_id", key)?;
        }
        if let Ok(secret) = std::env::var("MINIO_SECRET_KEY") {
            builder = builder.set_override("s3.secret_access_key", secret)?;
        }
        if let Ok(broker) = std::env::var("CELERY_BROKER_URL") {
            builder = builder.set_override("worker.broker_url", broker)?;
        }
        if let Ok(backend) = std::env::var("CELERY_RESULT_BACKEND") {
            builder = builder.set_override("worker.result_backend", backend)?;
        }
        if let Ok(env) = std::env::var("ENVIRONMENT") {
            builder = builder.set_override("environment", env)?;
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("GEOINGEST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Config = config.try_deserialize()?;
        Ok(Arc::new(settings))
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(default_host(), "0.0.0.0");
        assert_eq!(default_port(), 8080);
        assert_eq!(default_bucket(), "binaa-layers");
    }

    #[test]
    fn worker_defaults_are_stable() {
        let w = WorkerConfig::default();
        assert_eq!(w.geotiff_rate_per_sec, 5);
        assert_eq!(w.zip_rate_per_sec, 3);
        assert_eq!(w.default_rate_per_sec, 10);
        assert_eq!(w.geotiff_time_limit_secs, 1800);
        assert_eq!(w.zip_time_limit_secs, 3600);
        assert_eq!(w.max_retries, 3);
        assert_eq!(w.retry_delay_secs, 60);
        assert_eq!(w.max_tasks_per_worker, 100);
        assert_eq!(w.cleanup_interval_secs, 3600);
        assert_eq!(w.stats_interval_secs, 300);
        assert_eq!(w.job_retention_days, 7);
        assert_eq!(w.reaper_interval_secs, 120);
        assert_eq!(w.claim_staleness_secs, 3900);
    }
}
