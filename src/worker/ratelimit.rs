use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::WorkerConfig;
use crate::queue::TaskType;

/// Simple token bucket, refilled continuously at `rate_per_sec`.
/// Mirrors the effect of Celery's per-task `rate_limit` setting
/// without needing a broker.
pub struct RateLimiter {
    rate_per_sec: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(rate_per_sec: u32) -> Self {
        let rate_per_sec = rate_per_sec.max(1) as f64;
        Self {
            rate_per_sec,
            capacity: rate_per_sec,
            state: Mutex::new(BucketState {
                tokens: rate_per_sec,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Block until a token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.rate_per_sec).min(self.capacity);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - state.tokens;
                    Some(Duration::from_secs_f64(deficit / self.rate_per_sec))
                }
            };

            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}

/// One rate limiter per task type rather than per queue: `process_geotiff`
/// and `process_zip_archive` share the `processing` queue (and, under
/// `priority=high`, `high_priority` too), so throttling at the queue
/// level would let one task type's traffic borrow the other's budget.
/// Keying by task type instead means each keeps its own bucket no
/// matter which queue delivered it.
pub struct RateLimiters {
    geotiff: RateLimiter,
    zip: RateLimiter,
    default: RateLimiter,
}

impl RateLimiters {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            geotiff: RateLimiter::new(config.geotiff_rate_per_sec),
            zip: RateLimiter::new(config.zip_rate_per_sec),
            default: RateLimiter::new(config.default_rate_per_sec),
        }
    }

    pub fn for_task(&self, task_type: TaskType) -> &RateLimiter {
        match task_type {
            TaskType::ProcessGeotiff => &self.geotiff,
            TaskType::ProcessZipArchive => &self.zip,
            TaskType::CleanupOldJobs | TaskType::UpdateProcessingStatistics => &self.default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_does_not_block_within_capacity() {
        let limiter = RateLimiter::new(5);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn rate_limiters_key_geotiff_and_zip_independently() {
        let limiters = RateLimiters::new(&WorkerConfig {
            geotiff_rate_per_sec: 5,
            zip_rate_per_sec: 3,
            ..WorkerConfig::default()
        });
        assert_eq!(limiters.for_task(TaskType::ProcessGeotiff).rate_per_sec, 5.0);
        assert_eq!(limiters.for_task(TaskType::ProcessZipArchive).rate_per_sec, 3.0);
    }
}
