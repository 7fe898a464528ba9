use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Cooperative pacing: successive `acquire` calls return at least
/// `min_interval` apart. Not a concurrency limit.
pub struct RateLimiter {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        RateLimiter {
            min_interval,
            last: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                log::trace!("Pacing upstream call for {:?}", ready_at - Instant::now());
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        // SEC fair-access guidance is 10 requests per second
        Self::new(Duration::from_millis(100))
    }
}
