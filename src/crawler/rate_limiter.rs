//! Rate limiter for pacing page requests within one crawl run
//!
//! The limiter holds a single piece of shared state, the count of consecutive
//! throttling responses, which models how much load the server currently tolerates.
//! One limiter is created per crawl run and handed to the batch driver; every page
//! task calls [`RateLimiter::wait`] with its last status code before releasing its
//! concurrency slot.

use crate::config::RateLimitConfig;
use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Status codes that signal the server wants us to slow down
const THROTTLE_STATUSES: [u16; 2] = [429, 503];

/// Adaptive pacing between pages
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    consecutive_throttles: AtomicU32,
}

impl RateLimiter {
    /// Creates a limiter for a new crawl run
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            consecutive_throttles: AtomicU32::new(0),
        }
    }

    /// Number of throttling responses seen in a row
    pub fn consecutive_throttles(&self) -> u32 {
        self.consecutive_throttles.load(Ordering::SeqCst)
    }

    /// Records the last status code and returns how long to pause
    ///
    /// On 429/503 the throttle counter is incremented and the pause is
    /// `min(base × 2^counter, cap)`. Any other status (or none) resets the counter and
    /// yields a uniformly random politeness delay between the configured bounds.
    pub fn next_delay(&self, last_status: Option<u16>) -> Duration {
        if last_status.is_some_and(|status| THROTTLE_STATUSES.contains(&status)) {
            let count = self.consecutive_throttles.fetch_add(1, Ordering::SeqCst) + 1;
            let backoff = self.config.throttle_base_secs as f64 * 2f64.powi(count.min(16) as i32);
            let delay = backoff.min(self.config.throttle_cap_secs as f64);
            tracing::warn!(
                "Server is throttling ({} in a row), pausing {:.0}s",
                count,
                delay
            );
            return Duration::from_secs_f64(delay);
        }

        self.consecutive_throttles.store(0, Ordering::SeqCst);
        self.politeness_delay()
    }

    /// Pauses before the next request
    pub async fn wait(&self, last_status: Option<u16>) {
        let delay = self.next_delay(last_status);
        tracing::trace!("Rate limiter sleeping {:?}", delay);
        tokio::time::sleep(delay).await;
    }

    fn politeness_delay(&self) -> Duration {
        let (min, max) = (self.config.min_delay_ms, self.config.max_delay_ms);
        if min >= max {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
