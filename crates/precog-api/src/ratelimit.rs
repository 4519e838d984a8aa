// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-IP token bucket: 60 requests per 60-second window.
//!
//! The bucket is a fixed window that replenishes in full when the window
//! rolls. A background sweeper prunes idle entries every two windows so the
//! map cannot grow without bound.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default bucket capacity per window.
pub const DEFAULT_MAX_REQUESTS: u32 = 60;

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

struct Bucket {
    window_start: Instant,
    used: u32,
}

/// Shared per-IP rate limiter.
#[derive(Clone)]
pub struct IpRateLimiter {
    buckets: Arc<Mutex<HashMap<String, Bucket>>>,
    max_requests: u32,
    window: Duration,
}

impl Default for IpRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

impl IpRateLimiter {
    /// Create a limiter allowing `max_requests` per `window` per IP.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    /// Take one token for `ip`.
    ///
    /// Returns `Err(retry_after_secs)` when the bucket is empty; the caller
    /// maps that to a 429 with a `Retry-After` header.
    pub fn check(&self, ip: &str) -> Result<(), u64> {
        let now = Instant::now();
        let Ok(mut buckets) = self.buckets.lock() else {
            return Ok(());
        };
        let bucket = buckets.entry(ip.to_string()).or_insert(Bucket {
            window_start: now,
            used: 0,
        });

        if now.duration_since(bucket.window_start) >= self.window {
            bucket.window_start = now;
            bucket.used = 0;
        }

        if bucket.used >= self.max_requests {
            let elapsed = now.duration_since(bucket.window_start);
            let retry_after = self.window.saturating_sub(elapsed).as_secs().max(1);
            return Err(retry_after);
        }

        bucket.used += 1;
        Ok(())
    }

    /// Drop entries whose window has been stale for two full windows.
    pub fn sweep(&self) {
        let now = Instant::now();
        let horizon = self.window * 2;
        if let Ok(mut buckets) = self.buckets.lock() {
            let before = buckets.len();
            buckets.retain(|_, b| now.duration_since(b.window_start) < horizon);
            let removed = before - buckets.len();
            if removed > 0 {
                debug!(removed, "rate limiter entries pruned");
            }
        }
    }

    /// Number of tracked IPs (for tests and metrics).
    #[must_use]
    pub fn tracked_ips(&self) -> usize {
        self.buckets.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// Spawn the background sweeper; runs every two windows for the life
    /// of the process.
    pub fn spawn_sweeper(&self) {
        let limiter = self.clone();
        let interval = self.window * 2;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiter.sweep();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_of_sixty_one_rejects_exactly_one() {
        let limiter = IpRateLimiter::new(60, Duration::from_secs(60));
        let mut rejected = 0;
        for _ in 0..61 {
            if limiter.check("10.0.0.1").is_err() {
                rejected += 1;
            }
        }
        assert_eq!(rejected, 1);
    }

    #[test]
    fn rejection_reports_retry_after() {
        let limiter = IpRateLimiter::new(1, Duration::from_secs(60));
        limiter.check("10.0.0.1").unwrap();
        let retry_after = limiter.check("10.0.0.1").unwrap_err();
        assert!(retry_after >= 1);
        assert!(retry_after <= 60);
    }

    #[test]
    fn ips_have_independent_buckets() {
        let limiter = IpRateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("10.0.0.1").is_ok());
        assert!(limiter.check("10.0.0.2").is_ok());
        assert!(limiter.check("10.0.0.1").is_err());
    }

    #[test]
    fn window_roll_replenishes_tokens() {
        let limiter = IpRateLimiter::new(2, Duration::from_millis(20));
        assert!(limiter.check("ip").is_ok());
        assert!(limiter.check("ip").is_ok());
        assert!(limiter.check("ip").is_err());
        std::thread::sleep(Duration::from_millis(25));
        assert!(limiter.check("ip").is_ok());
    }

    #[test]
    fn sweep_prunes_stale_entries_after_two_windows() {
        let limiter = IpRateLimiter::new(5, Duration::from_millis(10));
        limiter.check("a").unwrap();
        limiter.check("b").unwrap();
        assert_eq!(limiter.tracked_ips(), 2);

        std::thread::sleep(Duration::from_millis(25));
        limiter.sweep();
        assert_eq!(limiter.tracked_ips(), 0);
    }

    #[test]
    fn sweep_keeps_active_entries() {
        let limiter = IpRateLimiter::new(5, Duration::from_secs(60));
        limiter.check("active").unwrap();
        limiter.sweep();
        assert_eq!(limiter.tracked_ips(), 1);
    }
}
