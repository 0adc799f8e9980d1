//! Per-host request limiting
//!
//! The [`HostRateLimiter`] is the one piece of state shared by every validator
//! and scraper worker. Each host gets:
//! - a counting semaphore bounding concurrent requests to that host, and
//! - a token bucket bounding the sustained request rate.
//!
//! Both are independent of the global worker pool, so twenty workers checking
//! twenty URLs on the same site still reach it at most
//! `max_concurrent_per_host` at a time.

use crate::config::HostLimitConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Simple token bucket
struct TokenBucket {
    /// Available tokens
    tokens: f64,
    /// Last refill time
    last_refill: Instant,
    /// Tokens per second (0 = unlimited)
    rate: f64,
    /// Maximum burst size
    capacity: f64,
}

impl TokenBucket {
    fn new(rate: f64, capacity: u32) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
            rate,
            capacity,
        }
    }

    /// Take one token, or report how long to wait for the next one
    fn try_consume(&mut self, now: Instant) -> Option<Duration> {
        if self.rate <= 0.0 {
            return None;
        }

        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            Some(Duration::from_secs_f64((1.0 - self.tokens) / self.rate))
        }
    }
}

struct HostSlot {
    permits: Arc<Semaphore>,
    bucket: Mutex<TokenBucket>,
}

/// Limiter shared across all workers of a run
///
/// Cloning is cheap; all clones share the same per-host state.
#[derive(Clone)]
pub struct HostRateLimiter {
    config: HostLimitConfig,
    hosts: Arc<Mutex<HashMap<String, Arc<HostSlot>>>>,
}

/// Held for the duration of one request; releases the host slot on drop
#[derive(Debug)]
pub struct HostPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl HostRateLimiter {
    /// Create a limiter from configuration
    pub fn new(config: HostLimitConfig) -> Self {
        Self {
            config,
            hosts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wait until a request to `host` is allowed
    ///
    /// Host names are compared case-insensitively.
    pub async fn acquire(&self, host: &str) -> HostPermit {
        let slot = self.slot(host);

        // The semaphore is owned by the slot and never closed
        let permit = slot.permits.clone().acquire_owned().await.ok();

        loop {
            let wait = match slot.bucket.lock() {
                Ok(mut bucket) => bucket.try_consume(Instant::now()),
                Err(poisoned) => poisoned.into_inner().try_consume(Instant::now()),
            };
            match wait {
                None => break,
                Some(delay) => {
                    tracing::trace!(host, delay_ms = delay.as_millis() as u64, "Host rate limited");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        HostPermit { _permit: permit }
    }

    /// Number of hosts seen so far
    #[cfg(test)]
    fn tracked_hosts(&self) -> usize {
        match self.hosts.lock() {
            Ok(hosts) => hosts.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn slot(&self, host: &str) -> Arc<HostSlot> {
        let key = host.to_ascii_lowercase();
        let mut hosts = match self.hosts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        hosts
            .entry(key)
            .or_insert_with(|| {
                Arc::new(HostSlot {
                    permits: Arc::new(Semaphore::new(self.config.max_concurrent_per_host.max(1))),
                    bucket: Mutex::new(TokenBucket::new(
                        self.config.requests_per_second,
                        self.config.burst,
                    )),
                })
            })
            .clone()
    }
}
