use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct RateLimiterConfig {
    pub window: Duration,
    pub max_requests: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(60_000),
            max_requests: 20,
        }
    }
}

/// Sliding-window admission control keyed by identity.
///
/// Each identity owns an ordered list of admission timestamps. The list is
/// pruned to the trailing window under the lock on every call, so the
/// prune/check/append sequence is atomic with respect to concurrent callers.
pub struct RateLimiter {
    config: RateLimiterConfig,
    clock: Arc<dyn Clock>,
    history: Mutex<HashMap<String, VecDeque<u64>>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub identity: String,
    pub used: u32,
    pub remaining: u32,
    pub max_requests: u32,
    pub window_ms: u64,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            history: Mutex::new(HashMap::new()),
        }
    }

    fn window_ms(&self) -> u64 {
        self.config.window.as_millis() as u64
    }

    /// Admit or reject one unit of work for `identity`.
    pub fn consume(&self, identity: &str) -> Result<()> {
        let now = self.clock.now_millis();
        let window_ms = self.window_ms();
        let cutoff = now.saturating_sub(window_ms);

        let mut history = self.history.lock();
        let entries = history.entry(identity.to_string()).or_default();

        while entries.front().is_some_and(|&ts| ts < cutoff) {
            entries.pop_front();
        }

        if entries.len() >= self.config.max_requests as usize {
            let oldest = entries.front().copied().unwrap_or(now);
            let retry_after_ms = (oldest + window_ms).saturating_sub(now);

            warn!(
                "Rate limit hit for identity {} ({}/{} in {}ms), retry after {}ms",
                identity,
                entries.len(),
                self.config.max_requests,
                window_ms,
                retry_after_ms
            );

            return Err(Error::rate_limited(format!(
                "Rate limit exceeded. Maximum {} requests per {}ms window.",
                self.config.max_requests, window_ms
            ))
            .with_details(json!({
                "identity": identity,
                "maxRequests": self.config.max_requests,
                "windowMs": window_ms,
                "retryAfterMs": retry_after_ms,
            })));
        }

        entries.push_back(now);
        debug!(
            "Admitted request for {} ({}/{})",
            identity,
            entries.len(),
            self.config.max_requests
        );
        Ok(())
    }

    /// Read-only view of the current window for `identity`.
    pub fn status(&self, identity: &str) -> RateLimitStatus {
        let now = self.clock.now_millis();
        let cutoff = now.saturating_sub(self.window_ms());

        let used = self
            .history
            .lock()
            .get(identity)
            .map(|entries| entries.iter().filter(|&&ts| ts >= cutoff).count() as u32)
            .unwrap_or(0);

        RateLimitStatus {
            identity: identity.to_string(),
            used,
            remaining: self.config.max_requests.saturating_sub(used),
            max_requests: self.config.max_requests,
            window_ms: self.window_ms(),
        }
    }
}
