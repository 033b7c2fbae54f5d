use parking_lot::RwLock;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{Error, ErrorCode, Result};

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open { opened_at_ms: u64 },
    /// One trial call is in flight; a trial that never settles expires
    /// after the recovery timeout.
    HalfOpen { trial_started_ms: u64 },
}

/// Whether a failed call says something about the vendor's health.
///
/// Rejections of the caller's own request (4xx other than 429) are not
/// outages and must not trip the breaker for every other caller.
pub fn is_outage(err: &Error) -> bool {
    let external_status = err
        .details()
        .and_then(|details| details.get("externalStatusCode"))
        .and_then(Value::as_u64);

    match external_status {
        Some(status) => status >= 500 || status == 429,
        None => !matches!(err.code(), ErrorCode::InvalidInput),
    }
}

/// Fails vendor calls fast after repeated consecutive failures.
///
/// One breaker guards one vendor's outbound HTTP. While open, calls are
/// rejected with `PROVIDER_UNAVAILABLE` without touching the network; once
/// the recovery timeout elapses a single call is let through half-open and
/// its outcome closes or re-opens the circuit. Only failures classified by
/// [`is_outage`] count toward the threshold.
pub struct CircuitBreaker {
    vendor: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    state: RwLock<BreakerState>,
    failure_count: AtomicU32,
}

impl CircuitBreaker {
    pub fn new(vendor: impl Into<String>, config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let vendor = vendor.into();
        debug!(
            "Creating circuit breaker for {} (threshold {}, recovery {:?})",
            vendor, config.failure_threshold, config.recovery_timeout
        );

        Self {
            vendor,
            config,
            clock,
            state: RwLock::new(BreakerState::Closed),
            failure_count: AtomicU32::new(0),
        }
    }

    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.admit()?;

        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) if is_outage(&err) => {
                self.on_failure();
                Err(err)
            }
            Err(err) => {
                // The vendor answered; the request itself was refused.
                debug!(
                    "{} rejected the request ({}), not counted as an outage",
                    self.vendor,
                    err.code()
                );
                self.on_success();
                Err(err)
            }
        }
    }

    fn unavailable(&self, retry_after_ms: u64) -> Error {
        Error::provider_unavailable(format!(
            "{} is temporarily unavailable after repeated failures",
            self.vendor
        ))
        .with_details(json!({
            "vendor": self.vendor,
            "retryAfterMs": retry_after_ms,
        }))
    }

    fn admit(&self) -> Result<()> {
        let now = self.clock.now_millis();
        let recovery_ms = self.config.recovery_timeout.as_millis() as u64;
        let mut state = self.state.write();

        match *state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open { opened_at_ms: since }
            | BreakerState::HalfOpen {
                trial_started_ms: since,
            } => {
                let elapsed = now.saturating_sub(since);
                if elapsed < recovery_ms {
                    debug!("Circuit for {} is {:?}, rejecting call", self.vendor, *state);
                    return Err(self.unavailable(recovery_ms - elapsed));
                }
                *state = BreakerState::HalfOpen {
                    trial_started_ms: now,
                };
                info!("Circuit for {} half-open, allowing trial call", self.vendor);
                Ok(())
            }
        }
    }

    fn on_success(&self) {
        self.failure_count.store(0, Ordering::SeqCst);
        let mut state = self.state.write();
        if *state != BreakerState::Closed {
            info!("Circuit for {} recovered", self.vendor);
            *state = BreakerState::Closed;
        }
    }

    fn on_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write();

        let reopen = matches!(*state, BreakerState::HalfOpen { .. });
        if reopen || failures >= self.config.failure_threshold {
            if !matches!(*state, BreakerState::Open { .. }) {
                warn!(
                    "Circuit for {} opened after {} consecutive failures",
                    self.vendor, failures
                );
            }
            *state = BreakerState::Open {
                opened_at_ms: self.clock.now_millis(),
            };
        }
    }

    pub fn state(&self) -> BreakerState {
        *self.state.read()
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::SeqCst)
    }
}
