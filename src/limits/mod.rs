pub mod circuit_breaker;
pub mod rate_limiter;

pub use circuit_breaker::{is_outage, BreakerConfig, BreakerState, CircuitBreaker};
pub use rate_limiter::{RateLimitStatus, RateLimiter, RateLimiterConfig};
