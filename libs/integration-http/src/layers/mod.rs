//! Tower layers for the integration client middleware stack
//!
//! Outer to inner: [`RetryLayer`] → [`RateLimitLayer`] → per-attempt timeout
//! → transport. The rate limiter sits inside the retry loop so every attempt,
//! retries included, is counted against the window.

mod deadline;
mod rate_limit;
mod retry;

pub use deadline::CallDeadline;
pub use rate_limit::{Admission, RateLimitLayer, RateLimitService, RateLimitState, RateLimiter};
pub use retry::{
    AttemptOutcome, RETRY_ATTEMPT_HEADER, RetryDecision, RetryLayer, RetryPolicy, RetryService,
    calculate_backoff,
};
