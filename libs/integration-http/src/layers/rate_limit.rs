use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use parking_lot::Mutex;
use tokio::time::Instant;
use tower::{Layer, Service, ServiceExt};

use super::deadline::CallDeadline;
use crate::config::{MAX_BACKOFF, RateLimitConfig};
use crate::error::HttpError;
use crate::response::{ResponseBody, parse_retry_after};

/// Window counters and server-imposed lockout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    /// Opened by the first admitted call, `None` until then
    pub window_start: Option<Instant>,
    pub calls_in_window: u32,
    /// Set after a `429` with `Retry-After`
    pub lock_until: Option<Instant>,
}

/// Outcome of a single admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call was counted and may proceed
    Proceed,
    /// The window is full; try again after this long
    Wait(Duration),
    /// The server locked us out for this long
    LockedOut(Duration),
}

/// Fixed-window limiter shared by every call of one client.
///
/// Check-and-increment happens under one lock, so concurrent callers never
/// push `calls_in_window` past `max_calls`. Waiting happens outside the lock.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<RateLimitState>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RateLimitState {
                window_start: None,
                calls_in_window: 0,
                lock_until: None,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    #[must_use]
    pub fn snapshot(&self) -> RateLimitState {
        *self.state.lock()
    }

    /// Decide admission for one call without waiting.
    #[must_use]
    pub fn try_acquire(&self) -> Admission {
        let now = Instant::now();
        let mut state = self.state.lock();

        if let Some(until) = state.lock_until {
            if now < until {
                return Admission::LockedOut(until - now);
            }
            state.lock_until = None;
        }

        if !self.config.enabled {
            return Admission::Proceed;
        }

        let elapsed = match state.window_start {
            Some(start) if now.saturating_duration_since(start) < self.config.window => {
                now.saturating_duration_since(start)
            }
            _ => {
                state.window_start = Some(now);
                state.calls_in_window = 0;
                Duration::ZERO
            }
        };

        if state.calls_in_window < self.config.max_calls {
            state.calls_in_window += 1;
            Admission::Proceed
        } else {
            Admission::Wait(self.config.window.saturating_sub(elapsed))
        }
    }

    /// Wait for a slot.
    ///
    /// # Errors
    ///
    /// [`HttpError::RateLimited`] during a lockout, and
    /// [`HttpError::DeadlineExceeded`] when the wait would outlive `deadline`.
    pub async fn acquire(&self, deadline: Option<CallDeadline>) -> Result<(), HttpError> {
        loop {
            match self.try_acquire() {
                Admission::Proceed => return Ok(()),
                Admission::LockedOut(retry_in) => {
                    return Err(HttpError::RateLimited { retry_in });
                }
                Admission::Wait(wait) => {
                    if let Some(deadline) = deadline
                        && !deadline.admits(wait)
                    {
                        return Err(deadline.exceeded());
                    }
                    tracing::debug!(
                        wait_ms = wait.as_millis(),
                        max_calls = self.config.max_calls,
                        "rate limit window full, waiting for the next one"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Refuse all calls for `duration`. A longer existing lockout is kept.
    pub fn lock_out(&self, duration: Duration) {
        let until = Instant::now() + duration.min(MAX_BACKOFF);
        let mut state = self.state.lock();
        if state.lock_until.is_none_or(|current| current < until) {
            state.lock_until = Some(until);
        }
        drop(state);
        tracing::warn!(
            retry_after_secs = duration.as_secs_f64(),
            "remote service rate limit hit, locking out client"
        );
    }
}

/// Tower layer gating each attempt on a shared [`RateLimiter`]
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
}

impl RateLimitLayer {
    #[must_use]
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// Admits attempts through the limiter and records server lockouts.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
}

impl<S> Service<Request<Full<Bytes>>> for RateLimitService<S>
where
    S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
{
    type Response = S::Response;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness of the inner service is awaited after admission.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        let inner = self.inner.clone();
        let limiter = self.limiter.clone();

        Box::pin(async move {
            let deadline = req.extensions().get::<CallDeadline>().copied();
            limiter.acquire(deadline).await?;

            let response = inner.oneshot(req).await?;
            if response.status() == StatusCode::TOO_MANY_REQUESTS
                && let Some(retry_after) = parse_retry_after(response.headers())
            {
                limiter.lock_out(retry_after);
            }
            Ok(response)
        })
    }
}
