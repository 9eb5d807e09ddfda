use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderValue, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use rand::Rng;
use tower::{Layer, Service, ServiceExt};

use super::deadline::CallDeadline;
use crate::config::{ExponentialBackoff, MAX_BACKOFF, RetryConfig, RetryTrigger};
use crate::error::HttpError;
use crate::response::{ResponseBody, parse_retry_after};

/// Header name for retry attempt number (1-indexed).
/// Added to retried requests to indicate which retry attempt this is.
pub const RETRY_ATTEMPT_HEADER: &str = "X-Retry-Attempt";

/// Bytes of a discarded response body read before retrying, for connection reuse
const DRAIN_LIMIT: usize = 64 * 1024;

/// How an attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The server answered
    Response {
        status: u16,
        retry_after: Option<Duration>,
    },
    /// No answer
    Failed(RetryTrigger),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after `delay`
    Retry {
        delay: Duration,
        /// The delay came from a `Retry-After` header rather than the backoff
        from_retry_after: bool,
    },
    Stop,
}

/// Pure retry decision function over a [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Decide whether retry number `retry` (1-indexed) should happen after `outcome`.
    ///
    /// A `429` carrying `Retry-After` is retried after exactly that delay, ahead
    /// of the status list and the backoff.
    #[must_use]
    pub fn decide(&self, retry: usize, outcome: &AttemptOutcome) -> RetryDecision {
        if retry == 0 || retry > self.config.max_retries {
            return RetryDecision::Stop;
        }

        let trigger = match *outcome {
            AttemptOutcome::Response {
                status,
                retry_after: Some(wait),
            } if status == StatusCode::TOO_MANY_REQUESTS.as_u16()
                && !self.config.ignore_retry_after =>
            {
                return RetryDecision::Retry {
                    delay: wait.min(MAX_BACKOFF),
                    from_retry_after: true,
                };
            }
            AttemptOutcome::Response { status, .. } => RetryTrigger::Status(status),
            AttemptOutcome::Failed(trigger) => trigger,
        };

        if self.config.is_retryable(trigger) {
            RetryDecision::Retry {
                delay: self.backoff(retry),
                from_retry_after: false,
            }
        } else {
            RetryDecision::Stop
        }
    }

    /// Backoff before retry `retry` (1-indexed): `initial * multiplier^(retry-1)`
    #[must_use]
    pub fn backoff(&self, retry: usize) -> Duration {
        calculate_backoff(&self.config.backoff, retry.saturating_sub(1))
    }
}

/// Tower layer that re-runs failed attempts according to a [`RetryPolicy`]
#[derive(Clone)]
pub struct RetryLayer {
    policy: RetryPolicy,
}

impl RetryLayer {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            policy: self.policy.clone(),
        }
    }
}

/// Service that implements the retry loop.
///
/// Returns `Ok(Response)` for every status once retries stop, and `Err` for the
/// last transport/timeout error when they run out. When the request carries a
/// [`CallDeadline`] and the next wait would outlive it, the loop gives up with
/// [`HttpError::DeadlineExceeded`] without waiting.
#[derive(Clone)]
pub struct RetryService<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> Service<Request<Full<Bytes>>> for RetryService<S>
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
        // Each attempt drives readiness of its own clone of the inner service.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        let inner = self.inner.clone();
        let policy = self.policy.clone();
        let (parts, body) = req.into_parts();
        let deadline = parts.extensions.get::<CallDeadline>().copied();

        Box::pin(async move {
            let method = parts.method.clone();
            let host = parts
                .uri
                .authority()
                .map_or_else(|| "unknown".to_owned(), ToString::to_string);

            let mut retry = 0usize;
            loop {
                let mut req = Request::from_parts(parts.clone(), body.clone());
                if retry > 0
                    && let Ok(value) = HeaderValue::try_from(retry.to_string())
                {
                    req.headers_mut().insert(RETRY_ATTEMPT_HEADER, value);
                }

                let result = inner.clone().oneshot(req).await;
                let outcome = match &result {
                    Ok(resp) => AttemptOutcome::Response {
                        status: resp.status().as_u16(),
                        retry_after: parse_retry_after(resp.headers()),
                    },
                    Err(err) => AttemptOutcome::Failed(RetryTrigger::from_error(err)),
                };

                let RetryDecision::Retry {
                    delay,
                    from_retry_after,
                } = policy.decide(retry + 1, &outcome)
                else {
                    return result;
                };

                if let Some(deadline) = deadline
                    && !deadline.admits(delay)
                {
                    tracing::debug!(
                        method = %method,
                        host = %host,
                        delay_ms = delay.as_millis(),
                        remaining_ms = deadline.remaining().as_millis(),
                        "retry wait would outlive the call deadline"
                    );
                    return Err(deadline.exceeded());
                }

                match result {
                    Ok(resp) => {
                        tracing::debug!(
                            retry = retry + 1,
                            max_retries = policy.config.max_retries,
                            status = resp.status().as_u16(),
                            method = %method,
                            host = %host,
                            delay_ms = delay.as_millis(),
                            from_retry_after,
                            "retrying request after status code"
                        );
                        if let Err(e) = drain_response_body(resp, DRAIN_LIMIT).await {
                            tracing::debug!(
                                error = %e,
                                "failed to drain response body before retry; connection may not be reused"
                            );
                        }
                    }
                    Err(err) => {
                        tracing::debug!(
                            retry = retry + 1,
                            max_retries = policy.config.max_retries,
                            error = %err,
                            method = %method,
                            host = %host,
                            delay_ms = delay.as_millis(),
                            "retrying request after error"
                        );
                    }
                }

                tokio::time::sleep(delay).await;
                retry += 1;
            }
        })
    }
}

/// Read up to `limit` bytes of a discarded body so HTTP/1.1 connections can be reused.
async fn drain_response_body(
    response: Response<ResponseBody>,
    limit: usize,
) -> Result<(), HttpError> {
    let mut body = std::pin::pin!(response.into_body());
    let mut drained = 0usize;

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            drained += chunk.len();
            if drained >= limit {
                break;
            }
        }
    }

    Ok(())
}

/// Backoff for the given zero-based exponent: `initial * multiplier^exponent`.
///
/// NaN, infinite and negative inputs are sanitized; the result never exceeds
/// `backoff.max` (and never a day), jitter included.
#[must_use]
pub fn calculate_backoff(backoff: &ExponentialBackoff, exponent: usize) -> Duration {
    let max_total = MAX_BACKOFF.as_secs_f64();
    let exponent = i32::try_from(exponent).unwrap_or(i32::MAX);

    let multiplier = if backoff.multiplier.is_finite() && backoff.multiplier >= 0.0 {
        backoff.multiplier
    } else {
        1.0
    };
    let initial = backoff.initial.as_secs_f64();
    let max = backoff.max.as_secs_f64().min(max_total);

    let raw = initial * multiplier.powi(exponent);
    let clamped = if raw.is_finite() {
        raw.min(max).max(0.0)
    } else {
        max
    };
    let duration = Duration::from_secs_f64(clamped);

    let duration = if backoff.jitter {
        let factor = rand::rng().random_range(0.0..=0.25);
        duration + duration.mul_f64(factor)
    } else {
        duration
    };

    duration.min(Duration::from_secs_f64(max))
}
