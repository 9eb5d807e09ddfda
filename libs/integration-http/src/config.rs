use std::collections::HashSet;
use std::time::Duration;

use crate::error::HttpError;

/// Default User-Agent sent when the caller does not configure one
pub const DEFAULT_USER_AGENT: &str = "AI-Agent-Orchestration-Platform/1.0";

/// Default `Accept` header value
pub const DEFAULT_ACCEPT: &str = "application/json";

/// Default `Accept-Encoding` header value
pub const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate";

/// Statuses retried by default
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Hard ceiling applied to any computed backoff (one day)
pub const MAX_BACKOFF: Duration = Duration::from_secs(86_400);

/// What a finished attempt looked like, from the retry policy's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RetryTrigger {
    /// Transport-level errors (connection refused, DNS failure, reset, etc.)
    TransportError,
    /// A single attempt exceeded the per-attempt timeout
    Timeout,
    /// Specific HTTP status code
    Status(u16),
    /// Error that is never retryable (rate-limit lockout, deadline, cancellation, ...)
    NonRetryable,
}

impl RetryTrigger {
    /// HTTP 429 Too Many Requests
    pub const TOO_MANY_REQUESTS: Self = Self::Status(429);
    /// HTTP 500 Internal Server Error
    pub const INTERNAL_SERVER_ERROR: Self = Self::Status(500);
    /// HTTP 502 Bad Gateway
    pub const BAD_GATEWAY: Self = Self::Status(502);
    /// HTTP 503 Service Unavailable
    pub const SERVICE_UNAVAILABLE: Self = Self::Status(503);
    /// HTTP 504 Gateway Timeout
    pub const GATEWAY_TIMEOUT: Self = Self::Status(504);

    /// Classify a client error
    #[must_use]
    pub fn from_error(err: &HttpError) -> Self {
        match err {
            HttpError::Transport(_) | HttpError::Tls(_) => Self::TransportError,
            HttpError::Timeout(_) => Self::Timeout,
            _ => Self::NonRetryable,
        }
    }
}

/// Exponential backoff configuration for retries
///
/// The delay before retry `n` (1-indexed) is `initial * multiplier^(n-1)`,
/// capped at `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Delay before the first retry (default: 1s)
    pub initial: Duration,

    /// Maximum backoff duration (default: one day)
    pub max: Duration,

    /// Backoff multiplier for exponential growth (default: 2.0)
    pub multiplier: f64,

    /// Add a random 0-25% on top of each delay (default: false)
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: MAX_BACKOFF,
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl ExponentialBackoff {
    /// Create backoff with custom initial delay and multiplier
    #[must_use]
    pub fn new(initial: Duration, multiplier: f64) -> Self {
        Self {
            initial,
            multiplier,
            ..Default::default()
        }
    }

    /// Create fast backoff for testing (1ms initial, 100ms max, no jitter)
    #[must_use]
    pub fn fast() -> Self {
        Self {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

/// Retry policy configuration
///
/// Transport errors and attempt timeouts are always retryable; statuses are
/// retried when listed in `retryable_statuses`. A 429 carrying `Retry-After`
/// is retried after exactly that delay unless `ignore_retry_after` is set.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt (0 = no retries, default: 3)
    /// Total attempts = 1 (initial) + `max_retries`
    pub max_retries: usize,

    /// Backoff strategy configuration
    pub backoff: ExponentialBackoff,

    /// HTTP statuses that trigger a retry (default: 429, 500, 502, 503, 504)
    pub retryable_statuses: HashSet<u16>,

    /// If true, ignore the `Retry-After` HTTP header and always use backoff policy.
    pub ignore_retry_after: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: ExponentialBackoff::default(),
            retryable_statuses: HashSet::from(DEFAULT_RETRYABLE_STATUSES),
            ignore_retry_after: false,
        }
    }
}

impl RetryConfig {
    /// Create config with no retries
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Whether the trigger is retryable at all, ignoring the attempt budget
    #[must_use]
    pub fn is_retryable(&self, trigger: RetryTrigger) -> bool {
        match trigger {
            RetryTrigger::TransportError | RetryTrigger::Timeout => true,
            RetryTrigger::Status(code) => self.retryable_statuses.contains(&code),
            RetryTrigger::NonRetryable => false,
        }
    }
}

/// Client-side fixed-window rate limit
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Whether the window is enforced (default: true).
    ///
    /// A server-imposed lockout (`429` + `Retry-After`) is honoured even when
    /// this is `false`.
    pub enabled: bool,

    /// Window length (default: 60s)
    pub window: Duration,

    /// Calls admitted per window (default: 60)
    pub max_calls: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: Duration::from_secs(60),
            max_calls: 60,
        }
    }
}

impl RateLimitConfig {
    /// Create config with the window disabled
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Create config admitting `max_calls` per `window`
    #[must_use]
    pub fn per_window(max_calls: u32, window: Duration) -> Self {
        Self {
            enabled: true,
            window,
            max_calls,
        }
    }
}

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native certificate store
    Native,
}

/// Transport security configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Only `https` base URLs are accepted (default)
    #[default]
    TlsOnly,
    /// Plain `http` base URLs are accepted as well
    ///
    /// A warning is logged when a client is built in this mode.
    AllowInsecureHttp,
}

/// Complete configuration of an [`IntegrationClient`](crate::IntegrationClient)
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-attempt timeout (default: 30s)
    pub request_timeout: Duration,

    /// Default budget for a whole call, retries and waits included (default: none)
    ///
    /// A per-call `SendOptions::timeout` overrides it.
    pub total_timeout: Option<Duration>,

    /// Maximum response body size in bytes (default: 10 MiB)
    pub max_body_size: usize,

    /// User-Agent header value
    pub user_agent: String,

    /// Retry policy
    pub retry: RetryConfig,

    /// Client-side rate limit
    pub rate_limit: RateLimitConfig,

    /// Headers added to every request unless the request already carries them
    pub default_headers: Vec<(String, String)>,

    /// Transport security mode (default: `TlsOnly`)
    pub transport: TransportSecurity,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Timeout for idle pooled connections (default: 90s)
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host (default: 32)
    pub pool_max_idle_per_host: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            total_timeout: None,
            max_body_size: 10 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            default_headers: Vec::new(),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl ClientConfig {
    /// Create configuration for testing with mock servers
    ///
    /// Allows plain HTTP, uses a fast backoff and disables the rate limit.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            retry: RetryConfig {
                backoff: ExponentialBackoff::fast(),
                ..RetryConfig::default()
            },
            rate_limit: RateLimitConfig::disabled(),
            transport: TransportSecurity::AllowInsecureHttp,
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 4,
            ..Self::default()
        }
    }

    /// Reject configurations that cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::InvalidConfig`] naming the offending setting.
    pub fn validate(&self) -> Result<(), HttpError> {
        if self.request_timeout.is_zero() {
            return Err(HttpError::InvalidConfig(
                "request timeout must be positive".to_owned(),
            ));
        }
        if self.total_timeout.is_some_and(|t| t.is_zero()) {
            return Err(HttpError::InvalidConfig(
                "total timeout must be positive".to_owned(),
            ));
        }

        let backoff = &self.retry.backoff;
        if !backoff.multiplier.is_finite() || backoff.multiplier < 0.0 {
            return Err(HttpError::InvalidConfig(format!(
                "retry multiplier must be a non-negative number, got {}",
                backoff.multiplier
            )));
        }
        if let Some(code) = self
            .retry
            .retryable_statuses
            .iter()
            .find(|code| !(100..=599).contains(*code))
        {
            return Err(HttpError::InvalidConfig(format!(
                "retryable status {code} is not an HTTP status code"
            )));
        }

        if self.rate_limit.enabled {
            if self.rate_limit.max_calls == 0 {
                return Err(HttpError::InvalidConfig(
                    "rate limit max calls must be at least 1".to_owned(),
                ));
            }
            if self.rate_limit.window.is_zero() {
                return Err(HttpError::InvalidConfig(
                    "rate limit window must be positive".to_owned(),
                ));
            }
        }

        Ok(())
    }
}
