#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Resilient HTTP client for third-party integrations
//!
//! An [`IntegrationClient`] is bound to one base URL and adds, on top of a
//! hyper/rustls transport:
//! - a [`TransformPipeline`] that fills in default headers and `Content-Type`
//! - pluggable [`AuthStrategy`] (API key, OAuth2, Basic, Bearer)
//! - retries with exponential backoff that honour `Retry-After`
//! - a client-side fixed-window [`RateLimiter`] and server-imposed lockouts
//! - per-attempt timeouts, per-call deadlines and cancellation
//! - transparent response decompression, bounded body reads and a
//!   [`NormalizedResponse`] that treats every HTTP status as a value
//!
//! # Example
//!
//! ```ignore
//! use integration_http::{AuthStrategy, IntegrationClient, SendOptions};
//!
//! let client = IntegrationClient::builder("https://slack.com/api/")
//!     .auth(AuthStrategy::bearer(token))
//!     .build()?;
//!
//! let response = client.post("auth.test", SendOptions::default()).await?;
//! if response.is_success() {
//!     println!("{:?}", response.json());
//! }
//! ```

mod auth;
mod builder;
mod client;
mod config;
mod error;
mod layers;
mod request;
mod response;
pub mod secret;
#[cfg(test)]
mod test_support;
mod tls;
mod transform;

pub use auth::{ApiKeyAuth, AuthStrategy, DEFAULT_API_KEY_NAME};
pub use builder::{HttpService, IntegrationClientBuilder};
pub use client::IntegrationClient;
pub use config::{
    ClientConfig, DEFAULT_ACCEPT, DEFAULT_ACCEPT_ENCODING, DEFAULT_RETRYABLE_STATUSES,
    DEFAULT_USER_AGENT, ExponentialBackoff, MAX_BACKOFF, RateLimitConfig, RetryConfig,
    RetryTrigger, TlsRootConfig, TransportSecurity,
};
pub use error::{HttpError, InvalidUriKind};
pub use layers::{
    Admission, AttemptOutcome, CallDeadline, RETRY_ATTEMPT_HEADER, RateLimitLayer,
    RateLimitService, RateLimitState, RateLimiter, RetryDecision, RetryLayer, RetryPolicy,
    RetryService, calculate_backoff,
};
pub use request::{DraftRequest, FilePart, FormData, SendOptions, parse_base_url, resolve_url};
pub use response::{NormalizedResponse, ResponseBody, ResponseData, parse_retry_after};
pub use secret::SecretString;
pub use transform::{ContentTypeInference, DefaultHeaders, RequestTransform, TransformPipeline};
