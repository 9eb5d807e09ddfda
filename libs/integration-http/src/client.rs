use std::sync::Arc;
use std::time::Duration;

use http::Method;
use tower::ServiceExt;
use url::Url;

use crate::auth::AuthStrategy;
use crate::builder::{HttpService, IntegrationClientBuilder};
use crate::config::TransportSecurity;
use crate::error::HttpError;
use crate::layers::{CallDeadline, RateLimiter};
use crate::request::{DraftRequest, SendOptions, encode_request};
use crate::response::{NormalizedResponse, normalize};
use crate::transform::TransformPipeline;

/// Resilient HTTP client bound to one remote service.
///
/// Every call runs the transform pipeline, applies authentication, then goes
/// through the retry loop, the client-side rate limiter and the per-attempt
/// timeout. Non-2xx statuses come back as [`NormalizedResponse`] values; only
/// failures to obtain a response are errors.
///
/// `IntegrationClient` is `Clone + Send + Sync`; clones share the rate limiter
/// and connection pool.
#[derive(Clone)]
pub struct IntegrationClient {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) base_url: Url,
    pub(crate) service: HttpService,
    pub(crate) pipeline: TransformPipeline,
    pub(crate) auth: Option<AuthStrategy>,
    pub(crate) limiter: Arc<RateLimiter>,
    pub(crate) max_body_size: usize,
    pub(crate) total_timeout: Option<Duration>,
    pub(crate) transport_security: TransportSecurity,
}

impl std::fmt::Debug for IntegrationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("auth", &self.inner.auth)
            .field("pipeline", &self.inner.pipeline)
            .field("max_body_size", &self.inner.max_body_size)
            .field("total_timeout", &self.inner.total_timeout)
            .finish_non_exhaustive()
    }
}

impl IntegrationClient {
    /// Create a builder for a client rooted at `base_url`
    pub fn builder(base_url: impl Into<String>) -> IntegrationClientBuilder {
        IntegrationClientBuilder::new(base_url)
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// The limiter shared by all clones of this client
    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    /// Send one logical call.
    ///
    /// # Errors
    ///
    /// - request construction errors (bad headers, bad path, encoding) before anything is sent
    /// - [`HttpError::Transport`], [`HttpError::Tls`] or [`HttpError::Timeout`] once retries are exhausted
    /// - [`HttpError::RateLimited`] while the server's lockout is active
    /// - [`HttpError::DeadlineExceeded`] when the call budget runs out
    /// - [`HttpError::Cancelled`] when the cancellation token fires
    /// - [`HttpError::BodyTooLarge`] when the response exceeds the size limit
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        mut options: SendOptions,
    ) -> Result<NormalizedResponse, HttpError> {
        let cancel = options.cancel.take().unwrap_or_default();
        let budget = options.timeout.take().or(self.inner.total_timeout);

        let mut draft = DraftRequest::from_options(method, path, options)?;
        self.inner.pipeline.apply(&mut draft)?;
        if let Some(auth) = &self.inner.auth {
            auth.apply(&mut draft)?;
        }

        let mut request = encode_request(draft, &self.inner.base_url, self.inner.transport_security)?;
        let deadline = budget.map(CallDeadline::after);
        if let Some(deadline) = deadline {
            request.extensions_mut().insert(deadline);
        }

        let method = request.method().clone();
        let url = request.uri().to_string();
        tracing::debug!(method = %method, url = %url, "sending integration request");

        let exchange = self.exchange(request, url.clone(), deadline);
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(HttpError::Cancelled),
            result = exchange => result,
        };

        match &result {
            Ok(response) => tracing::debug!(
                method = %method,
                url = %url,
                status = response.status_code(),
                "integration request completed"
            ),
            Err(err) => tracing::warn!(
                method = %method,
                url = %url,
                error = %err,
                "integration request failed"
            ),
        }
        result
    }

    async fn exchange(
        &self,
        request: http::Request<http_body_util::Full<bytes::Bytes>>,
        url: String,
        deadline: Option<CallDeadline>,
    ) -> Result<NormalizedResponse, HttpError> {
        let service = self.inner.service.clone();
        let limit = self.inner.max_body_size;
        let call = async move {
            let response = service.oneshot(request).await?;
            normalize(response, url, limit).await
        };

        match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline.at(), call)
                .await
                .unwrap_or_else(|_| Err(deadline.exceeded())),
            None => call.await,
        }
    }

    /// `GET` convenience wrapper around [`send`](Self::send).
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn get(&self, path: &str, options: SendOptions) -> Result<NormalizedResponse, HttpError> {
        self.send(Method::GET, path, options).await
    }

    /// `POST` convenience wrapper around [`send`](Self::send).
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn post(&self, path: &str, options: SendOptions) -> Result<NormalizedResponse, HttpError> {
        self.send(Method::POST, path, options).await
    }

    /// `PUT` convenience wrapper around [`send`](Self::send).
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn put(&self, path: &str, options: SendOptions) -> Result<NormalizedResponse, HttpError> {
        self.send(Method::PUT, path, options).await
    }

    /// `PATCH` convenience wrapper around [`send`](Self::send).
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn patch(&self, path: &str, options: SendOptions) -> Result<NormalizedResponse, HttpError> {
        self.send(Method::PATCH, path, options).await
    }

    /// `DELETE` convenience wrapper around [`send`](Self::send).
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub async fn delete(&self, path: &str, options: SendOptions) -> Result<NormalizedResponse, HttpError> {
        self.send(Method::DELETE, path, options).await
    }
}
