use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

use crate::auth::AuthStrategy;
use crate::client::{ClientInner, IntegrationClient};
use crate::config::{ClientConfig, RateLimitConfig, RetryConfig, TransportSecurity};
use crate::error::HttpError;
use crate::layers::{RateLimitLayer, RateLimiter, RetryLayer, RetryPolicy};
use crate::request::parse_base_url;
use crate::response::ResponseBody;
use crate::tls;
use crate::transform::{RequestTransform, TransformPipeline};

/// Type-erased transport: anything that turns an encoded request into a response.
pub type HttpService = BoxCloneSyncService<Request<Full<Bytes>>, Response<ResponseBody>, HttpError>;

/// Builder for an [`IntegrationClient`].
///
/// Without an explicit [`transport`](Self::transport) the client talks HTTP/1.1
/// and HTTP/2 over rustls through hyper, with transparent gzip/deflate/br
/// decompression.
pub struct IntegrationClientBuilder {
    base_url: String,
    config: ClientConfig,
    auth: Option<AuthStrategy>,
    transforms: Vec<Arc<dyn RequestTransform>>,
    transport: Option<HttpService>,
}

impl IntegrationClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            config: ClientConfig::default(),
            auth: None,
            transforms: Vec::new(),
            transport: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the per-attempt timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the default budget for a whole call
    #[must_use]
    pub fn total_timeout(mut self, timeout: Duration) -> Self {
        self.config.total_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    #[must_use]
    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.config.rate_limit = rate_limit;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.push((name.into(), value.into()));
        self
    }

    /// Accept plain `http://` base URLs
    #[must_use]
    pub fn allow_insecure_http(mut self) -> Self {
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    #[must_use]
    pub fn auth(mut self, auth: AuthStrategy) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Append a transform; it runs after the default-header and content-type steps.
    #[must_use]
    pub fn transform(mut self, transform: impl RequestTransform + 'static) -> Self {
        self.transforms.push(Arc::new(transform));
        self
    }

    /// Replace the hyper transport, e.g. with a stub in tests.
    ///
    /// Retry, rate limiting and the per-attempt timeout still apply.
    #[must_use]
    pub fn transport<S>(mut self, transport: S) -> Self
    where
        S: Service<Request<Full<Bytes>>, Response = Response<ResponseBody>, Error = HttpError>
            + Clone
            + Send
            + Sync
            + 'static,
        S::Future: Send + 'static,
    {
        self.transport = Some(BoxCloneSyncService::new(transport));
        self
    }

    /// Validate the configuration and assemble the middleware stack.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid base URL or configuration, invalid
    /// default headers or credentials, or TLS initialization failures.
    pub fn build(self) -> Result<IntegrationClient, HttpError> {
        let config = self.config;
        config.validate()?;

        let base_url = parse_base_url(&self.base_url, config.transport)?;
        if config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                base_url = %base_url,
                "insecure HTTP allowed for this integration client; credentials may travel in clear text"
            );
        }

        if let Some(auth) = &self.auth {
            auth.validate()?;
        }

        let mut pipeline = TransformPipeline::standard(&config.user_agent, &config.default_headers)?;
        for transform in self.transforms {
            pipeline.push_shared(transform);
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => hyper_transport(&config)?,
        };

        // Outer to inner: Retry → RateLimit → attempt Timeout → transport.
        let timeout = config.request_timeout;
        let attempt = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .service(transport)
            .map_err(move |e: tower::BoxError| map_tower_error(e, timeout));

        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let limited = RateLimitLayer::new(limiter.clone()).layer(attempt);
        let retrying = RetryLayer::new(RetryPolicy::new(config.retry.clone())).layer(limited);

        tracing::debug!(
            base_url = %base_url,
            auth = self.auth.as_ref().map(AuthStrategy::kind),
            max_retries = config.retry.max_retries,
            rate_limit = config.rate_limit.enabled,
            "integration client built"
        );

        Ok(IntegrationClient {
            inner: Arc::new(ClientInner {
                base_url,
                service: BoxCloneSyncService::new(retrying),
                pipeline,
                auth: self.auth,
                limiter,
                max_body_size: config.max_body_size,
                total_timeout: config.total_timeout,
                transport_security: config.transport,
            }),
        })
    }
}

fn hyper_transport(config: &ClientConfig) -> Result<HttpService, HttpError> {
    let https = tls::https_connector(config.tls_roots, config.transport)?;

    let mut client_builder = Client::builder(TokioExecutor::new());
    // pool_timer is required for pool_idle_timeout to take effect
    client_builder
        .pool_timer(TokioTimer::new())
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .http2_only(false);
    if let Some(idle_timeout) = config.pool_idle_timeout {
        client_builder.pool_idle_timeout(idle_timeout);
    }
    let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

    let service = ServiceBuilder::new()
        .layer(DecompressionLayer::new())
        .service(hyper_client)
        .map_response(map_decompression_response)
        .map_err(HttpError::from);
    Ok(BoxCloneSyncService::new(service))
}

/// Map tower errors to `HttpError`, keeping typed errors raised further in.
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

fn map_decompression_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, body.map_err(Into::into).boxed())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::request::SendOptions;
    use crate::test_support::{ScriptedService, Step};

    #[tokio::test]
    async fn rejects_http_base_url_by_default() {
        let result = IntegrationClientBuilder::new("http://api.example.com").build();
        assert!(matches!(result, Err(HttpError::InvalidScheme { .. })));
    }

    #[tokio::test]
    async fn allows_http_base_url_when_opted_in() {
        let client = IntegrationClientBuilder::new("http://api.example.com/v1")
            .allow_insecure_http()
            .build()
            .unwrap();
        assert_eq!(client.base_url().as_str(), "http://api.example.com/v1");
    }

    #[tokio::test]
    async fn rejects_invalid_configuration() {
        let result = IntegrationClientBuilder::new("https://api.example.com")
            .rate_limit(RateLimitConfig::per_window(0, Duration::from_secs(60)))
            .build();
        assert!(matches!(result, Err(HttpError::InvalidConfig(_))));

        let result = IntegrationClientBuilder::new("https://api.example.com")
            .default_header("X Bad", "v")
            .build();
        assert!(matches!(result, Err(HttpError::InvalidHeaderName(_))));

        let result = IntegrationClientBuilder::new("https://api.example.com")
            .auth(AuthStrategy::bearer(""))
            .build();
        assert!(matches!(result, Err(HttpError::InvalidConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn attempt_timeout_maps_to_timeout_and_is_retried() {
        let stub = ScriptedService::new([Step::Hang, Step::status(200)]);
        let client = IntegrationClientBuilder::new("https://api.example.com")
            .timeout(Duration::from_secs(5))
            .transport(stub.clone())
            .build()
            .unwrap();

        let response = client.get("/ping", SendOptions::default()).await.unwrap();
        assert_eq!(response.status_code(), 200);
        assert_eq!(stub.calls(), 2);
    }

    #[test]
    fn map_tower_error_preserves_http_error() {
        let boxed: tower::BoxError = Box::new(HttpError::Cancelled);
        assert!(matches!(
            map_tower_error(boxed, Duration::from_secs(1)),
            HttpError::Cancelled
        ));

        let other: tower::BoxError = "boom".into();
        assert!(matches!(
            map_tower_error(other, Duration::from_secs(3)),
            HttpError::Transport(_)
        ));
    }
}
