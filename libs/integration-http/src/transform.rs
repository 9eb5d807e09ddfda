//! Request transforms applied to every outgoing request before authentication.
//!
//! A [`TransformPipeline`] runs its transforms in registration order. The
//! standard pipeline adds the configured and built-in default headers, then
//! infers `Content-Type` from the body. Neither overwrites a header the
//! caller already set, so running the pipeline twice changes nothing.

use std::sync::Arc;

use http::header::{ACCEPT, ACCEPT_ENCODING, CONTENT_TYPE, HeaderName, HeaderValue, USER_AGENT};

use crate::config::{DEFAULT_ACCEPT, DEFAULT_ACCEPT_ENCODING};
use crate::error::HttpError;
use crate::request::DraftRequest;

/// A pure step that edits a draft request.
pub trait RequestTransform: Send + Sync {
    /// Apply the transform.
    ///
    /// # Errors
    ///
    /// Returns an error when the request cannot be transformed; the call fails
    /// before anything is sent.
    fn apply(&self, request: &mut DraftRequest) -> Result<(), HttpError>;
}

impl<F> RequestTransform for F
where
    F: Fn(&mut DraftRequest) -> Result<(), HttpError> + Send + Sync,
{
    fn apply(&self, request: &mut DraftRequest) -> Result<(), HttpError> {
        self(request)
    }
}

/// Headers added to a request only where the request does not carry them yet.
#[derive(Debug, Clone)]
pub struct DefaultHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl DefaultHeaders {
    /// Configured headers first, then `User-Agent`, `Accept` and `Accept-Encoding`.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured header name or value is invalid.
    pub fn new(user_agent: &str, configured: &[(String, String)]) -> Result<Self, HttpError> {
        let mut headers = Vec::with_capacity(configured.len() + 3);
        for (name, value) in configured {
            headers.push((
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(value)?,
            ));
        }
        headers.push((USER_AGENT, HeaderValue::from_str(user_agent)?));
        headers.push((ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT)));
        headers.push((
            ACCEPT_ENCODING,
            HeaderValue::from_static(DEFAULT_ACCEPT_ENCODING),
        ));
        Ok(Self { headers })
    }
}

impl RequestTransform for DefaultHeaders {
    fn apply(&self, request: &mut DraftRequest) -> Result<(), HttpError> {
        for (name, value) in &self.headers {
            request
                .headers
                .entry(name)
                .or_insert_with(|| value.clone());
        }
        Ok(())
    }
}

/// Sets `Content-Type` from the body unless the caller set one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentTypeInference;

impl RequestTransform for ContentTypeInference {
    fn apply(&self, request: &mut DraftRequest) -> Result<(), HttpError> {
        if request.headers.contains_key(CONTENT_TYPE) {
            return Ok(());
        }
        let inferred = if !request.files.is_empty() {
            "multipart/form-data"
        } else if request.json.is_some() {
            "application/json"
        } else {
            return Ok(());
        };
        request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(inferred));
        Ok(())
    }
}

/// Ordered list of transforms.
#[derive(Clone, Default)]
pub struct TransformPipeline {
    transforms: Vec<Arc<dyn RequestTransform>>,
}

impl TransformPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default headers followed by content-type inference.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured header is invalid.
    pub fn standard(user_agent: &str, configured: &[(String, String)]) -> Result<Self, HttpError> {
        let mut pipeline = Self::new();
        pipeline.push(DefaultHeaders::new(user_agent, configured)?);
        pipeline.push(ContentTypeInference);
        Ok(pipeline)
    }

    pub fn push(&mut self, transform: impl RequestTransform + 'static) {
        self.transforms.push(Arc::new(transform));
    }

    pub(crate) fn push_shared(&mut self, transform: Arc<dyn RequestTransform>) {
        self.transforms.push(transform);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Run every transform in order, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Propagates the first transform error.
    pub fn apply(&self, request: &mut DraftRequest) -> Result<(), HttpError> {
        for transform in &self.transforms {
            transform.apply(request)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for TransformPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformPipeline")
            .field("transforms", &self.transforms.len())
            .finish()
    }
}
