use std::time::{Duration, SystemTime};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Response, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Map, Value};

use crate::error::HttpError;

/// Type-erased response body, raw or decompressed.
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// Parse `Retry-After` header value into a `Duration`.
///
/// Supports delta-seconds (`"120"`) and HTTP-dates
/// (`"Wed, 21 Oct 2015 07:28:00 GMT"`). Missing, unparsable, negative and
/// past values yield `None`.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?;
    let trimmed = value.trim();

    if let Ok(seconds) = trimmed.parse::<i64>() {
        if seconds < 0 {
            return None;
        }
        return Some(Duration::from_secs(seconds.cast_unsigned()));
    }

    let at = httpdate::parse_http_date(trimmed).ok()?;
    at.duration_since(SystemTime::now()).ok()
}

/// Decoded response payload
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    /// No body
    Empty,
    /// Body declared as JSON and parsed successfully
    Json(Value),
    /// UTF-8 text, including JSON-declared bodies that failed to parse
    Text(String),
    /// Anything else
    Binary(Bytes),
}

impl ResponseData {
    /// JSON rendering: `null`, the parsed value, a string, or base64 for binary.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Json(value) => value.clone(),
            Self::Text(text) => Value::String(text.clone()),
            Self::Binary(bytes) => Value::String(STANDARD.encode(bytes)),
        }
    }

    fn decode(content_type: Option<&str>, bytes: Bytes) -> Self {
        if bytes.is_empty() {
            return Self::Empty;
        }
        if content_type.is_some_and(is_json_content_type)
            && let Ok(value) = serde_json::from_slice(&bytes)
        {
            return Self::Json(value);
        }
        match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Self::Text(text),
            Err(_) => Self::Binary(bytes),
        }
    }
}

/// `application/json` and any `+json` structured syntax suffix.
fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

/// A fully read response.
///
/// Non-2xx statuses are ordinary values of this type.
#[derive(Debug, Clone)]
pub struct NormalizedResponse {
    pub status: StatusCode,
    /// Canonical reason phrase, empty for unregistered codes
    pub reason: String,
    pub headers: HeaderMap,
    /// Final request URL
    pub url: String,
    pub body: ResponseData,
}

impl NormalizedResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Parsed JSON body, if the response carried one
    #[must_use]
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            ResponseData::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Headers as a JSON object; repeated headers are joined with `", "`.
    #[must_use]
    pub fn headers_json(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for name in self.headers.keys() {
            let joined = self
                .headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(", ");
            out.insert(name.as_str().to_owned(), Value::String(joined));
        }
        out
    }
}

/// Read the body (bounded by `limit` decompressed bytes) and decode it.
pub(crate) async fn normalize(
    response: Response<ResponseBody>,
    url: String,
    limit: usize,
) -> Result<NormalizedResponse, HttpError> {
    let (parts, body) = response.into_parts();

    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(HttpError::BodyTooLarge {
                    limit,
                    actual: collected.len() + chunk.len(),
                });
            }
            collected.extend_from_slice(chunk);
        }
    }

    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let body = ResponseData::decode(content_type, Bytes::from(collected));

    Ok(NormalizedResponse {
        status: parts.status,
        reason: parts
            .status
            .canonical_reason()
            .unwrap_or_default()
            .to_owned(),
        headers: parts.headers,
        url,
        body,
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http_body_util::Full;
    use serde_json::json;

    fn boxed(body: &'static str) -> ResponseBody {
        Full::new(Bytes::from_static(body.as_bytes()))
            .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })
            .boxed()
    }

    fn response(status: u16, content_type: Option<&str>, body: &'static str) -> Response<ResponseBody> {
        let mut builder = Response::builder().status(status);
        if let Some(ct) = content_type {
            builder = builder.header(CONTENT_TYPE, ct);
        }
        builder.body(boxed(body)).unwrap()
    }

    #[test]
    fn retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::RETRY_AFTER, "  60 ".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(60)));

        headers.insert(http::header::RETRY_AFTER, "0".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));
    }

    #[test]
    fn retry_after_rejects_garbage() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(http::header::RETRY_AFTER, "-5".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(http::header::RETRY_AFTER, "soon".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(
            http::header::RETRY_AFTER,
            "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap(),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn retry_after_http_date_in_future() {
        let mut headers = HeaderMap::new();
        let at = SystemTime::now() + Duration::from_secs(60);
        headers.insert(
            http::header::RETRY_AFTER,
            httpdate::fmt_http_date(at).parse().unwrap(),
        );
        let parsed = parse_retry_after(&headers).unwrap();
        assert!(parsed.as_secs() >= 58 && parsed.as_secs() <= 62);
    }

    #[test]
    fn json_content_types() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("Application/JSON; charset=utf-8"));
        assert!(is_json_content_type("application/problem+json"));
        assert!(!is_json_content_type("text/plain"));
        assert!(!is_json_content_type("application/jsonp"));
    }

    #[tokio::test]
    async fn decodes_json_body() {
        let resp = response(200, Some("application/json"), r#"{"ok":true,"n":2}"#);
        let normalized = normalize(resp, "https://x/y".to_owned(), 1024).await.unwrap();

        assert!(normalized.is_success());
        assert_eq!(normalized.reason, "OK");
        assert_eq!(normalized.url, "https://x/y");
        assert_eq!(normalized.json(), Some(&json!({"ok": true, "n": 2})));
    }

    #[tokio::test]
    async fn malformed_json_falls_back_to_text() {
        let resp = response(502, Some("application/json"), "<html>bad gateway</html>");
        let normalized = normalize(resp, String::new(), 1024).await.unwrap();

        assert_eq!(normalized.status_code(), 502);
        assert_eq!(normalized.reason, "Bad Gateway");
        assert_eq!(
            normalized.body,
            ResponseData::Text("<html>bad gateway</html>".to_owned())
        );
    }

    #[tokio::test]
    async fn empty_and_text_bodies() {
        let normalized = normalize(response(204, None, ""), String::new(), 16)
            .await
            .unwrap();
        assert_eq!(normalized.body, ResponseData::Empty);
        assert_eq!(normalized.body.to_value(), Value::Null);

        let normalized = normalize(response(200, Some("text/plain"), "hello"), String::new(), 16)
            .await
            .unwrap();
        assert_eq!(normalized.body.to_value(), json!("hello"));
    }

    #[tokio::test]
    async fn body_limit_enforced() {
        let result = normalize(response(200, None, "0123456789"), String::new(), 4).await;
        assert!(matches!(
            result,
            Err(HttpError::BodyTooLarge { limit: 4, .. })
        ));
    }

    #[test]
    fn headers_json_joins_repeats() {
        let mut headers = HeaderMap::new();
        headers.append("x-tag", "a".parse().unwrap());
        headers.append("x-tag", "b".parse().unwrap());
        let normalized = NormalizedResponse {
            status: StatusCode::OK,
            reason: "OK".to_owned(),
            headers,
            url: String::new(),
            body: ResponseData::Empty,
        };
        assert_eq!(normalized.headers_json()["x-tag"], json!("a, b"));
    }

    #[test]
    fn binary_renders_as_base64() {
        let data = ResponseData::Binary(Bytes::from_static(&[0xff, 0x00]));
        assert_eq!(data.to_value(), json!("/wA="));
    }
}
