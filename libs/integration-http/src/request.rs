use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use http::{Method, Request};
use http_body_util::Full;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::TransportSecurity;
use crate::error::{HttpError, InvalidUriKind};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// Form body of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormData {
    /// Key/value pairs, sent url-encoded (or as multipart fields next to files)
    Fields(Vec<(String, String)>),
    /// Pre-encoded body sent verbatim
    Raw(String),
}

/// A file attached to a multipart request
#[derive(Debug, Clone)]
pub struct FilePart {
    /// Form field name
    pub field: String,
    /// File name reported to the server
    pub filename: String,
    /// Part content type (default: `application/octet-stream`)
    pub content_type: Option<String>,
    pub content: Bytes,
}

impl FilePart {
    pub fn new(field: impl Into<String>, filename: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            field: field.into(),
            filename: filename.into(),
            content_type: None,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Per-call options for [`IntegrationClient::send`](crate::IntegrationClient::send)
///
/// When several bodies are supplied, files win over JSON and JSON wins over form data.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Query parameters appended to the URL
    pub query: Vec<(String, String)>,
    /// JSON body
    pub json: Option<Value>,
    /// Form body
    pub data: Option<FormData>,
    /// Extra headers; they take precedence over the client's default headers
    pub headers: Vec<(String, String)>,
    /// Files sent as `multipart/form-data`
    pub files: Vec<FilePart>,
    /// Budget for the whole call (rate-limit waits, attempts, backoff)
    pub timeout: Option<Duration>,
    /// Cancels the call; an in-flight attempt is abandoned
    pub cancel: Option<CancellationToken>,
}

impl SendOptions {
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.json = Some(body);
        self
    }

    #[must_use]
    pub fn form(mut self, data: FormData) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn file(mut self, file: FilePart) -> Self {
        self.files.push(file);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// A request before it is encoded for the wire.
///
/// Transforms and authentication strategies operate on this shape.
#[derive(Debug, Clone)]
pub struct DraftRequest {
    pub method: Method,
    /// Path relative to the client's base URL
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub json: Option<Value>,
    pub data: Option<FormData>,
    pub files: Vec<FilePart>,
}

impl DraftRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            json: None,
            data: None,
            files: Vec::new(),
        }
    }

    /// Build a draft from call options, validating caller headers.
    ///
    /// # Errors
    ///
    /// Returns an error if a header name or value is not valid HTTP.
    pub fn from_options(method: Method, path: &str, options: SendOptions) -> Result<Self, HttpError> {
        let mut headers = HeaderMap::with_capacity(options.headers.len());
        for (name, value) in &options.headers {
            headers.append(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(value)?,
            );
        }

        Ok(Self {
            method,
            path: path.to_owned(),
            query: options.query,
            headers,
            json: options.json,
            data: options.data,
            files: options.files,
        })
    }
}

/// Parse and check a base URL against the transport security mode.
///
/// # Errors
///
/// Returns [`HttpError::InvalidUri`] for unparsable URLs or URLs without a host,
/// and [`HttpError::InvalidScheme`] for schemes the transport does not allow.
pub fn parse_base_url(base: &str, transport: TransportSecurity) -> Result<Url, HttpError> {
    let url = Url::parse(base).map_err(|e| HttpError::InvalidUri {
        url: base.to_owned(),
        kind: match e {
            url::ParseError::RelativeUrlWithoutBase => InvalidUriKind::MissingScheme,
            url::ParseError::EmptyHost => InvalidUriKind::MissingAuthority,
            _ => InvalidUriKind::ParseError,
        },
        reason: e.to_string(),
    })?;
    check_scheme(&url, transport)?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(HttpError::InvalidUri {
            url: base.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "URL must have a host".to_owned(),
        });
    }
    Ok(url)
}

fn check_scheme(url: &Url, transport: TransportSecurity) -> Result<(), HttpError> {
    match (url.scheme(), transport) {
        ("https", _) | ("http", TransportSecurity::AllowInsecureHttp) => Ok(()),
        ("http", TransportSecurity::TlsOnly) => Err(HttpError::InvalidScheme {
            scheme: "http".to_owned(),
            reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
        }),
        (other, _) => Err(HttpError::InvalidScheme {
            scheme: other.to_owned(),
            reason: "only http:// and https:// are supported".to_owned(),
        }),
    }
}

/// Resolve `path` against `base` the way a browser resolves a relative link.
///
/// A leading `/` replaces the base path; otherwise the path is joined onto the
/// base's last directory.
///
/// # Errors
///
/// Returns [`HttpError::InvalidUri`] if the result is not a valid URL, or
/// [`HttpError::InvalidScheme`] if an absolute path switched to a forbidden scheme.
pub fn resolve_url(
    base: &Url,
    path: &str,
    query: &[(String, String)],
    transport: TransportSecurity,
) -> Result<Url, HttpError> {
    let mut url = base.join(path).map_err(|e| HttpError::InvalidUri {
        url: path.to_owned(),
        kind: InvalidUriKind::ParseError,
        reason: e.to_string(),
    })?;
    check_scheme(&url, transport)?;
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
}

/// Encode a draft into the request handed to the middleware stack.
pub(crate) fn encode_request(
    draft: DraftRequest,
    base: &Url,
    transport: TransportSecurity,
) -> Result<Request<Full<Bytes>>, HttpError> {
    let DraftRequest {
        method,
        path,
        query,
        mut headers,
        json,
        data,
        files,
    } = draft;

    let url = resolve_url(base, &path, &query, transport)?;

    let body = if !files.is_empty() {
        let existing = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(boundary_param)
            .map(str::to_owned);
        let boundary = if let Some(boundary) = existing {
            boundary
        } else {
            let boundary = format!("integration-http-{:016x}", rand::random::<u64>());
            headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_str(&format!("{MULTIPART_FORM_DATA}; boundary={boundary}"))?,
            );
            boundary
        };
        let fields = match &data {
            Some(FormData::Fields(fields)) => fields.as_slice(),
            _ => &[],
        };
        encode_multipart(&boundary, fields, &files)
    } else if let Some(json) = json {
        Bytes::from(serde_json::to_vec(&json)?)
    } else if let Some(data) = data {
        headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(FORM_URLENCODED));
        match data {
            FormData::Fields(fields) => Bytes::from(serde_urlencoded::to_string(&fields)?),
            FormData::Raw(raw) => Bytes::from(raw),
        }
    } else {
        Bytes::new()
    };

    let mut request = Request::builder()
        .method(method)
        .uri(url.as_str())
        .body(Full::new(body))?;
    *request.headers_mut() = headers;
    Ok(request)
}

fn boundary_param(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        (name.trim().eq_ignore_ascii_case("boundary")).then(|| value.trim().trim_matches('"'))
    })
}

fn quote_param(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .map(|c| if c == '"' { '\'' } else { c })
        .collect()
}

fn encode_multipart(boundary: &str, fields: &[(String, String)], files: &[FilePart]) -> Bytes {
    let mut out = Vec::new();
    for (name, value) in fields {
        let part = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{value}\r\n",
            quote_param(name)
        );
        out.extend_from_slice(part.as_bytes());
    }
    for file in files {
        let part_head = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            quote_param(&file.field),
            quote_param(&file.filename),
            file.content_type.as_deref().unwrap_or("application/octet-stream"),
        );
        out.extend_from_slice(part_head.as_bytes());
        out.extend_from_slice(&file.content);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    Bytes::from(out)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::json;

    fn base() -> Url {
        parse_base_url("https://api.example.com/v1/", TransportSecurity::TlsOnly).unwrap()
    }

    async fn body_string(request: Request<Full<Bytes>>) -> String {
        let bytes = request.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn relative_paths_join_onto_base() {
        let url = resolve_url(&base(), "users", &[], TransportSecurity::TlsOnly).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/users");

        let url = resolve_url(&base(), "/status", &[], TransportSecurity::TlsOnly).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/status");
    }

    #[test]
    fn query_pairs_are_encoded() {
        let query = vec![
            ("q".to_owned(), "a b&c".to_owned()),
            ("limit".to_owned(), "10".to_owned()),
        ];
        let url = resolve_url(&base(), "search", &query, TransportSecurity::TlsOnly).unwrap();
        assert_eq!(url.query(), Some("q=a+b%26c&limit=10"));
    }

    #[test]
    fn base_url_scheme_rules() {
        assert!(matches!(
            parse_base_url("http://api.example.com", TransportSecurity::TlsOnly),
            Err(HttpError::InvalidScheme { scheme, .. }) if scheme == "http"
        ));
        assert!(parse_base_url("http://api.example.com", TransportSecurity::AllowInsecureHttp).is_ok());
        assert!(matches!(
            parse_base_url("ftp://files.example.com", TransportSecurity::AllowInsecureHttp),
            Err(HttpError::InvalidScheme { .. })
        ));
        assert!(matches!(
            parse_base_url("not a url", TransportSecurity::TlsOnly),
            Err(HttpError::InvalidUri {
                kind: InvalidUriKind::MissingScheme,
                ..
            })
        ));
    }

    #[test]
    fn absolute_path_cannot_escape_to_forbidden_scheme() {
        let result = resolve_url(&base(), "http://evil.example.com/", &[], TransportSecurity::TlsOnly);
        assert!(matches!(result, Err(HttpError::InvalidScheme { .. })));
    }

    #[test]
    fn invalid_caller_header_is_rejected() {
        let options = SendOptions::default().header("bad header", "x");
        assert!(matches!(
            DraftRequest::from_options(Method::GET, "/", options),
            Err(HttpError::InvalidHeaderName(_))
        ));
    }

    #[tokio::test]
    async fn json_body_is_serialized() {
        let mut draft = DraftRequest::new(Method::POST, "items");
        draft.json = Some(json!({"name": "widget"}));
        let request = encode_request(draft, &base(), TransportSecurity::TlsOnly).unwrap();
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.uri(), "https://api.example.com/v1/items");
        assert_eq!(body_string(request).await, r#"{"name":"widget"}"#);
    }

    #[tokio::test]
    async fn form_fields_are_urlencoded() {
        let mut draft = DraftRequest::new(Method::POST, "form");
        draft.data = Some(FormData::Fields(vec![("a".to_owned(), "1 2".to_owned())]));
        let request = encode_request(draft, &base(), TransportSecurity::TlsOnly).unwrap();
        assert_eq!(request.headers()[CONTENT_TYPE], FORM_URLENCODED);
        assert_eq!(body_string(request).await, "a=1+2");
    }

    #[tokio::test]
    async fn files_take_precedence_and_carry_boundary() {
        let mut draft = DraftRequest::new(Method::POST, "upload");
        draft.json = Some(json!({"ignored": true}));
        draft.data = Some(FormData::Fields(vec![("channels".to_owned(), "C1".to_owned())]));
        draft.files = vec![FilePart::new("file", "notes.txt", "hello").content_type("text/plain")];

        let request = encode_request(draft, &base(), TransportSecurity::TlsOnly).unwrap();
        let content_type = request.headers()[CONTENT_TYPE].to_str().unwrap().to_owned();
        let boundary = boundary_param(&content_type).unwrap().to_owned();
        assert!(content_type.starts_with(MULTIPART_FORM_DATA));

        let body = body_string(request).await;
        assert!(body.contains("name=\"channels\"\r\n\r\nC1\r\n"));
        assert!(body.contains("name=\"file\"; filename=\"notes.txt\"\r\nContent-Type: text/plain\r\n\r\nhello\r\n"));
        assert!(body.ends_with(&format!("--{boundary}--\r\n")));
        assert!(!body.contains("ignored"));
    }

    #[test]
    fn boundary_param_parsing() {
        assert_eq!(boundary_param("multipart/form-data; boundary=abc"), Some("abc"));
        assert_eq!(boundary_param("multipart/form-data; Boundary=\"q\""), Some("q"));
        assert_eq!(boundary_param("multipart/form-data"), None);
    }
}
