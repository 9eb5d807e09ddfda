//! Authentication strategies.
//!
//! A strategy mutates a [`DraftRequest`] after the transform pipeline has run.
//! Header values carrying credentials are marked sensitive so they are masked
//! in `Debug` output of the header map.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::Method;
use http::header::{AUTHORIZATION, HeaderName, HeaderValue};
use zeroize::Zeroizing;

use crate::error::HttpError;
use crate::request::DraftRequest;
use crate::secret::SecretString;

/// Default header carrying an API key
pub const DEFAULT_API_KEY_NAME: &str = "Authorization";

/// API key placed in a header, in the query string, or both.
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    pub key: SecretString,
    /// Header name or query parameter name
    pub key_name: String,
    /// Optional scheme placed before the key, e.g. `Bearer`
    pub prefix: Option<String>,
    pub in_header: bool,
    pub in_query: bool,
}

impl ApiKeyAuth {
    /// Key in the `Authorization` header, no prefix.
    pub fn new(key: impl Into<SecretString>) -> Self {
        Self {
            key: key.into(),
            key_name: DEFAULT_API_KEY_NAME.to_owned(),
            prefix: None,
            in_header: true,
            in_query: false,
        }
    }

    #[must_use]
    pub fn key_name(mut self, name: impl Into<String>) -> Self {
        self.key_name = name.into();
        self
    }

    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn placement(mut self, in_header: bool, in_query: bool) -> Self {
        self.in_header = in_header;
        self.in_query = in_query;
        self
    }

    fn header_text(&self) -> Zeroizing<String> {
        match self.prefix.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            Some(prefix) => Zeroizing::new(format!("{prefix} {}", self.key.expose())),
            None => Zeroizing::new(self.key.expose().to_owned()),
        }
    }
}

/// How a client authenticates against the remote service
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AuthStrategy {
    ApiKey(ApiKeyAuth),
    /// `Authorization: <token_type> <access_token>`
    OAuth2 {
        access_token: SecretString,
        token_type: String,
    },
    /// `Authorization: Basic base64(username:password)`
    Basic {
        username: String,
        password: SecretString,
    },
    /// `Authorization: Bearer <token>`
    Bearer { token: SecretString },
}

impl AuthStrategy {
    /// OAuth2 strategy with the usual `Bearer` token type
    pub fn oauth2(access_token: impl Into<SecretString>) -> Self {
        Self::OAuth2 {
            access_token: access_token.into(),
            token_type: "Bearer".to_owned(),
        }
    }

    pub fn bearer(token: impl Into<SecretString>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    pub fn basic(username: impl Into<String>, password: impl Into<SecretString>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Short name used in logs (`api_key`, `oauth2`, `basic`, `bearer`)
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApiKey(_) => "api_key",
            Self::OAuth2 { .. } => "oauth2",
            Self::Basic { .. } => "basic",
            Self::Bearer { .. } => "bearer",
        }
    }

    /// Check that the strategy can produce valid credentials.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::InvalidConfig`] for empty credentials and header
    /// errors for names or values that are not valid HTTP.
    pub fn validate(&self) -> Result<(), HttpError> {
        let empty = match self {
            Self::ApiKey(api_key) => api_key.key.is_empty() || api_key.key_name.trim().is_empty(),
            Self::OAuth2 { access_token, .. } => access_token.is_empty(),
            Self::Basic { username, .. } => username.is_empty(),
            Self::Bearer { token } => token.is_empty(),
        };
        if empty {
            return Err(HttpError::InvalidConfig(format!(
                "{} authentication is missing its credentials",
                self.kind()
            )));
        }
        self.apply(&mut DraftRequest::new(Method::GET, "/"))
    }

    /// Attach credentials to the request.
    ///
    /// Only the authentication header or query parameter is touched.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential does not form a valid header.
    pub fn apply(&self, request: &mut DraftRequest) -> Result<(), HttpError> {
        match self {
            Self::ApiKey(api_key) => {
                if api_key.in_header {
                    let name = HeaderName::from_bytes(api_key.key_name.as_bytes())?;
                    request
                        .headers
                        .insert(name, sensitive_value(&api_key.header_text())?);
                }
                if api_key.in_query {
                    request.query.retain(|(name, _)| *name != api_key.key_name);
                    request
                        .query
                        .push((api_key.key_name.clone(), api_key.key.expose().to_owned()));
                }
            }
            Self::OAuth2 {
                access_token,
                token_type,
            } => {
                let text = Zeroizing::new(format!("{token_type} {}", access_token.expose()));
                request
                    .headers
                    .insert(AUTHORIZATION, sensitive_value(&text)?);
            }
            Self::Basic { username, password } => {
                let credentials = Zeroizing::new(format!("{username}:{}", password.expose()));
                let text = Zeroizing::new(format!("Basic {}", STANDARD.encode(credentials.as_bytes())));
                request
                    .headers
                    .insert(AUTHORIZATION, sensitive_value(&text)?);
            }
            Self::Bearer { token } => {
                let text = Zeroizing::new(format!("Bearer {}", token.expose()));
                request
                    .headers
                    .insert(AUTHORIZATION, sensitive_value(&text)?);
            }
        }
        Ok(())
    }
}

fn sensitive_value(text: &str) -> Result<HeaderValue, HttpError> {
    let mut value = HeaderValue::from_str(text)?;
    value.set_sensitive(true);
    Ok(value)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http::header::ACCEPT;

    fn draft() -> DraftRequest {
        let mut draft = DraftRequest::new(Method::GET, "/items");
        draft
            .headers
            .insert(ACCEPT, HeaderValue::from_static("application/json"));
        draft.query.push(("page".to_owned(), "2".to_owned()));
        draft
    }

    #[test]
    fn api_key_in_custom_header_only() {
        let auth = AuthStrategy::ApiKey(ApiKeyAuth::new("k1").key_name("X-API-Key"));
        let mut req = draft();
        auth.apply(&mut req).unwrap();

        assert_eq!(req.headers["x-api-key"], "k1");
        assert!(req.headers["x-api-key"].is_sensitive());
        assert_eq!(req.headers[ACCEPT], "application/json");
        assert_eq!(req.query, vec![("page".to_owned(), "2".to_owned())]);
    }

    #[test]
    fn api_key_with_prefix_in_header_and_query() {
        let auth = AuthStrategy::ApiKey(
            ApiKeyAuth::new("secret")
                .key_name("api_key")
                .prefix("Token ")
                .placement(true, true),
        );
        let mut req = draft();
        auth.apply(&mut req).unwrap();

        assert_eq!(req.headers["api_key"], "Token secret");
        assert_eq!(
            req.query,
            vec![
                ("page".to_owned(), "2".to_owned()),
                ("api_key".to_owned(), "secret".to_owned())
            ]
        );
    }

    #[test]
    fn api_key_query_only_replaces_existing_param() {
        let auth = AuthStrategy::ApiKey(
            ApiKeyAuth::new("new")
                .key_name("key")
                .placement(false, true),
        );
        let mut req = draft();
        req.query.push(("key".to_owned(), "old".to_owned()));
        auth.apply(&mut req).unwrap();

        assert!(!req.headers.contains_key(AUTHORIZATION));
        assert_eq!(
            req.query.iter().filter(|(name, _)| name == "key").count(),
            1
        );
        assert!(req.query.contains(&("key".to_owned(), "new".to_owned())));
    }

    #[test]
    fn oauth2_uses_token_type() {
        let mut req = draft();
        AuthStrategy::oauth2("abc").apply(&mut req).unwrap();
        assert_eq!(req.headers[AUTHORIZATION], "Bearer abc");

        let mac = AuthStrategy::OAuth2 {
            access_token: "abc".into(),
            token_type: "MAC".to_owned(),
        };
        mac.apply(&mut req).unwrap();
        assert_eq!(req.headers[AUTHORIZATION], "MAC abc");
        assert_eq!(req.headers.get_all(AUTHORIZATION).iter().count(), 1);
    }

    #[test]
    fn basic_encodes_credentials() {
        let mut req = draft();
        AuthStrategy::basic("user", "pass").apply(&mut req).unwrap();
        assert_eq!(req.headers[AUTHORIZATION], "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn bearer_sets_authorization() {
        let mut req = draft();
        AuthStrategy::bearer("xoxb-1").apply(&mut req).unwrap();
        assert_eq!(req.headers[AUTHORIZATION], "Bearer xoxb-1");
        assert!(req.headers[AUTHORIZATION].is_sensitive());
    }

    #[test]
    fn validate_rejects_empty_and_malformed_credentials() {
        assert!(matches!(
            AuthStrategy::bearer("").validate(),
            Err(HttpError::InvalidConfig(_))
        ));
        assert!(matches!(
            AuthStrategy::bearer("line\nbreak").validate(),
            Err(HttpError::InvalidHeaderValue(_))
        ));
        assert!(matches!(
            AuthStrategy::ApiKey(ApiKeyAuth::new("k").key_name("bad name")).validate(),
            Err(HttpError::InvalidHeaderName(_))
        ));
        assert!(AuthStrategy::basic("user", "").validate().is_ok());
    }

    #[test]
    fn debug_hides_credentials() {
        let auth = AuthStrategy::basic("user", "hunter2");
        let rendered = format!("{auth:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
