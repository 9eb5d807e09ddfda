//! Stored integration configuration.
//!
//! The API layer hands over the persisted JSON blob; it is parsed here with
//! per-field defaults and turned into the typed settings of the HTTP client.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

use integration_http::{
    ApiKeyAuth, AuthStrategy, ClientConfig, DEFAULT_API_KEY_NAME, DEFAULT_RETRYABLE_STATUSES,
    ExponentialBackoff, HttpService, IntegrationClient, MAX_BACKOFF, RateLimitConfig, RetryConfig,
    TransportSecurity, parse_base_url,
};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::IntegrationError;

/// Configuration of one integration as stored by the API layer.
///
/// Unknown keys are ignored and missing keys take their defaults. Durations
/// are in seconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    pub base_url: Option<String>,
    pub timeout: f64,
    /// Default budget for a whole call, waits and retries included
    pub total_timeout: Option<f64>,
    pub max_retries: u32,
    pub retry_delay: f64,
    pub retry_multiplier: f64,
    #[serde(alias = "retry_statuses")]
    pub retryable_statuses: Vec<u16>,
    pub retry_jitter: bool,
    pub rate_limit_enabled: bool,
    pub rate_limit_window: f64,
    pub rate_limit_max_calls: u32,
    pub max_body_size: usize,
    pub headers: BTreeMap<String, String>,
    #[serde(deserialize_with = "deserialize_auth")]
    pub auth: Option<AuthConfig>,
    /// Slack bot token
    pub bot_token: Option<String>,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: 30.0,
            total_timeout: None,
            max_retries: 3,
            retry_delay: 1.0,
            retry_multiplier: 2.0,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
            retry_jitter: false,
            rate_limit_enabled: true,
            rate_limit_window: 60.0,
            rate_limit_max_calls: 60,
            max_body_size: 10 * 1024 * 1024,
            headers: BTreeMap::new(),
            auth: None,
            bot_token: None,
        }
    }
}

/// Authentication block of a stored configuration, tagged by `type`.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    ApiKey {
        key: String,
        #[serde(default = "default_key_name")]
        key_name: String,
        #[serde(default)]
        prefix: Option<String>,
        #[serde(default = "default_true")]
        in_header: bool,
        #[serde(default)]
        in_query: bool,
    },
    #[serde(rename = "oauth2")]
    OAuth2 {
        access_token: String,
        #[serde(default = "default_token_type")]
        token_type: String,
    },
    Basic {
        username: String,
        password: String,
    },
    Bearer {
        token: String,
    },
}

const AUTH_TYPES: [&str; 4] = ["api_key", "oauth2", "basic", "bearer"];

fn default_key_name() -> String {
    DEFAULT_API_KEY_NAME.to_owned()
}

fn default_true() -> bool {
    true
}

fn default_token_type() -> String {
    "Bearer".to_owned()
}

// Absent, `null` or untyped blocks mean "no authentication"; an unrecognised
// type is an error rather than a silent no-op.
fn deserialize_auth<'de, D>(deserializer: D) -> Result<Option<AuthConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(value) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let auth_type = match value.get("type") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(t)) if t.is_empty() => return Ok(None),
        Some(Value::String(t)) => t.clone(),
        Some(other) => return Err(D::Error::custom(format!("Unknown authentication type: {other}"))),
    };
    if !AUTH_TYPES.contains(&auth_type.as_str()) {
        return Err(D::Error::custom(format!(
            "Unknown authentication type: {auth_type}"
        )));
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| D::Error::custom(format!("Invalid {auth_type} authentication: {e}")))
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey {
                key_name,
                prefix,
                in_header,
                in_query,
                ..
            } => f
                .debug_struct("ApiKey")
                .field("key", &"[REDACTED]")
                .field("key_name", key_name)
                .field("prefix", prefix)
                .field("in_header", in_header)
                .field("in_query", in_query)
                .finish(),
            Self::OAuth2 { token_type, .. } => f
                .debug_struct("OAuth2")
                .field("access_token", &"[REDACTED]")
                .field("token_type", token_type)
                .finish(),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::Bearer { .. } => f.debug_struct("Bearer").field("token", &"[REDACTED]").finish(),
        }
    }
}

impl AuthConfig {
    /// Select the signing strategy for this block.
    #[must_use]
    pub fn to_strategy(&self) -> AuthStrategy {
        match self {
            Self::ApiKey {
                key,
                key_name,
                prefix,
                in_header,
                in_query,
            } => {
                let mut auth = ApiKeyAuth::new(key.as_str())
                    .key_name(key_name.as_str())
                    .placement(*in_header, *in_query);
                if let Some(prefix) = prefix {
                    auth = auth.prefix(prefix.as_str());
                }
                AuthStrategy::ApiKey(auth)
            }
            Self::OAuth2 {
                access_token,
                token_type,
            } => AuthStrategy::OAuth2 {
                access_token: access_token.as_str().into(),
                token_type: token_type.clone(),
            },
            Self::Basic { username, password } => AuthStrategy::basic(username.as_str(), password.as_str()),
            Self::Bearer { token } => AuthStrategy::bearer(token.as_str()),
        }
    }
}

impl IntegrationConfig {
    /// Parse a stored configuration blob.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrationError::Configuration`] when a key has the wrong type
    /// or the auth block is invalid.
    pub fn from_value(value: &Value) -> Result<Self, IntegrationError> {
        let config = Self::deserialize(value).map_err(|e| {
            tracing::warn!(error = %e, "integration configuration rejected");
            IntegrationError::config(e.to_string())
        })?;
        Ok(config)
    }

    /// Base URL, required for every kind without a well-known endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrationError::Configuration`] when neither the stored
    /// value nor `fallback` is set.
    pub fn base_url_or(&self, fallback: Option<&str>) -> Result<String, IntegrationError> {
        match (self.base_url.as_deref().map(str::trim), fallback) {
            (Some(url), _) if !url.is_empty() => Ok(url.to_owned()),
            (_, Some(fallback)) => Ok(fallback.to_owned()),
            _ => Err(IntegrationError::config("base_url is required")),
        }
    }

    /// Client settings for the given base URL.
    ///
    /// A plain `http://` base URL opts the client into insecure transport.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrationError::Configuration`] for an unparsable base URL,
    /// negative or non-finite durations, and values the client rejects.
    pub fn client_config(&self, base_url: &str) -> Result<ClientConfig, IntegrationError> {
        let parsed = parse_base_url(base_url, TransportSecurity::AllowInsecureHttp)
            .map_err(|e| IntegrationError::config(e.to_string()))?;
        let transport = if parsed.scheme() == "http" {
            TransportSecurity::AllowInsecureHttp
        } else {
            TransportSecurity::TlsOnly
        };

        let mut backoff = ExponentialBackoff::new(seconds("retry_delay", self.retry_delay)?, self.retry_multiplier);
        backoff.max = MAX_BACKOFF;
        backoff.jitter = self.retry_jitter;

        let config = ClientConfig {
            request_timeout: seconds("timeout", self.timeout)?,
            total_timeout: self
                .total_timeout
                .map(|t| seconds("total_timeout", t))
                .transpose()?,
            max_body_size: self.max_body_size,
            retry: RetryConfig {
                max_retries: usize::try_from(self.max_retries).unwrap_or(usize::MAX),
                backoff,
                retryable_statuses: self.retryable_statuses.iter().copied().collect::<HashSet<_>>(),
                ignore_retry_after: false,
            },
            rate_limit: RateLimitConfig {
                enabled: self.rate_limit_enabled,
                window: seconds("rate_limit_window", self.rate_limit_window)?,
                max_calls: self.rate_limit_max_calls,
            },
            default_headers: self
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
            transport,
            ..ClientConfig::default()
        };
        config
            .validate()
            .map_err(|e| IntegrationError::config(e.to_string()))?;
        Ok(config)
    }

    /// Signing strategy from the auth block, if any.
    #[must_use]
    pub fn auth_strategy(&self) -> Option<AuthStrategy> {
        self.auth.as_ref().map(AuthConfig::to_strategy)
    }

    /// Build the HTTP client for `base_url`, signing with `auth`.
    pub(crate) fn build_client(
        &self,
        base_url: &str,
        auth: Option<AuthStrategy>,
        transport: Option<HttpService>,
    ) -> Result<IntegrationClient, IntegrationError> {
        let mut builder = IntegrationClient::builder(base_url).config(self.client_config(base_url)?);
        if let Some(auth) = auth {
            builder = builder.auth(auth);
        }
        if let Some(transport) = transport {
            builder = builder.transport(transport);
        }
        builder
            .build()
            .map_err(|e| IntegrationError::config(e.to_string()))
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration, IntegrationError> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        IntegrationError::config(format!(
            "{name} must be a non-negative number of seconds, got {value}"
        ))
    })
}
