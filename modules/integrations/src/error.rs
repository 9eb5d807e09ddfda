//! Integration error types.

use integration_http::HttpError;
use thiserror::Error;

/// An action parameter is missing or has the wrong shape.
///
/// Always detected before any request is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Parameter '{name}' must be {expected}")]
    InvalidParameter { name: String, expected: &'static str },

    /// The manager has no action with this name.
    #[error("Invalid action name")]
    UnknownAction(String),
}

/// Error type for integration operations.
///
/// Managers never hand these to callers directly: every failure of
/// `test_connection` and `execute_action` is folded into an
/// [`ActionResult`](crate::ActionResult).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum IntegrationError {
    /// The stored configuration cannot produce a working client.
    #[error("{0}")]
    Configuration(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Transport, timeout, lockout or cancellation raised by the client.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The service answered with a status the caller cannot use.
    #[error("HTTP {status}: {reason}")]
    UnexpectedStatus { status: u16, reason: String },

    /// The service answered 2xx but reported a failure in the body.
    #[error("{service} API error: {message}")]
    Remote {
        service: &'static str,
        message: String,
    },
}

impl IntegrationError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// `true` when the failure says the remote service could not be reached.
    ///
    /// Only these failures move an integration into the `error` status outside
    /// of an explicit connection test.
    #[must_use]
    pub fn reflects_connectivity(&self) -> bool {
        matches!(self, Self::Http(err) if err.is_connectivity())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn display_texts() {
        assert_eq!(
            ValidationError::MissingParameter("channel".into()).to_string(),
            "Missing required parameter: channel"
        );
        let remote = IntegrationError::Remote {
            service: "Slack",
            message: "channel_not_found".into(),
        };
        assert_eq!(remote.to_string(), "Slack API error: channel_not_found");
        assert_eq!(
            IntegrationError::config("Unknown authentication type: digest").to_string(),
            "Unknown authentication type: digest"
        );
    }

    #[test]
    fn only_connectivity_failures_are_flagged() {
        assert!(IntegrationError::Http(HttpError::Timeout(Duration::from_secs(1))).reflects_connectivity());
        assert!(IntegrationError::Http(HttpError::Transport("refused".into())).reflects_connectivity());
        assert!(
            !IntegrationError::Http(HttpError::DeadlineExceeded(Duration::from_secs(1)))
                .reflects_connectivity()
        );
        assert!(!IntegrationError::Http(HttpError::Cancelled).reflects_connectivity());
        assert!(
            !IntegrationError::Http(HttpError::RateLimited {
                retry_in: Duration::from_secs(30)
            })
            .reflects_connectivity()
        );
        assert!(!IntegrationError::from(ValidationError::MissingParameter("path".into())).reflects_connectivity());
    }
}
