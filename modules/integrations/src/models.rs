//! Integration domain models.
//!
//! Everything here is what the API layer stores or returns: the result
//! envelope, the action catalogue and the integration status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::IntegrationError;

/// Kind of third-party service an integration talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationKind {
    /// Generic REST API driven by `get`/`post`/`put`/`patch`/`delete` actions
    RestApi,
    /// Slack Web API
    Slack,
}

impl IntegrationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RestApi => "rest_api",
            Self::Slack => "slack",
        }
    }
}

impl fmt::Display for IntegrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntegrationKind {
    type Err = IntegrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rest_api" => Ok(Self::RestApi),
            "slack" => Ok(Self::Slack),
            other => Err(IntegrationError::config(format!(
                "Unknown integration type: {other}"
            ))),
        }
    }
}

/// Connection status persisted alongside the integration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationStatus {
    Connected,
    Error,
    #[default]
    Disconnected,
}

/// Status plus the time it was last written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: IntegrationStatus,
    pub last_sync: Option<DateTime<Utc>>,
}

/// Uniform envelope returned by every manager operation.
///
/// `success` implies `error` is `None`; a failure always carries a non-empty
/// `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    pub output: Option<Map<String, Value>>,
    pub error: Option<String>,
}

impl ActionResult {
    #[must_use]
    pub fn success(message: impl Into<String>, output: Map<String, Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            output: Some(output),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(message: impl Into<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        let mut message = message.into();
        if message.trim().is_empty() {
            message.clone_from(&error);
        }
        Self {
            success: false,
            message,
            output: None,
            error: Some(error),
        }
    }

    /// Attach output to a result, e.g. the response of a failed HTTP call.
    #[must_use]
    pub fn with_output(mut self, output: Map<String, Value>) -> Self {
        self.output = Some(output);
        self
    }
}

/// JSON type expected for an action parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
    /// Any JSON value
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    pub(crate) const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
        }
    }

    pub(crate) const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
        }
    }
}

/// One entry of a manager's static action catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Vec<ParamSpec>,
}

/// An action invocation as received from the API layer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ActionRequest {
    pub name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}
