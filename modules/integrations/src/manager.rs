//! The contract every integration manager implements, and its factory.

use async_trait::async_trait;
use integration_http::HttpService;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::config::IntegrationConfig;
use crate::error::IntegrationError;
use crate::models::{
    ActionRequest, ActionResult, ActionSpec, IntegrationKind, IntegrationStatus, StatusSnapshot,
};
use crate::rest::RestApiManager;
use crate::slack::SlackManager;

/// Operations the API layer runs against one configured integration.
///
/// None of the operations fail: every error, including transport failures,
/// is reported through the returned [`ActionResult`].
#[async_trait]
pub trait IntegrationManager: Send + Sync {
    fn kind(&self) -> IntegrationKind;

    /// Probe the service and record `connected` or `error`.
    async fn test_connection(&self) -> ActionResult;

    /// Static catalogue of supported actions.
    fn list_actions(&self) -> Vec<ActionSpec>;

    async fn execute_action(&self, name: &str, params: &Map<String, Value>) -> ActionResult {
        self.execute_action_with(name, params, CancellationToken::new())
            .await
    }

    /// Like [`execute_action`](Self::execute_action); cancelling `cancel`
    /// aborts any wait or request in flight.
    async fn execute_action_with(
        &self,
        name: &str,
        params: &Map<String, Value>,
        cancel: CancellationToken,
    ) -> ActionResult;

    async fn execute(&self, request: &ActionRequest) -> ActionResult {
        self.execute_action(&request.name, &request.params).await
    }

    /// Current status for the caller to persist.
    fn status(&self) -> StatusSnapshot;
}

/// Assembles a manager from a stored configuration.
///
/// ```ignore
/// let manager = ManagerBuilder::new(IntegrationKind::RestApi, &stored)
///     .with_initial_status(IntegrationStatus::Connected)
///     .build()?;
/// ```
pub struct ManagerBuilder<'a> {
    kind: IntegrationKind,
    config: &'a Value,
    transport: Option<HttpService>,
    initial_status: IntegrationStatus,
}

impl<'a> ManagerBuilder<'a> {
    #[must_use]
    pub fn new(kind: IntegrationKind, config: &'a Value) -> Self {
        Self {
            kind,
            config,
            transport: None,
            initial_status: IntegrationStatus::Disconnected,
        }
    }

    /// Replace the HTTP transport, e.g. with a stub in tests.
    #[must_use]
    pub fn transport(mut self, transport: HttpService) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Start from the status stored with the integration record.
    #[must_use]
    pub fn with_initial_status(mut self, status: IntegrationStatus) -> Self {
        self.initial_status = status;
        self
    }

    /// # Errors
    ///
    /// Returns [`IntegrationError::Configuration`] when the configuration is
    /// malformed, names an unknown auth type, or lacks a required setting.
    pub fn build(self) -> Result<Box<dyn IntegrationManager>, IntegrationError> {
        let config = IntegrationConfig::from_value(self.config)?;
        let manager: Box<dyn IntegrationManager> = match self.kind {
            IntegrationKind::RestApi => Box::new(RestApiManager::new(
                &config,
                self.transport,
                self.initial_status,
            )?),
            IntegrationKind::Slack => Box::new(SlackManager::new(
                &config,
                self.transport,
                self.initial_status,
            )?),
        };
        tracing::debug!(integration = %self.kind, "integration manager built");
        Ok(manager)
    }
}

/// Build the manager for `kind` from its stored configuration.
///
/// # Errors
///
/// See [`ManagerBuilder::build`].
pub fn build_manager(
    kind: IntegrationKind,
    config: &Value,
) -> Result<Box<dyn IntegrationManager>, IntegrationError> {
    ManagerBuilder::new(kind, config).build()
}

/// [`build_manager`] with an injected transport.
///
/// # Errors
///
/// See [`ManagerBuilder::build`].
pub fn build_manager_with_transport(
    kind: IntegrationKind,
    config: &Value,
    transport: HttpService,
) -> Result<Box<dyn IntegrationManager>, IntegrationError> {
    ManagerBuilder::new(kind, config).transport(transport).build()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn unknown_auth_type_fails_at_build_time() {
        let config = json!({
            "base_url": "https://api.example.com",
            "auth": {"type": "kerberos"}
        });
        let err = build_manager(IntegrationKind::RestApi, &config)
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "Unknown authentication type: kerberos");
    }

    #[tokio::test]
    async fn rest_manager_requires_base_url() {
        let err = build_manager(IntegrationKind::RestApi, &json!({}))
            .err()
            .unwrap();
        assert!(matches!(err, IntegrationError::Configuration(_)));
    }

    #[tokio::test]
    async fn unparsable_base_url_fails_at_build_time() {
        let err = build_manager(IntegrationKind::RestApi, &json!({"base_url": "::nope"}))
            .err()
            .unwrap();
        assert!(matches!(err, IntegrationError::Configuration(_)));
    }

    #[tokio::test]
    async fn initial_status_is_caller_supplied() {
        let config = json!({"base_url": "https://api.example.com"});
        let manager = ManagerBuilder::new(IntegrationKind::RestApi, &config)
            .with_initial_status(IntegrationStatus::Connected)
            .build()
            .unwrap();
        assert_eq!(manager.kind(), IntegrationKind::RestApi);
        assert_eq!(manager.status().status, IntegrationStatus::Connected);

        let default = build_manager(IntegrationKind::RestApi, &config).unwrap();
        assert_eq!(default.status().status, IntegrationStatus::Disconnected);
    }
}
