//! Generic REST integration: one action per HTTP method.

use async_trait::async_trait;
use http::Method;
use integration_http::{HttpService, IntegrationClient, NormalizedResponse, SendOptions};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use crate::config::IntegrationConfig;
use crate::error::{IntegrationError, ValidationError};
use crate::manager::IntegrationManager;
use crate::models::{
    ActionResult, ActionSpec, IntegrationKind, IntegrationStatus, ParamKind, ParamSpec,
    StatusSnapshot,
};
use crate::params::ActionParams;
use crate::status::StatusTracker;

/// Manager for a generic REST API.
///
/// Actions map straight onto HTTP methods; any status code is a valid
/// outcome and `success` follows from it.
#[derive(Debug)]
pub struct RestApiManager {
    client: IntegrationClient,
    status: StatusTracker,
}

impl RestApiManager {
    /// # Errors
    ///
    /// Returns [`IntegrationError::Configuration`] when `base_url` is missing
    /// or the client settings are invalid.
    pub fn new(
        config: &IntegrationConfig,
        transport: Option<HttpService>,
        initial_status: IntegrationStatus,
    ) -> Result<Self, IntegrationError> {
        let base_url = config.base_url_or(None)?;
        let client = config.build_client(&base_url, config.auth_strategy(), transport)?;
        Ok(Self {
            client,
            status: StatusTracker::new(IntegrationKind::RestApi, initial_status),
        })
    }

    #[must_use]
    pub fn client(&self) -> &IntegrationClient {
        &self.client
    }

    async fn call(
        &self,
        method: Method,
        params: &Map<String, Value>,
        cancel: CancellationToken,
    ) -> ActionResult {
        let (path, options) = match parse_call(&method, params) {
            Ok(call) => call,
            Err(ValidationError::MissingParameter(name)) if name == "path" => {
                return ActionResult::failure(
                    "Missing required parameter: path",
                    format!("Path parameter is required for {method} request"),
                );
            }
            Err(err) => {
                return ActionResult::failure(format!("Invalid parameters for {method} request"), err.to_string());
            }
        };

        match self.client.send(method.clone(), &path, options.cancel_on(cancel)).await {
            Ok(response) => action_response(&response),
            Err(err) => {
                let err = IntegrationError::from(err);
                self.status.record_failure(&err);
                ActionResult::failure(format!("{method} request failed: {err}"), err.to_string())
            }
        }
    }
}

fn parse_call(method: &Method, params: &Map<String, Value>) -> Result<(String, SendOptions), ValidationError> {
    let params = ActionParams::new(params);
    let path = params.required_str("path")?.to_owned();

    let mut options = SendOptions {
        headers: params.headers("headers")?,
        timeout: params.timeout("timeout")?,
        ..SendOptions::default()
    };
    if has_body(method) {
        options.json = params.optional_any("json").cloned();
        options.data = params.form("data")?;
    } else {
        options.query = params.pairs("params")?;
    }
    Ok((path, options))
}

fn has_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

fn response_output(response: &NormalizedResponse) -> Map<String, Value> {
    let mut output = Map::new();
    output.insert("status_code".to_owned(), json!(response.status_code()));
    output.insert("reason".to_owned(), json!(response.reason));
    output.insert("url".to_owned(), json!(response.url));
    output.insert("headers".to_owned(), Value::Object(response.headers_json()));
    output
}

fn action_response(response: &NormalizedResponse) -> ActionResult {
    let summary = format!("HTTP {}: {}", response.status_code(), response.reason);
    let mut output = response_output(response);
    output.insert("data".to_owned(), response.body.to_value());

    if response.is_success() {
        ActionResult::success(summary, output)
    } else {
        ActionResult::failure(summary.clone(), summary).with_output(output)
    }
}

fn action_spec(name: &'static str, description: &'static str, with_body: bool) -> ActionSpec {
    let mut parameters = vec![ParamSpec::required("path", ParamKind::String, "endpoint path")];
    if with_body {
        parameters.push(ParamSpec::optional("json", ParamKind::Any, "request body as JSON"));
        parameters.push(ParamSpec::optional(
            "data",
            ParamKind::Object,
            "form fields, or a string sent verbatim",
        ));
    } else {
        parameters.push(ParamSpec::optional("params", ParamKind::Object, "query parameters"));
    }
    parameters.push(ParamSpec::optional("headers", ParamKind::Object, "request headers"));
    parameters.push(ParamSpec::optional("timeout", ParamKind::Number, "timeout in seconds"));
    ActionSpec {
        name,
        description,
        parameters,
    }
}

#[async_trait]
impl IntegrationManager for RestApiManager {
    fn kind(&self) -> IntegrationKind {
        IntegrationKind::RestApi
    }

    async fn test_connection(&self) -> ActionResult {
        let path = match self.client.base_url().path() {
            "" => "/".to_owned(),
            path => path.to_owned(),
        };

        match self.client.get(&path, SendOptions::default()).await {
            Ok(response) if response.is_success() => {
                self.status.record(IntegrationStatus::Connected);
                ActionResult::success(
                    format!(
                        "Connection successful: {} {}",
                        response.status_code(),
                        response.reason
                    ),
                    response_output(&response),
                )
            }
            Ok(response) => {
                self.status.record(IntegrationStatus::Error);
                ActionResult::failure(
                    format!("Connection failed: {} {}", response.status_code(), response.reason),
                    format!("HTTP {}: {}", response.status_code(), response.reason),
                )
            }
            Err(err) => {
                self.status.record(IntegrationStatus::Error);
                ActionResult::failure(format!("Connection test failed: {err}"), err.to_string())
            }
        }
    }

    fn list_actions(&self) -> Vec<ActionSpec> {
        vec![
            action_spec("get", "Make a GET request", false),
            action_spec("post", "Make a POST request", true),
            action_spec("put", "Make a PUT request", true),
            action_spec("patch", "Make a PATCH request", true),
            action_spec("delete", "Make a DELETE request", false),
        ]
    }

    async fn execute_action_with(
        &self,
        name: &str,
        params: &Map<String, Value>,
        cancel: CancellationToken,
    ) -> ActionResult {
        let method = match name {
            "get" => Method::GET,
            "post" => Method::POST,
            "put" => Method::PUT,
            "patch" => Method::PATCH,
            "delete" => Method::DELETE,
            _ => return ActionResult::failure(format!("Unknown action: {name}"), "Invalid action name"),
        };
        self.call(method, params, cancel).await
    }

    fn status(&self) -> StatusSnapshot {
        self.status.snapshot()
    }
}
