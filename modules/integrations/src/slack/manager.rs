use async_trait::async_trait;
use integration_http::{AuthStrategy, HttpService};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use super::client::{SLACK_API_BASE, SlackClient};
use crate::config::IntegrationConfig;
use crate::error::{IntegrationError, ValidationError};
use crate::manager::IntegrationManager;
use crate::models::{
    ActionResult, ActionSpec, IntegrationKind, IntegrationStatus, ParamKind, ParamSpec,
    StatusSnapshot,
};
use crate::params::ActionParams;
use crate::status::StatusTracker;

/// Manager for a Slack workspace reached with a bot token.
#[derive(Debug)]
pub struct SlackManager {
    slack: SlackClient,
    status: StatusTracker,
}

impl SlackManager {
    /// # Errors
    ///
    /// Returns [`IntegrationError::Configuration`] when `bot_token` is missing
    /// or the client settings are invalid.
    pub fn new(
        config: &IntegrationConfig,
        transport: Option<HttpService>,
        initial_status: IntegrationStatus,
    ) -> Result<Self, IntegrationError> {
        let token = config
            .bot_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| IntegrationError::config("bot_token is required"))?;
        let base_url = config.base_url_or(Some(SLACK_API_BASE))?;
        let client = config.build_client(&base_url, Some(AuthStrategy::bearer(token)), transport)?;
        Ok(Self {
            slack: SlackClient::new(client),
            status: StatusTracker::new(IntegrationKind::Slack, initial_status),
        })
    }

    #[must_use]
    pub fn client(&self) -> &SlackClient {
        &self.slack
    }
}

async fn dispatch(
    slack: &SlackClient,
    name: &str,
    params: &ActionParams<'_>,
) -> Result<Map<String, Value>, IntegrationError> {
    match name {
        "post_message" => {
            let channel = params.required_str("channel")?;
            let text = params.optional_str("text")?.unwrap_or_default();
            let thread_ts = params.optional_str("thread_ts")?;
            let blocks = params.optional_array("blocks")?;
            slack.post_message(channel, text, thread_ts, blocks).await
        }
        "update_message" => {
            let channel = params.required_str("channel")?;
            let ts = params.required_str("ts")?;
            let text = params.optional_str("text")?.unwrap_or_default();
            let blocks = params.optional_array("blocks")?;
            slack.update_message(channel, ts, text, blocks).await
        }
        "delete_message" => {
            let channel = params.required_str("channel")?;
            let ts = params.required_str("ts")?;
            slack.delete_message(channel, ts).await
        }
        "upload_file" => {
            let channels = params.required_str("channels")?;
            let content = params.required_str("file_content")?;
            let filename = params.required_str("filename")?;
            let title = params.optional_str("title")?;
            let comment = params.optional_str("initial_comment")?;
            slack
                .upload_file(channels, content.to_owned(), filename, title, comment)
                .await
        }
        "create_channel" => {
            let name = params.required_str("name")?;
            let is_private = params.optional_bool("is_private")?.unwrap_or(false);
            slack.create_channel(name, is_private).await
        }
        "archive_channel" => {
            let channel_id = params.required_str("channel_id")?;
            slack.archive_channel(channel_id).await
        }
        "invite_user_to_channel" => {
            let channel_id = params.required_str("channel_id")?;
            let user_id = params.required_str("user_id")?;
            slack.invite_user_to_channel(channel_id, user_id).await
        }
        "set_channel_topic" => {
            let channel_id = params.required_str("channel_id")?;
            let topic = params.required_str("topic")?;
            slack.set_channel_topic(channel_id, topic).await
        }
        "set_channel_purpose" => {
            let channel_id = params.required_str("channel_id")?;
            let purpose = params.required_str("purpose")?;
            slack.set_channel_purpose(channel_id, purpose).await
        }
        other => Err(ValidationError::UnknownAction(other.to_owned()).into()),
    }
}

fn catalogue() -> Vec<ActionSpec> {
    let channel = ParamSpec::required("channel_id", ParamKind::String, "channel ID");
    vec![
        ActionSpec {
            name: "post_message",
            description: "Post a message to Slack channel",
            parameters: vec![
                ParamSpec::required("channel", ParamKind::String, "channel ID or name"),
                ParamSpec::optional("text", ParamKind::String, "message text"),
                ParamSpec::optional("thread_ts", ParamKind::String, "parent message timestamp, for replying to threads"),
                ParamSpec::optional("blocks", ParamKind::Array, "Block Kit blocks"),
            ],
        },
        ActionSpec {
            name: "update_message",
            description: "Update an existing message",
            parameters: vec![
                ParamSpec::required("channel", ParamKind::String, "channel ID"),
                ParamSpec::required("ts", ParamKind::String, "timestamp of message to update"),
                ParamSpec::optional("text", ParamKind::String, "message text"),
                ParamSpec::optional("blocks", ParamKind::Array, "Block Kit blocks"),
            ],
        },
        ActionSpec {
            name: "delete_message",
            description: "Delete a message",
            parameters: vec![
                ParamSpec::required("channel", ParamKind::String, "channel ID"),
                ParamSpec::required("ts", ParamKind::String, "timestamp of message to delete"),
            ],
        },
        ActionSpec {
            name: "upload_file",
            description: "Upload a file to Slack",
            parameters: vec![
                ParamSpec::required("channels", ParamKind::String, "comma-separated channel IDs"),
                ParamSpec::required("file_content", ParamKind::String, "file content"),
                ParamSpec::required("filename", ParamKind::String, "file name"),
                ParamSpec::optional("title", ParamKind::String, "file title"),
                ParamSpec::optional("initial_comment", ParamKind::String, "message posted with the file"),
            ],
        },
        ActionSpec {
            name: "create_channel",
            description: "Create a new channel",
            parameters: vec![
                ParamSpec::required("name", ParamKind::String, "channel name"),
                ParamSpec::optional("is_private", ParamKind::Boolean, "create a private channel, default false"),
            ],
        },
        ActionSpec {
            name: "archive_channel",
            description: "Archive a channel",
            parameters: vec![channel.clone()],
        },
        ActionSpec {
            name: "invite_user_to_channel",
            description: "Invite a user to a channel",
            parameters: vec![
                channel.clone(),
                ParamSpec::required("user_id", ParamKind::String, "user ID"),
            ],
        },
        ActionSpec {
            name: "set_channel_topic",
            description: "Set the topic of a channel",
            parameters: vec![
                channel.clone(),
                ParamSpec::required("topic", ParamKind::String, "new topic"),
            ],
        },
        ActionSpec {
            name: "set_channel_purpose",
            description: "Set the purpose of a channel",
            parameters: vec![channel, ParamSpec::required("purpose", ParamKind::String, "new purpose")],
        },
    ]
}

#[async_trait]
impl IntegrationManager for SlackManager {
    fn kind(&self) -> IntegrationKind {
        IntegrationKind::Slack
    }

    async fn test_connection(&self) -> ActionResult {
        match self.slack.test_connection().await {
            Ok(identity) => {
                self.status.record(IntegrationStatus::Connected);
                let field = |key: &str, fallback: &str| {
                    identity
                        .get(key)
                        .and_then(Value::as_str)
                        .unwrap_or(fallback)
                        .to_owned()
                };
                let mut output = Map::new();
                output.insert("team".to_owned(), json!(field("team", "Unknown")));
                output.insert("user".to_owned(), json!(field("user", "Unknown")));
                output.insert("url".to_owned(), json!(field("url", "")));
                ActionResult::success("Slack connection successful", output)
            }
            Err(err) => {
                self.status.record(IntegrationStatus::Error);
                ActionResult::failure(format!("Slack connection failed: {err}"), err.to_string())
            }
        }
    }

    fn list_actions(&self) -> Vec<ActionSpec> {
        catalogue()
    }

    async fn execute_action_with(
        &self,
        name: &str,
        params: &Map<String, Value>,
        cancel: CancellationToken,
    ) -> ActionResult {
        let slack = self.slack.cancel_on(cancel);
        let params = ActionParams::new(params);
        match dispatch(&slack, name, &params).await {
            Ok(output) => ActionResult::success(format!("Action '{name}' completed successfully"), output),
            Err(IntegrationError::Validation(err @ ValidationError::UnknownAction(_))) => {
                ActionResult::failure(format!("Unknown action: {name}"), err.to_string())
            }
            Err(err) => {
                self.status.record_failure(&err);
                ActionResult::failure(format!("Action '{name}' failed: {err}"), err.to_string())
            }
        }
    }

    fn status(&self) -> StatusSnapshot {
        self.status.snapshot()
    }
}
