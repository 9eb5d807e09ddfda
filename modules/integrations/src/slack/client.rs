use http::Method;
use integration_http::{FilePart, FormData, IntegrationClient, SendOptions};
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use crate::error::IntegrationError;

/// Slack Web API endpoint used when the configuration names none.
pub const SLACK_API_BASE: &str = "https://slack.com/api/";

const SERVICE: &str = "Slack";

/// Slack Web API calls on top of an [`IntegrationClient`].
///
/// Every method returns the decoded response object once Slack reports
/// `"ok": true`; `"ok": false` becomes [`IntegrationError::Remote`] carrying
/// Slack's `error` code.
#[derive(Debug, Clone)]
pub struct SlackClient {
    client: IntegrationClient,
    cancel: Option<CancellationToken>,
}

impl SlackClient {
    /// Wrap a client whose base URL is the Web API root and which signs with
    /// the bot token.
    #[must_use]
    pub fn new(client: IntegrationClient) -> Self {
        Self {
            client,
            cancel: None,
        }
    }

    /// A handle whose calls abort when `token` is cancelled.
    #[must_use]
    pub fn cancel_on(&self, token: CancellationToken) -> Self {
        Self {
            client: self.client.clone(),
            cancel: Some(token),
        }
    }

    async fn call(
        &self,
        method: Method,
        endpoint: &str,
        mut options: SendOptions,
    ) -> Result<Map<String, Value>, IntegrationError> {
        if let Some(cancel) = &self.cancel {
            options = options.cancel_on(cancel.clone());
        }

        let response = self.client.send(method, endpoint, options).await?;
        if !response.is_success() {
            return Err(IntegrationError::UnexpectedStatus {
                status: response.status_code(),
                reason: response.reason,
            });
        }

        let Some(Value::Object(body)) = response.json() else {
            return Err(IntegrationError::Remote {
                service: SERVICE,
                message: "response is not a JSON object".to_owned(),
            });
        };
        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_owned();
            tracing::warn!(endpoint, error = %message, "Slack API call rejected");
            return Err(IntegrationError::Remote {
                service: SERVICE,
                message,
            });
        }
        Ok(body.clone())
    }

    async fn post_json(&self, endpoint: &str, body: Value) -> Result<Map<String, Value>, IntegrationError> {
        self.call(Method::POST, endpoint, SendOptions::default().json(body))
            .await
    }

    /// `auth.test`: identity of the bot token.
    ///
    /// # Errors
    ///
    /// Any transport, status or Slack-level failure.
    pub async fn test_connection(&self) -> Result<Map<String, Value>, IntegrationError> {
        self.call(Method::GET, "auth.test", SendOptions::default()).await
    }

    /// `users.info`
    ///
    /// # Errors
    ///
    /// Any transport, status or Slack-level failure.
    pub async fn user_info(&self, user_id: &str) -> Result<Map<String, Value>, IntegrationError> {
        self.call(Method::GET, "users.info", SendOptions::default().query("user", user_id))
            .await
    }

    /// `conversations.info`
    ///
    /// # Errors
    ///
    /// Any transport, status or Slack-level failure.
    pub async fn channel_info(&self, channel_id: &str) -> Result<Map<String, Value>, IntegrationError> {
        self.call(
            Method::GET,
            "conversations.info",
            SendOptions::default().query("channel", channel_id),
        )
        .await
    }

    /// `conversations.list`, public and private channels unless `types` says otherwise.
    ///
    /// # Errors
    ///
    /// Any transport, status or Slack-level failure.
    pub async fn list_channels(&self, types: Option<&str>) -> Result<Map<String, Value>, IntegrationError> {
        let types = types.unwrap_or("public_channel,private_channel");
        self.call(
            Method::GET,
            "conversations.list",
            SendOptions::default().query("types", types),
        )
        .await
    }

    /// `chat.postMessage`
    ///
    /// # Errors
    ///
    /// Any transport, status or Slack-level failure.
    pub async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
        blocks: Option<&Value>,
    ) -> Result<Map<String, Value>, IntegrationError> {
        let mut body = json!({"channel": channel, "text": text});
        insert_some(&mut body, "thread_ts", thread_ts.map(Value::from));
        insert_some(&mut body, "blocks", blocks.cloned());
        self.post_json("chat.postMessage", body).await
    }

    /// `chat.update`
    ///
    /// # Errors
    ///
    /// Any transport, status or Slack-level failure.
    pub async fn update_message(
        &self,
        channel: &str,
        ts: &str,
        text: &str,
        blocks: Option<&Value>,
    ) -> Result<Map<String, Value>, IntegrationError> {
        let mut body = json!({"channel": channel, "ts": ts, "text": text});
        insert_some(&mut body, "blocks", blocks.cloned());
        self.post_json("chat.update", body).await
    }

    /// `chat.delete`
    ///
    /// # Errors
    ///
    /// Any transport, status or Slack-level failure.
    pub async fn delete_message(&self, channel: &str, ts: &str) -> Result<Map<String, Value>, IntegrationError> {
        self.post_json("chat.delete", json!({"channel": channel, "ts": ts}))
            .await
    }

    /// `files.upload` as a multipart form with the content in the `file` part.
    ///
    /// # Errors
    ///
    /// Any transport, status or Slack-level failure.
    pub async fn upload_file(
        &self,
        channels: &str,
        content: impl Into<bytes::Bytes>,
        filename: &str,
        title: Option<&str>,
        initial_comment: Option<&str>,
    ) -> Result<Map<String, Value>, IntegrationError> {
        let mut fields = vec![
            ("channels".to_owned(), channels.to_owned()),
            ("filename".to_owned(), filename.to_owned()),
        ];
        if let Some(title) = title.filter(|t| !t.is_empty()) {
            fields.push(("title".to_owned(), title.to_owned()));
        }
        if let Some(comment) = initial_comment.filter(|c| !c.is_empty()) {
            fields.push(("initial_comment".to_owned(), comment.to_owned()));
        }

        let options = SendOptions::default()
            .form(FormData::Fields(fields))
            .file(FilePart::new("file", filename, content).content_type("application/octet-stream"));
        self.call(Method::POST, "files.upload", options).await
    }

    /// `conversations.create`
    ///
    /// # Errors
    ///
    /// Any transport, status or Slack-level failure.
    pub async fn create_channel(&self, name: &str, is_private: bool) -> Result<Map<String, Value>, IntegrationError> {
        self.post_json(
            "conversations.create",
            json!({"name": name, "is_private": is_private}),
        )
        .await
    }

    /// `conversations.archive`
    ///
    /// # Errors
    ///
    /// Any transport, status or Slack-level failure.
    pub async fn archive_channel(&self, channel_id: &str) -> Result<Map<String, Value>, IntegrationError> {
        self.post_json("conversations.archive", json!({"channel": channel_id}))
            .await
    }

    /// `conversations.invite`
    ///
    /// # Errors
    ///
    /// Any transport, status or Slack-level failure.
    pub async fn invite_user_to_channel(
        &self,
        channel_id: &str,
        user_id: &str,
    ) -> Result<Map<String, Value>, IntegrationError> {
        self.post_json(
            "conversations.invite",
            json!({"channel": channel_id, "users": user_id}),
        )
        .await
    }

    /// `conversations.setTopic`
    ///
    /// # Errors
    ///
    /// Any transport, status or Slack-level failure.
    pub async fn set_channel_topic(&self, channel_id: &str, topic: &str) -> Result<Map<String, Value>, IntegrationError> {
        self.post_json(
            "conversations.setTopic",
            json!({"channel": channel_id, "topic": topic}),
        )
        .await
    }

    /// `conversations.setPurpose`
    ///
    /// # Errors
    ///
    /// Any transport, status or Slack-level failure.
    pub async fn set_channel_purpose(
        &self,
        channel_id: &str,
        purpose: &str,
    ) -> Result<Map<String, Value>, IntegrationError> {
        self.post_json(
            "conversations.setPurpose",
            json!({"channel": channel_id, "purpose": purpose}),
        )
        .await
    }
}

fn insert_some(body: &mut Value, key: &str, value: Option<Value>) {
    if let (Value::Object(map), Some(value)) = (body, value) {
        map.insert(key.to_owned(), value);
    }
}
