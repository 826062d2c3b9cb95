use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{ChatGateway, DeliveryError};
use crate::config::SlackConfig;

#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenConversation<'a> {
    users: &'a str,
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channel: Option<SlackChannelRef>,
}

#[derive(Debug, Deserialize)]
struct SlackChannelRef {
    id: String,
}

/// Slack Web API client for the two calls the notifier needs.
pub struct SlackClient {
    http: reqwest::Client,
    api_url: Url,
    token: SecretString,
}

impl SlackClient {
    pub fn new(config: &SlackConfig) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;

        Ok(Self {
            http,
            api_url: base_url(&config.api_url)?,
            token: SecretString::from(config.bot_token.expose_secret().to_owned()),
        })
    }

    fn endpoint(&self, method: &str) -> Result<Url, DeliveryError> {
        self.api_url
            .join(method)
            .map_err(|e| DeliveryError::Http(format!("invalid slack endpoint {method}: {e}")))
    }

    async fn call<B: Serialize + ?Sized>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<SlackResponse, DeliveryError> {
        let response = self
            .http
            .post(self.endpoint(method)?)
            .bearer_auth(self.token.expose_secret())
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json::<SlackResponse>()
            .await?;

        check_response(response)
    }

    async fn open_direct_channel(&self, user_id: &str) -> Result<String, DeliveryError> {
        let response = self
            .call("conversations.open", &OpenConversation { users: user_id })
            .await?;

        response
            .channel
            .map(|channel| channel.id)
            .ok_or_else(|| DeliveryError::Api("conversations.open returned no channel".to_string()))
    }
}

#[async_trait]
impl ChatGateway for SlackClient {
    async fn send_channel_message(
        &self,
        channel_id: &str,
        text: &str,
    ) -> Result<(), DeliveryError> {
        debug!(channel_id = %channel_id, text_len = text.len(), "slack post message");
        self.call(
            "chat.postMessage",
            &PostMessage {
                channel: channel_id,
                text,
            },
        )
        .await
        .map(|_| ())
    }

    async fn send_direct_message(&self, user_id: &str, text: &str) -> Result<(), DeliveryError> {
        let channel_id = self.open_direct_channel(user_id).await?;
        debug!(user_id = %user_id, channel_id = %channel_id, "slack direct message");
        self.call(
            "chat.postMessage",
            &PostMessage {
                channel: &channel_id,
                text,
            },
        )
        .await
        .map(|_| ())
    }
}

// `Url::join` replaces the last path segment unless the base ends in a slash.
fn base_url(raw: &str) -> Result<Url, DeliveryError> {
    let mut normalized = raw.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    Url::parse(&normalized)
        .map_err(|e| DeliveryError::Http(format!("invalid slack api url {raw:?}: {e}")))
}

fn check_response(response: SlackResponse) -> Result<SlackResponse, DeliveryError> {
    if response.ok {
        Ok(response)
    } else {
        Err(DeliveryError::Api(
            response
                .error
                .unwrap_or_else(|| "unknown_error".to_string()),
        ))
    }
}
