use async_trait::async_trait;
use thiserror::Error;

pub mod slack;

pub use self::slack::SlackClient;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("chat request failed: {0}")]
    Http(String),
    #[error("chat api rejected the request: {0}")]
    Api(String),
    #[error("chat request timed out")]
    Timeout,
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DeliveryError::Timeout
        } else {
            DeliveryError::Http(err.to_string())
        }
    }
}

/// Outbound messaging. Sends are fire-and-forget for the notifier: failures
/// are logged by the caller and never retried.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send_channel_message(&self, channel_id: &str, text: &str)
    -> Result<(), DeliveryError>;
    async fn send_direct_message(&self, user_id: &str, text: &str) -> Result<(), DeliveryError>;
}
