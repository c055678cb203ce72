use serde::Serialize;
use thiserror::Error;
use tracing::debug;

pub type Result<T> = std::result::Result<T, CourierError>;

#[derive(Debug, Error)]
pub enum CourierError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for CourierError {
    fn from(err: reqwest::Error) -> Self {
        CourierError::Network(err.to_string())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Thin client for the chat service operators receive alerts on.
pub struct CourierClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl CourierClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// Deliver one message to one chat. No retries; the caller owns
    /// failure policy.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<()> {
        let url = format!("{}/messages", self.base_url);
        let body = SendMessageRequest { chat_id, text };

        debug!(chat_id, chars = text.len(), "Courier send");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(CourierError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}
