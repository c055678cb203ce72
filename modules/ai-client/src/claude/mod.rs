mod client;
mod types;

use anyhow::Result;
use tracing::debug;

use crate::turns::{ChatTurn, TurnRole};
use client::ClaudeClient;
use types::{ChatRequest, WireMessage};

/// Claude-backed completion handle for one model.
#[derive(Clone)]
pub struct Claude {
    model: String,
    client: ClaudeClient,
}

impl Claude {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            model: model.to_string(),
            client: ClaudeClient::new(api_key),
        }
    }

    /// Point the client at a different API host (test servers).
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.client = self.client.with_base_url(url);
        self
    }

    /// One completion call: prior turns plus a system prompt, raw text back.
    /// The caller owns parsing — including re-opening any primed JSON.
    pub async fn complete(&self, prior: &[ChatTurn], system: &str) -> Result<String> {
        let messages = prior.iter().map(|turn| match turn.role {
            TurnRole::User => WireMessage::user(&turn.content),
            TurnRole::Assistant => WireMessage::assistant(&turn.content),
        });

        let request = ChatRequest::new(&self.model)
            .system(system)
            .temperature(0.0)
            .messages(messages);

        let response = self.client.chat(&request).await?;
        let text = response.text().unwrap_or_default();

        debug!(model = %self.model, chars = text.len(), "Claude completion");
        Ok(text)
    }
}
