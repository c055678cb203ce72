//! Mention-reaction pipeline: the dispatcher's second consumer.
//!
//! Watches the same event stream for messages that mention the bot handle
//! and pings operators over the courier channel. Loss-tolerant like its
//! sibling: a failed ping is logged and dropped.

use std::sync::Arc;

use regex::Regex;
use tokio::sync::mpsc;
use tracing::{info, warn};

use fudwatch_common::MessageEvent;

use crate::stats::SentinelStats;
use crate::traits::NotificationSink;
use crate::util::clip;

const MENTION_EXCERPT_MAX: usize = 300;

pub struct MentionPipeline {
    pattern: Regex,
    bot_handle: String,
    sink: Arc<dyn NotificationSink>,
    stats: Arc<SentinelStats>,
}

impl MentionPipeline {
    pub fn new(bot_handle: &str, sink: Arc<dyn NotificationSink>, stats: Arc<SentinelStats>) -> Self {
        let pattern = Regex::new(&format!(r"(?i)@{}\b", regex::escape(bot_handle)))
            .expect("mention pattern");
        Self {
            pattern,
            bot_handle: bot_handle.to_string(),
            sink,
            stats,
        }
    }

    pub fn is_mention(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// Consume the dispatcher queue until it closes.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<MessageEvent>) {
        while let Some(event) = rx.recv().await {
            if !self.is_mention(&event.message.text) {
                continue;
            }
            SentinelStats::bump(&self.stats.mentions_seen);

            let text = format!(
                "@{} was mentioned by @{}: {}",
                self.bot_handle,
                event.message.author.handle,
                clip(&event.message.text, MENTION_EXCERPT_MAX)
            );
            match self.sink.send(None, &text).await {
                Ok(()) => info!(
                    message_id = event.message.id.as_str(),
                    by = event.message.author.handle.as_str(),
                    "Mention relayed"
                ),
                Err(e) => warn!(
                    message_id = event.message.id.as_str(),
                    error = %e,
                    "Mention ping failed, dropping"
                ),
            }
        }
        info!("Mention queue closed, pipeline stopping");
    }
}
