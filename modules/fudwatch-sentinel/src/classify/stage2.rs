//! Stage 2: deep profile. Gathers the author's ticker history, social
//! graph, and prior activity summary — all best-effort — then asks for a
//! structured verdict in one call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use ai_client::ChatTurn;
use fudwatch_common::{Author, FeedPost, MessageEvent, Stage2Verdict};

use super::parse::{self, JSON_CONTINUATION_PRIMER};
use super::prompts::{render_thread, STAGE2_SYSTEM_PROMPT};
use crate::traits::{Completer, FeedSource};
use crate::util::clip;

/// Max bytes of one history post excerpt in the prompt.
const HISTORY_EXCERPT_MAX: usize = 280;
/// Max handles listed per social-graph direction.
const GRAPH_LIST_MAX: usize = 50;

/// Whatever could be gathered about the author. Every field degrades to
/// empty when its source fails — partial context never aborts the stage.
#[derive(Debug, Default)]
struct ProfileContext {
    history: Vec<FeedPost>,
    followers: Vec<Author>,
    followings: Vec<Author>,
}

pub struct Stage2Classifier {
    completer: Arc<dyn Completer>,
    feed: Arc<dyn FeedSource>,
    ticker: String,
    history_page_cap: u32,
    stop: Arc<AtomicBool>,
}

impl Stage2Classifier {
    pub fn new(
        completer: Arc<dyn Completer>,
        feed: Arc<dyn FeedSource>,
        ticker: &str,
        history_page_cap: u32,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            completer,
            feed,
            ticker: ticker.to_string(),
            history_page_cap,
            stop,
        }
    }

    /// One deep-profile call. Fails closed: a service error or an
    /// unparseable response is an error, and the caller makes no state
    /// transition and raises no alert.
    pub async fn analyze(
        &self,
        event: &MessageEvent,
        prior_summary: Option<String>,
    ) -> Result<Stage2Verdict> {
        let author = &event.message.author;
        let profile = self.gather(author).await;

        let prompt = self.render_prompt(event, &profile, prior_summary.as_deref());
        let turns = [
            ChatTurn::user(prompt),
            ChatTurn::assistant(JSON_CONTINUATION_PRIMER),
        ];

        let raw = self.completer.complete(&turns, STAGE2_SYSTEM_PROMPT).await?;
        let verdict = parse::parse_stage2(&raw)?;

        info!(
            user = author.handle.as_str(),
            is_fud_user = verdict.is_fud_user,
            risk = %verdict.user_risk_level,
            probability = verdict.fud_probability,
            "Stage-2 verdict"
        );
        Ok(verdict)
    }

    /// Best-effort context gathering: the three feed lookups run
    /// concurrently and each degrades to empty on failure.
    async fn gather(&self, author: &Author) -> ProfileContext {
        let (history, followers, followings) = futures::join!(
            self.ticker_history(&author.handle),
            self.feed.followers(&author.handle),
            self.feed.followings(&author.handle),
        );

        ProfileContext {
            history: history.unwrap_or_else(|e| {
                warn!(user = author.handle.as_str(), error = %e, "Ticker history unavailable");
                Vec::new()
            }),
            followers: followers.unwrap_or_else(|e| {
                warn!(user = author.handle.as_str(), error = %e, "Follower list unavailable");
                Vec::new()
            }),
            followings: followings.unwrap_or_else(|e| {
                warn!(user = author.handle.as_str(), error = %e, "Following list unavailable");
                Vec::new()
            }),
        }
    }

    /// Paged backfill of the author's ticker-mention history. Honors the
    /// cooperative stop flag between pages; the page cap bounds the walk.
    async fn ticker_history(&self, handle: &str) -> Result<Vec<FeedPost>> {
        let query = format!("${} from:{}", self.ticker, handle);
        let mut posts = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..self.history_page_cap {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            let page = self.feed.search(&query, cursor.as_deref()).await?;
            posts.extend(page.posts);
            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }
        Ok(posts)
    }

    fn render_prompt(
        &self,
        event: &MessageEvent,
        profile: &ProfileContext,
        prior_summary: Option<&str>,
    ) -> String {
        let author = &event.message.author;
        let mut out = format!(
            "Flagged message by @{} ({}):\n\n{}\n",
            author.handle,
            author.display_name,
            render_thread(&event.context)
        );

        out.push_str(&format!(
            "\n${} post history ({} posts):\n",
            self.ticker,
            profile.history.len()
        ));
        for post in &profile.history {
            out.push_str(&format!(
                "- [{}] {}\n",
                post.created_at.format("%Y-%m-%d"),
                clip(&post.text, HISTORY_EXCERPT_MAX)
            ));
        }

        out.push_str(&format!(
            "\nFollowers ({}): {}\n",
            profile.followers.len(),
            handle_list(&profile.followers)
        ));
        out.push_str(&format!(
            "Following ({}): {}\n",
            profile.followings.len(),
            handle_list(&profile.followings)
        ));

        match prior_summary {
            Some(summary) => out.push_str(&format!("\nPrior activity summary: {summary}\n")),
            None => out.push_str("\nPrior activity summary: none on record\n"),
        }

        out
    }
}

fn handle_list(users: &[Author]) -> String {
    if users.is_empty() {
        return "(unavailable)".to_string();
    }
    users
        .iter()
        .take(GRAPH_LIST_MAX)
        .map(|u| format!("@{}", u.handle))
        .collect::<Vec<_>>()
        .join(", ")
}
