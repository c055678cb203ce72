// Trait abstractions for the sentinel's collaborators.
//
// FeedSource — the social platform (community posts, replies, follower
//   graphs, post search).
// Completer — the classification service transport.
// NotificationSink — the operator chat channel.
// VerdictStore / StateStore — the external storage layer.
//
// These enable deterministic testing with the scripted mocks in
// `testing`: no network, no database.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use ai_client::{ChatTurn, Claude};
use courier_client::CourierClient;
use feed_client::{FeedClient, WireAuthor, WirePost};
use fudwatch_common::{Author, CachedVerdict, FeedPost, Stage2Verdict, UserState};

/// One page of posts plus the cursor to continue from.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub posts: Vec<FeedPost>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    /// One page of a community's top-level posts, newest first.
    async fn community_posts(&self, community_id: &str, cursor: Option<&str>) -> Result<Page>;

    /// One page of replies to a post.
    async fn replies(
        &self,
        post_id: &str,
        cursor: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Page>;

    async fn followers(&self, handle: &str) -> Result<Vec<Author>>;

    async fn followings(&self, handle: &str) -> Result<Vec<Author>>;

    /// Post search (ticker-mention history).
    async fn search(&self, query: &str, cursor: Option<&str>) -> Result<Page>;
}

#[async_trait]
pub trait Completer: Send + Sync {
    /// Raw completion: prior turns plus a system prompt, text back.
    /// The caller owns parsing.
    async fn complete(&self, prior: &[ChatTurn], system: &str) -> Result<String>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver `text` to an explicit target, or broadcast to every
    /// registered recipient when `target` is absent.
    async fn send(&self, target: Option<&str>, text: &str) -> Result<()>;
}

#[async_trait]
pub trait VerdictStore: Send + Sync {
    async fn cached_verdict(&self, user_id: &str) -> Result<Option<CachedVerdict>>;

    async fn put_cached_verdict(
        &self,
        user_id: &str,
        verdict: &Stage2Verdict,
        ttl: Duration,
    ) -> Result<()>;

    /// Purge expired rows; returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// A user never seen before reads as `UserState::Unknown`.
    async fn user_state(&self, user_id: &str) -> Result<UserState>;

    async fn set_user_state(&self, user_id: &str, state: UserState) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Production adapters
// ---------------------------------------------------------------------------

fn author_from_wire(author: WireAuthor) -> Author {
    Author {
        id: author.id,
        handle: author.handle,
        display_name: author.display_name,
    }
}

fn post_from_wire(post: WirePost) -> FeedPost {
    FeedPost {
        id: post.id,
        author: author_from_wire(post.author),
        text: post.text,
        created_at: post.created_at,
        reply_count: post.reply_count,
        in_reply_to: post.in_reply_to_id,
    }
}

fn page_from_wire(page: feed_client::PostsPage) -> Page {
    Page {
        posts: page.posts.into_iter().map(post_from_wire).collect(),
        next_cursor: page.next_cursor,
        has_more: page.has_more,
    }
}

#[async_trait]
impl FeedSource for FeedClient {
    async fn community_posts(&self, community_id: &str, cursor: Option<&str>) -> Result<Page> {
        Ok(page_from_wire(self.community_posts(community_id, cursor).await?))
    }

    async fn replies(
        &self,
        post_id: &str,
        cursor: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Page> {
        Ok(page_from_wire(self.post_replies(post_id, cursor, since).await?))
    }

    async fn followers(&self, handle: &str) -> Result<Vec<Author>> {
        Ok(self
            .followers(handle)
            .await?
            .into_iter()
            .map(author_from_wire)
            .collect())
    }

    async fn followings(&self, handle: &str) -> Result<Vec<Author>> {
        Ok(self
            .followings(handle)
            .await?
            .into_iter()
            .map(author_from_wire)
            .collect())
    }

    async fn search(&self, query: &str, cursor: Option<&str>) -> Result<Page> {
        Ok(page_from_wire(self.search(query, cursor).await?))
    }
}

#[async_trait]
impl Completer for Claude {
    async fn complete(&self, prior: &[ChatTurn], system: &str) -> Result<String> {
        Claude::complete(self, prior, system).await
    }
}

/// Courier-backed sink. A broadcast fans out to every registered
/// recipient; per-recipient failures are logged and do not stop the rest.
pub struct CourierSink {
    client: CourierClient,
    recipients: Vec<String>,
}

impl CourierSink {
    pub fn new(client: CourierClient, recipients: Vec<String>) -> Self {
        Self { client, recipients }
    }
}

#[async_trait]
impl NotificationSink for CourierSink {
    async fn send(&self, target: Option<&str>, text: &str) -> Result<()> {
        match target {
            Some(chat_id) => {
                self.client.send_message(chat_id, text).await?;
            }
            None => {
                for chat_id in &self.recipients {
                    if let Err(e) = self.client.send_message(chat_id, text).await {
                        warn!(chat_id = chat_id.as_str(), error = %e, "Broadcast delivery failed for recipient");
                    }
                }
            }
        }
        Ok(())
    }
}
