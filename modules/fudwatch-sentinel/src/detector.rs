//! Streaming change detection over the community feed.
//!
//! `ChangeDetector` drives a `ChangeScanner` on a fixed interval and fans
//! results out through the dispatcher. Two interchangeable scanners:
//!
//! - `IncrementalScanner` diffs reply counts against a snapshot;
//!   O(changed posts) work per cycle. It can miss a reply that appears and
//!   leaves the visible page between polls — accepted loss.
//! - `FullScanScanner` walks every reply tree to a bounded depth each
//!   cycle with a capped seen-set; resilient to pagination races at
//!   O(all content) cost.
//!
//! Failure policy: a top-level fetch error aborts only the current cycle;
//! a reply fetch error skips that one post for the cycle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use fudwatch_common::{FeedPost, MessageEvent};

use crate::context;
use crate::dispatch::Dispatcher;
use crate::snapshot::{ReplyCountSnapshot, SeenSet};
use crate::stats::SentinelStats;
use crate::traits::FeedSource;

/// Upper bound on top-level pages walked per cycle.
const MAX_POST_PAGES: u32 = 20;
/// Upper bound on reply pages walked per post per cycle.
const MAX_REPLY_PAGES: u32 = 20;
/// Full-scan cycles between cold reseed passes. The first cycle is always
/// cold; later passes re-baseline ids the capped seen-set may have pruned.
const RESEED_INTERVAL_CYCLES: u64 = 500;

/// One polling cycle's worth of change detection.
#[async_trait]
pub trait ChangeScanner: Send + Sync {
    /// Scan the community once and return events for genuinely new
    /// content. The first call seeds baseline state without emitting.
    async fn scan(&self) -> Result<Vec<MessageEvent>>;
}

async fn fetch_all_posts(feed: &dyn FeedSource, community_id: &str) -> Result<Vec<FeedPost>> {
    let mut posts = Vec::new();
    let mut cursor: Option<String> = None;
    for _ in 0..MAX_POST_PAGES {
        let page = feed.community_posts(community_id, cursor.as_deref()).await?;
        posts.extend(page.posts);
        match page.next_cursor {
            Some(next) if page.has_more => cursor = Some(next),
            _ => break,
        }
    }
    Ok(posts)
}

async fn fetch_all_replies(feed: &dyn FeedSource, post_id: &str) -> Result<Vec<FeedPost>> {
    let mut replies = Vec::new();
    let mut cursor: Option<String> = None;
    for _ in 0..MAX_REPLY_PAGES {
        let page = feed.replies(post_id, cursor.as_deref(), None).await?;
        replies.extend(page.posts);
        match page.next_cursor {
            Some(next) if page.has_more => cursor = Some(next),
            _ => break,
        }
    }
    Ok(replies)
}

// ---------------------------------------------------------------------------
// Incremental strategy
// ---------------------------------------------------------------------------

pub struct IncrementalScanner {
    feed: Arc<dyn FeedSource>,
    community_id: String,
    snapshot: ReplyCountSnapshot,
    seeded: AtomicBool,
}

impl IncrementalScanner {
    pub fn new(feed: Arc<dyn FeedSource>, community_id: &str) -> Self {
        Self {
            feed,
            community_id: community_id.to_string(),
            snapshot: ReplyCountSnapshot::new(),
            seeded: AtomicBool::new(false),
        }
    }

    /// Fetch a post's replies and emit events for ids not yet recorded.
    /// On fetch failure the post's stored count is rolled back so the next
    /// cycle retries; the post is skipped this cycle only.
    async fn collect_new_replies(
        &self,
        post: &FeedPost,
        rollback_count: Option<u32>,
        now: DateTime<Utc>,
        events: &mut Vec<MessageEvent>,
    ) {
        let replies = match fetch_all_replies(self.feed.as_ref(), &post.id).await {
            Ok(replies) => replies,
            Err(e) => {
                warn!(
                    post_id = post.id.as_str(),
                    error = %e,
                    "Reply fetch failed, skipping post this cycle"
                );
                if let Some(previous) = rollback_count {
                    self.snapshot.get_and_update(&post.id, previous);
                }
                return;
            }
        };

        for reply in &replies {
            if self.snapshot.get_and_update(&reply.id, reply.reply_count).is_none() {
                events.push(MessageEvent {
                    message: reply.clone(),
                    context: context::for_reply(reply, post, &replies),
                    observed_at: now,
                });
            }
        }
    }
}

#[async_trait]
impl ChangeScanner for IncrementalScanner {
    async fn scan(&self) -> Result<Vec<MessageEvent>> {
        let cold = !self.seeded.load(Ordering::SeqCst);
        let posts = fetch_all_posts(self.feed.as_ref(), &self.community_id).await?;
        let now = Utc::now();
        let mut events = Vec::new();

        for post in &posts {
            let previous = self.snapshot.get_and_update(&post.id, post.reply_count);
            match previous {
                None if cold => {
                    // Cold baseline: record the post and everything under
                    // it, emitting nothing.
                    if let Err(e) = self.seed_replies(&post.id).await {
                        warn!(
                            post_id = post.id.as_str(),
                            error = %e,
                            "Reply seed failed, skipping post this cycle"
                        );
                    }
                }
                None => {
                    // Brand-new top-level post.
                    events.push(MessageEvent {
                        message: post.clone(),
                        context: context::for_post(post),
                        observed_at: now,
                    });
                    if post.reply_count > 0 {
                        self.collect_new_replies(post, None, now, &mut events).await;
                    }
                }
                Some(prev) if post.reply_count > prev => {
                    self.collect_new_replies(post, Some(prev), now, &mut events)
                        .await;
                }
                Some(prev) if post.reply_count < prev => {
                    // Rotated id: the snapshot already re-baselined to the
                    // lower count. Nothing to emit.
                    debug!(
                        post_id = post.id.as_str(),
                        previous = prev,
                        current = post.reply_count,
                        "Reply count decreased, treating as rotated id"
                    );
                }
                Some(_) => {}
            }
        }

        if cold {
            self.seeded.store(true, Ordering::SeqCst);
            info!(
                posts = posts.len(),
                tracked = self.snapshot.len(),
                "Cold-start baseline seeded"
            );
        }
        Ok(events)
    }
}

impl IncrementalScanner {
    async fn seed_replies(&self, post_id: &str) -> Result<()> {
        let replies = fetch_all_replies(self.feed.as_ref(), post_id).await?;
        for reply in &replies {
            self.snapshot.get_and_update(&reply.id, reply.reply_count);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Full-scan strategy
// ---------------------------------------------------------------------------

pub struct FullScanScanner {
    feed: Arc<dyn FeedSource>,
    community_id: String,
    seen: SeenSet,
    max_depth: u32,
    cycle: AtomicU64,
}

impl FullScanScanner {
    pub fn new(
        feed: Arc<dyn FeedSource>,
        community_id: &str,
        max_depth: u32,
        seen_cap: usize,
    ) -> Self {
        Self {
            feed,
            community_id: community_id.to_string(),
            seen: SeenSet::new(seen_cap),
            max_depth: max_depth.max(1),
            cycle: AtomicU64::new(0),
        }
    }

    /// Collect a post's entire reply tree, depth-bounded. Any fetch error
    /// aborts the walk so the whole post is skipped this cycle, unmarked.
    async fn walk_tree(&self, root: &FeedPost) -> Result<Vec<FeedPost>> {
        let mut collected = Vec::new();
        let mut frontier = vec![(root.id.clone(), 0u32)];

        while let Some((id, depth)) = frontier.pop() {
            if depth >= self.max_depth {
                continue;
            }
            let replies = fetch_all_replies(self.feed.as_ref(), &id).await?;
            for reply in &replies {
                if reply.reply_count > 0 {
                    frontier.push((reply.id.clone(), depth + 1));
                }
            }
            collected.extend(replies);
        }
        Ok(collected)
    }
}

#[async_trait]
impl ChangeScanner for FullScanScanner {
    async fn scan(&self) -> Result<Vec<MessageEvent>> {
        let cycle = self.cycle.fetch_add(1, Ordering::SeqCst);
        let cold = cycle % RESEED_INTERVAL_CYCLES == 0;
        let posts = fetch_all_posts(self.feed.as_ref(), &self.community_id).await?;
        let now = Utc::now();
        let mut events = Vec::new();

        for post in &posts {
            let tree = match self.walk_tree(post).await {
                Ok(tree) => tree,
                Err(e) => {
                    warn!(
                        post_id = post.id.as_str(),
                        error = %e,
                        "Reply walk failed, skipping post this cycle"
                    );
                    continue;
                }
            };

            if self.seen.insert(&post.id) && !cold {
                events.push(MessageEvent {
                    message: post.clone(),
                    context: context::for_post(post),
                    observed_at: now,
                });
            }
            for reply in &tree {
                if self.seen.insert(&reply.id) && !cold {
                    events.push(MessageEvent {
                        message: reply.clone(),
                        context: context::for_reply(reply, post, &tree),
                        observed_at: now,
                    });
                }
            }
        }

        if cold {
            info!(cycle, seen = self.seen.len(), "Cold seeding pass complete");
        }
        Ok(events)
    }
}

// ---------------------------------------------------------------------------
// Poll loop
// ---------------------------------------------------------------------------

/// Drives a scanner on a fixed interval and dispatches what it finds.
pub struct ChangeDetector {
    scanner: Arc<dyn ChangeScanner>,
    dispatcher: Arc<Dispatcher>,
    stats: Arc<SentinelStats>,
    interval: Duration,
    stop: Arc<AtomicBool>,
}

impl ChangeDetector {
    pub fn new(
        scanner: Arc<dyn ChangeScanner>,
        dispatcher: Arc<Dispatcher>,
        stats: Arc<SentinelStats>,
        interval: Duration,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            scanner,
            dispatcher,
            stats,
            interval,
            stop,
        }
    }

    /// Poll until the stop flag is raised. A failed cycle is logged and
    /// abandoned; the loop continues on the next tick. Nothing here may
    /// terminate the process.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if self.stop.load(Ordering::SeqCst) {
                info!("Change detector stopping");
                break;
            }

            SentinelStats::bump(&self.stats.cycles);
            match self.scanner.scan().await {
                Ok(events) => {
                    if !events.is_empty() {
                        info!(count = events.len(), "New messages detected");
                    }
                    for event in &events {
                        self.dispatcher.offer_all(event);
                        SentinelStats::bump(&self.stats.events_emitted);
                    }
                }
                Err(e) => warn!(error = %e, "Poll cycle failed, retrying next tick"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{make_post, make_reply, FeedCycle, ScriptedFeed};

    fn incremental(feed: Arc<ScriptedFeed>) -> IncrementalScanner {
        IncrementalScanner::new(feed, "c1")
    }

    fn full_scan(feed: Arc<ScriptedFeed>, max_depth: u32) -> FullScanScanner {
        FullScanScanner::new(feed, "c1", max_depth, 1000)
    }

    #[tokio::test]
    async fn incremental_new_post_emits_one_event() {
        let feed = Arc::new(
            ScriptedFeed::new()
                .with_cycle(FeedCycle::default())
                .with_cycle(FeedCycle::with_posts(vec![make_post("p1", "alice", 0)])),
        );
        let scanner = incremental(feed);

        assert!(scanner.scan().await.unwrap().is_empty(), "cold seed");
        let events = scanner.scan().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message.id, "p1");
        assert!(events[0].context.parent.is_none());
    }

    #[tokio::test]
    async fn incremental_top_level_failure_aborts_cycle_only() {
        let p1 = make_post("p1", "alice", 0);
        let feed = Arc::new(
            ScriptedFeed::new()
                .with_cycle(FeedCycle::default())
                .with_cycle(FeedCycle::failing_posts())
                .with_cycle(FeedCycle::with_posts(vec![p1])),
        );
        let scanner = incremental(feed);

        scanner.scan().await.unwrap();
        assert!(scanner.scan().await.is_err(), "failed cycle surfaces as Err");
        // The next cycle still detects the new post.
        let events = scanner.scan().await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn incremental_reply_fetch_failure_rolls_back_and_retries() {
        let p1_quiet = make_post("p1", "alice", 0);
        let p1_one_reply = make_post("p1", "alice", 1);
        let r1 = make_reply("r1", "bob", "p1");

        let feed = Arc::new(
            ScriptedFeed::new()
                .with_cycle(FeedCycle::with_posts(vec![p1_quiet]))
                .with_cycle(
                    FeedCycle::with_posts(vec![p1_one_reply.clone()]).failing_replies_for("p1"),
                )
                .with_cycle(
                    FeedCycle::with_posts(vec![p1_one_reply]).with_replies("p1", vec![r1]),
                ),
        );
        let scanner = incremental(feed);

        scanner.scan().await.unwrap();
        // Reply fetch fails: post skipped this cycle, count rolled back.
        assert!(scanner.scan().await.unwrap().is_empty());
        // Next cycle sees the same increase and delivers the reply.
        let events = scanner.scan().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message.id, "r1");
    }

    #[tokio::test]
    async fn incremental_reply_count_decrease_is_silent() {
        let feed = Arc::new(
            ScriptedFeed::new()
                .with_cycle(FeedCycle::with_posts(vec![make_post("p1", "alice", 5)]))
                .with_cycle(FeedCycle::with_posts(vec![make_post("p1", "alice", 2)])),
        );
        let scanner = incremental(feed);

        scanner.scan().await.unwrap();
        let events = scanner.scan().await.unwrap();
        assert!(events.is_empty(), "a decrease is a rotated id, not an event");
    }

    #[tokio::test]
    async fn full_scan_first_cycle_seeds_silently_then_detects() {
        let p1 = make_post("p1", "alice", 1);
        let r1 = make_reply("r1", "bob", "p1");
        let r2 = make_reply("r2", "carol", "p1");

        let feed = Arc::new(
            ScriptedFeed::new()
                .with_cycle(
                    FeedCycle::with_posts(vec![p1.clone()]).with_replies("p1", vec![r1.clone()]),
                )
                .with_cycle(
                    FeedCycle::with_posts(vec![p1]).with_replies("p1", vec![r1, r2]),
                ),
        );
        let scanner = full_scan(feed, 10);

        assert!(scanner.scan().await.unwrap().is_empty(), "cold pass");
        let events = scanner.scan().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message.id, "r2");
        assert_eq!(
            events[0].context.parent.as_ref().map(|p| p.id.as_str()),
            Some("p1")
        );
    }

    #[tokio::test]
    async fn full_scan_reaches_nested_replies_with_grandparent_context() {
        let p1 = make_post("p1", "alice", 1);
        let mut r1 = make_reply("r1", "bob", "p1");
        r1.reply_count = 1;
        let r2 = make_reply("r2", "carol", "r1");

        let feed = Arc::new(
            ScriptedFeed::new()
                .with_cycle(
                    FeedCycle::with_posts(vec![p1.clone()]).with_replies("p1", vec![r1.clone()]),
                )
                .with_cycle(
                    FeedCycle::with_posts(vec![p1])
                        .with_replies("p1", vec![r1])
                        .with_replies("r1", vec![r2]),
                ),
        );
        let scanner = full_scan(feed, 10);

        scanner.scan().await.unwrap();
        let events = scanner.scan().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message.id, "r2");
        assert_eq!(
            events[0].context.parent.as_ref().map(|p| p.id.as_str()),
            Some("r1")
        );
        assert_eq!(
            events[0].context.grandparent.as_ref().map(|p| p.id.as_str()),
            Some("p1")
        );
    }

    #[tokio::test]
    async fn full_scan_respects_depth_bound() {
        let p1 = make_post("p1", "alice", 1);
        let mut r1 = make_reply("r1", "bob", "p1");
        r1.reply_count = 1;
        let r2 = make_reply("r2", "carol", "r1");

        // Depth 1: only p1's direct replies are fetched; r1's subtree is
        // never walked, so r2 stays invisible.
        let cycle = FeedCycle::with_posts(vec![p1])
            .with_replies("p1", vec![r1])
            .with_replies("r1", vec![r2]);
        let feed = Arc::new(
            ScriptedFeed::new()
                .with_cycle(cycle.clone())
                .with_cycle(cycle),
        );
        let scanner = full_scan(feed, 1);

        scanner.scan().await.unwrap();
        let events = scanner.scan().await.unwrap();
        assert!(events.is_empty(), "r2 is beyond the depth bound");
    }

    #[tokio::test]
    async fn full_scan_reply_walk_failure_skips_post_unmarked() {
        let p1 = make_post("p1", "alice", 1);
        let r1 = make_reply("r1", "bob", "p1");

        let feed = Arc::new(
            ScriptedFeed::new()
                .with_cycle(FeedCycle::default())
                .with_cycle(
                    FeedCycle::with_posts(vec![p1.clone()]).failing_replies_for("p1"),
                )
                .with_cycle(
                    FeedCycle::with_posts(vec![p1]).with_replies("p1", vec![r1]),
                ),
        );
        let scanner = full_scan(feed, 10);

        scanner.scan().await.unwrap();
        assert!(scanner.scan().await.unwrap().is_empty(), "post skipped");
        // Both the post and its reply arrive once the walk succeeds.
        let events = scanner.scan().await.unwrap();
        let ids: Vec<_> = events.iter().map(|e| e.message.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "r1"]);
    }
}
