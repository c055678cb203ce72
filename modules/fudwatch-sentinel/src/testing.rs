// Test mocks for the sentinel pipeline.
//
// One scripted mock per trait boundary:
// - ScriptedFeed (FeedSource) — per-cycle post/reply scripts plus
//   search/follower registries for the deep-profile stage
// - ScriptedCompleter (Completer) — queued raw responses, records calls
// - RecordingSink (NotificationSink) — captures sends, optionally failing
// - FailingVerdictStore (VerdictStore) — every call errors
//
// Plus `make_*` helpers for posts, replies, events, verdicts, alerts.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use ai_client::ChatTurn;
use fudwatch_common::{
    Author, CachedVerdict, FeedPost, FudAlert, MessageEvent, RiskLevel, Stage2Verdict,
};

use fudwatch_common::UserState;

use crate::context;
use crate::traits::{Completer, FeedSource, NotificationSink, Page, StateStore, VerdictStore};

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn make_author(handle: &str) -> Author {
    Author {
        id: format!("u-{handle}"),
        handle: handle.to_string(),
        display_name: handle.to_string(),
    }
}

pub fn make_post(id: &str, handle: &str, reply_count: u32) -> FeedPost {
    FeedPost {
        id: id.to_string(),
        author: make_author(handle),
        text: format!("message {id}"),
        created_at: Utc::now(),
        reply_count,
        in_reply_to: None,
    }
}

pub fn make_reply(id: &str, handle: &str, parent_id: &str) -> FeedPost {
    FeedPost {
        in_reply_to: Some(parent_id.to_string()),
        ..make_post(id, handle, 0)
    }
}

pub fn make_event(id: &str, handle: &str) -> MessageEvent {
    let post = make_post(id, handle, 0);
    MessageEvent {
        context: context::for_post(&post),
        message: post,
        observed_at: Utc::now(),
    }
}

pub fn make_event_with_text(id: &str, handle: &str, text: &str) -> MessageEvent {
    let mut post = make_post(id, handle, 0);
    post.text = text.to_string();
    MessageEvent {
        context: context::for_post(&post),
        message: post,
        observed_at: Utc::now(),
    }
}

pub fn make_verdict(is_fud_user: bool) -> Stage2Verdict {
    Stage2Verdict {
        is_fud_user,
        fud_type: if is_fud_user {
            "panic seeding".to_string()
        } else {
            "none".to_string()
        },
        fud_probability: if is_fud_user { 0.9 } else { 0.1 },
        user_risk_level: if is_fud_user {
            RiskLevel::High
        } else {
            RiskLevel::Low
        },
        key_evidence: vec!["dev wallets moving".to_string()],
        decision_reason: "repeats scare claims across history".to_string(),
        user_summary: "account mostly posts doubt".to_string(),
    }
}

pub fn make_alert(handle: &str, is_fud_user: bool) -> FudAlert {
    let event = make_event("m1", handle);
    FudAlert {
        user: event.message.author.clone(),
        verdict: make_verdict(is_fud_user),
        context: event.context,
        observed_at: event.observed_at,
        from_cache: false,
        target: None,
    }
}

// ---------------------------------------------------------------------------
// ScriptedFeed
// ---------------------------------------------------------------------------

/// One poll cycle's worth of feed content.
#[derive(Debug, Clone, Default)]
pub struct FeedCycle {
    pub posts: Vec<FeedPost>,
    pub replies: HashMap<String, Vec<FeedPost>>,
    pub fail_posts: bool,
    pub fail_replies: HashSet<String>,
}

impl FeedCycle {
    pub fn with_posts(posts: Vec<FeedPost>) -> Self {
        Self {
            posts,
            ..Default::default()
        }
    }

    pub fn failing_posts() -> Self {
        Self {
            fail_posts: true,
            ..Default::default()
        }
    }

    pub fn with_replies(mut self, post_id: &str, replies: Vec<FeedPost>) -> Self {
        self.replies.insert(post_id.to_string(), replies);
        self
    }

    pub fn failing_replies_for(mut self, post_id: &str) -> Self {
        self.fail_replies.insert(post_id.to_string());
        self
    }
}

/// Scripted feed. `community_posts` with no cursor advances to the next
/// scripted cycle (the last one repeats once the script runs out); reply
/// fetches serve from the current cycle.
pub struct ScriptedFeed {
    cycles: Mutex<VecDeque<FeedCycle>>,
    current: Mutex<FeedCycle>,
    searches: Mutex<HashMap<String, Vec<FeedPost>>>,
    followers: Mutex<HashMap<String, Vec<Author>>>,
    followings: Mutex<HashMap<String, Vec<Author>>>,
    fail_profile: bool,
    search_calls: AtomicU64,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self {
            cycles: Mutex::new(VecDeque::new()),
            current: Mutex::new(FeedCycle::default()),
            searches: Mutex::new(HashMap::new()),
            followers: Mutex::new(HashMap::new()),
            followings: Mutex::new(HashMap::new()),
            fail_profile: false,
            search_calls: AtomicU64::new(0),
        }
    }

    pub fn with_cycle(self, cycle: FeedCycle) -> Self {
        self.cycles.lock().unwrap().push_back(cycle);
        self
    }

    pub fn on_search(self, query: &str, posts: Vec<FeedPost>) -> Self {
        self.searches
            .lock()
            .unwrap()
            .insert(query.to_string(), posts);
        self
    }

    pub fn on_followers(self, handle: &str, users: Vec<Author>) -> Self {
        self.followers
            .lock()
            .unwrap()
            .insert(handle.to_string(), users);
        self
    }

    pub fn on_followings(self, handle: &str, users: Vec<Author>) -> Self {
        self.followings
            .lock()
            .unwrap()
            .insert(handle.to_string(), users);
        self
    }

    /// Make every profile lookup (search, followers, followings) fail.
    pub fn fail_profile_lookups(mut self) -> Self {
        self.fail_profile = true;
        self
    }

    pub fn search_calls(&self) -> u64 {
        self.search_calls.load(Ordering::Relaxed)
    }
}

impl Default for ScriptedFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    async fn community_posts(&self, _community_id: &str, cursor: Option<&str>) -> Result<Page> {
        if cursor.is_none() {
            if let Some(next) = self.cycles.lock().unwrap().pop_front() {
                *self.current.lock().unwrap() = next;
            }
        }
        let current = self.current.lock().unwrap().clone();
        if current.fail_posts {
            bail!("ScriptedFeed: top-level fetch failure");
        }
        Ok(Page {
            posts: current.posts,
            next_cursor: None,
            has_more: false,
        })
    }

    async fn replies(
        &self,
        post_id: &str,
        _cursor: Option<&str>,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Page> {
        let current = self.current.lock().unwrap().clone();
        if current.fail_replies.contains(post_id) {
            bail!("ScriptedFeed: reply fetch failure for {post_id}");
        }
        Ok(Page {
            posts: current.replies.get(post_id).cloned().unwrap_or_default(),
            next_cursor: None,
            has_more: false,
        })
    }

    async fn followers(&self, handle: &str) -> Result<Vec<Author>> {
        if self.fail_profile {
            bail!("ScriptedFeed: follower lookup failure");
        }
        Ok(self
            .followers
            .lock()
            .unwrap()
            .get(handle)
            .cloned()
            .unwrap_or_default())
    }

    async fn followings(&self, handle: &str) -> Result<Vec<Author>> {
        if self.fail_profile {
            bail!("ScriptedFeed: following lookup failure");
        }
        Ok(self
            .followings
            .lock()
            .unwrap()
            .get(handle)
            .cloned()
            .unwrap_or_default())
    }

    async fn search(&self, query: &str, _cursor: Option<&str>) -> Result<Page> {
        self.search_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_profile {
            bail!("ScriptedFeed: search failure");
        }
        Ok(Page {
            posts: self
                .searches
                .lock()
                .unwrap()
                .get(query)
                .cloned()
                .unwrap_or_default(),
            next_cursor: None,
            has_more: false,
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedCompleter
// ---------------------------------------------------------------------------

enum ScriptedResponse {
    Ok(String),
    Err(String),
}

/// Queued completion responses; every call is recorded for inspection.
pub struct ScriptedCompleter {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    calls: Mutex<Vec<(Vec<ChatTurn>, String)>>,
}

impl ScriptedCompleter {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn then_ok(self, raw: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(ScriptedResponse::Ok(raw.to_string()));
        self
    }

    pub fn then_err(self, message: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(ScriptedResponse::Err(message.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<(Vec<ChatTurn>, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for ScriptedCompleter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Completer for ScriptedCompleter {
    async fn complete(&self, prior: &[ChatTurn], system: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((prior.to_vec(), system.to_string()));
        match self.responses.lock().unwrap().pop_front() {
            Some(ScriptedResponse::Ok(raw)) => Ok(raw),
            Some(ScriptedResponse::Err(message)) => bail!("{message}"),
            None => bail!("ScriptedCompleter: no response scripted for this call"),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

pub struct RecordingSink {
    sends: Mutex<Vec<(Option<String>, String)>>,
    attempts: AtomicU64,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            sends: Mutex::new(Vec::new()),
            attempts: AtomicU64::new(0),
            fail: false,
        }
    }

    /// A sink whose every delivery fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn sends(&self) -> Vec<(Option<String>, String)> {
        self.sends.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}

impl Default for RecordingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, target: Option<&str>, text: &str) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if self.fail {
            bail!("RecordingSink: delivery failure");
        }
        self.sends
            .lock()
            .unwrap()
            .push((target.map(str::to_string), text.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FailingVerdictStore
// ---------------------------------------------------------------------------

/// A verdict store whose every call errors — for fail-open cache tests.
pub struct FailingVerdictStore;

#[async_trait]
impl VerdictStore for FailingVerdictStore {
    async fn cached_verdict(&self, _user_id: &str) -> Result<Option<CachedVerdict>> {
        bail!("FailingVerdictStore: read failure")
    }

    async fn put_cached_verdict(
        &self,
        _user_id: &str,
        _verdict: &Stage2Verdict,
        _ttl: Duration,
    ) -> Result<()> {
        bail!("FailingVerdictStore: write failure")
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize> {
        bail!("FailingVerdictStore: purge failure")
    }
}

/// A state store whose every write errors — persistence failure must
/// never block alerting.
pub struct FailingStateStore;

#[async_trait]
impl StateStore for FailingStateStore {
    async fn user_state(&self, _user_id: &str) -> Result<UserState> {
        Ok(UserState::Unknown)
    }

    async fn set_user_state(&self, _user_id: &str, _state: UserState) -> Result<()> {
        bail!("FailingStateStore: write failure")
    }
}
