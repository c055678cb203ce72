use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Feed content
// =============================================================================

/// An account as observed on the feed platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
    pub handle: String,
    pub display_name: String,
}

/// A community post or reply. Immutable once observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPost {
    pub id: String,
    pub author: Author,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub reply_count: u32,
    /// Present when this post is a reply to another message.
    pub in_reply_to: Option<String>,
}

/// One level of a thread excerpt — enough to prompt with, nothing more.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub author: Author,
    pub text: String,
}

impl From<&FeedPost> for ThreadMessage {
    fn from(post: &FeedPost) -> Self {
        Self {
            id: post.id.clone(),
            author: post.author.clone(),
            text: post.text.clone(),
        }
    }
}

/// Up to three levels of thread context around a new message.
/// Grandparent is only present for second-level replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadContext {
    pub message: ThreadMessage,
    pub parent: Option<ThreadMessage>,
    pub grandparent: Option<ThreadMessage>,
}

impl ThreadContext {
    /// Number of ancestor levels attached (0, 1, or 2).
    pub fn depth(&self) -> usize {
        self.parent.iter().count() + self.grandparent.iter().count()
    }
}

/// A genuinely new post or reply, as emitted by the change detector.
/// At most one event is ever emitted per message id within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    pub message: FeedPost,
    pub context: ThreadContext,
    pub observed_at: DateTime<Utc>,
}

// =============================================================================
// Classification verdicts
// =============================================================================

/// Stage-1 triage result: is this message FUD-like enough for deep analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage1Verdict {
    #[serde(rename = "isFud")]
    pub is_fud: bool,
}

/// Risk tier assigned by the deep-profile stage.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured stage-2 verdict. Field names mirror the classification
/// service's JSON keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage2Verdict {
    #[serde(rename = "isFUDUser")]
    pub is_fud_user: bool,
    #[serde(rename = "fudType", default)]
    pub fud_type: String,
    #[serde(rename = "fudProbability", default)]
    pub fud_probability: f64,
    #[serde(rename = "userRiskLevel", default)]
    pub user_risk_level: RiskLevel,
    #[serde(rename = "keyEvidence", default)]
    pub key_evidence: Vec<String>,
    #[serde(rename = "decisionReason", default)]
    pub decision_reason: String,
    #[serde(rename = "userSummary", default)]
    pub user_summary: String,
}

/// A stage-2 verdict snapshot held by the analysis cache.
/// Usable iff `now < expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedVerdict {
    pub verdict: Stage2Verdict,
    pub analyzed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CachedVerdict {
    pub fn new(verdict: Stage2Verdict, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            verdict,
            analyzed_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

// =============================================================================
// User lifecycle
// =============================================================================

/// Per-user lifecycle status. Created on first sighting, mutated only by
/// the classification pipeline, superseded rather than deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    #[default]
    Unknown,
    Analyzing,
    Clean,
    FudConfirmed,
}

// =============================================================================
// Alerting
// =============================================================================

/// Denormalized projection of a positive stage-2 verdict plus thread
/// context, ready for the notifier to render.
#[derive(Debug, Clone)]
pub struct FudAlert {
    pub user: Author,
    pub verdict: Stage2Verdict,
    pub context: ThreadContext,
    pub observed_at: DateTime<Utc>,
    /// True when the verdict was served from the analysis cache.
    pub from_cache: bool,
    /// Explicit DM target; broadcast to all recipients when absent.
    pub target: Option<String>,
}
