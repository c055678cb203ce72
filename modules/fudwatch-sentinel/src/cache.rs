//! Analysis cache: short-circuits deep analysis for users with a live
//! verdict.
//!
//! Fail-open by policy — a store error reads as a cache miss and a failed
//! write is swallowed. The underlying verdict itself never fails open;
//! that policy lives in the classification pipeline.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use fudwatch_common::{CachedVerdict, Stage2Verdict};

use crate::traits::VerdictStore;

#[derive(Clone)]
pub struct AnalysisCache {
    store: Arc<dyn VerdictStore>,
    ttl: Duration,
}

impl AnalysisCache {
    pub fn new(store: Arc<dyn VerdictStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// A verdict usable right now, or `None` — missing, expired (lazy
    /// expiry), or store error.
    pub async fn get_valid(&self, user_id: &str) -> Option<CachedVerdict> {
        let now = Utc::now();
        match self.store.cached_verdict(user_id).await {
            Ok(Some(entry)) if entry.is_valid(now) => Some(entry),
            Ok(Some(_)) => {
                debug!(user_id, "Cached verdict expired");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(user_id, error = %e, "Verdict cache read failed, proceeding uncached");
                None
            }
        }
    }

    /// The most recent user summary on record, even from an expired
    /// verdict — prior context for the next deep analysis.
    pub async fn prior_summary(&self, user_id: &str) -> Option<String> {
        match self.store.cached_verdict(user_id).await {
            Ok(Some(entry)) if !entry.verdict.user_summary.is_empty() => {
                Some(entry.verdict.user_summary)
            }
            Ok(_) => None,
            Err(_) => None,
        }
    }

    /// Store a fresh verdict. One synchronous store call; failure is
    /// logged and swallowed.
    pub async fn put(&self, user_id: &str, verdict: &Stage2Verdict) {
        if let Err(e) = self
            .store
            .put_cached_verdict(user_id, verdict, self.ttl)
            .await
        {
            warn!(user_id, error = %e, "Verdict cache write failed, continuing");
        }
    }

    /// Purge expired rows. Meant for a periodic background task; lazy
    /// expiry at read time keeps correctness without it.
    pub async fn compact(&self) -> usize {
        match self.store.purge_expired(Utc::now()).await {
            Ok(purged) => {
                if purged > 0 {
                    info!(purged, "Compacted verdict cache");
                }
                purged
            }
            Err(e) => {
                warn!(error = %e, "Verdict cache compaction failed");
                0
            }
        }
    }
}
