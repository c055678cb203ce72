//! In-memory implementations of the storage traits.
//!
//! The persistent layer is an external collaborator; these stand in for it
//! in the default build and in tests. They support concurrent readers and
//! serialized writers via `tokio::sync::RwLock`.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use fudwatch_common::{CachedVerdict, Stage2Verdict, UserState};

use crate::traits::{StateStore, VerdictStore};

pub struct InMemoryVerdictStore {
    rows: RwLock<HashMap<String, CachedVerdict>>,
}

impl InMemoryVerdictStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryVerdictStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VerdictStore for InMemoryVerdictStore {
    async fn cached_verdict(&self, user_id: &str) -> Result<Option<CachedVerdict>> {
        Ok(self.rows.read().await.get(user_id).cloned())
    }

    async fn put_cached_verdict(
        &self,
        user_id: &str,
        verdict: &Stage2Verdict,
        ttl: Duration,
    ) -> Result<()> {
        let entry = CachedVerdict::new(verdict.clone(), Utc::now(), ttl);
        self.rows.write().await.insert(user_id.to_string(), entry);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, entry| entry.is_valid(now));
        Ok(before - rows.len())
    }
}

pub struct InMemoryStateStore {
    rows: RwLock<HashMap<String, UserState>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn user_state(&self, user_id: &str) -> Result<UserState> {
        // First sighting creates the row; states are superseded, never deleted.
        let mut rows = self.rows.write().await;
        Ok(*rows.entry(user_id.to_string()).or_default())
    }

    async fn set_user_state(&self, user_id: &str, state: UserState) -> Result<()> {
        self.rows.write().await.insert(user_id.to_string(), state);
        Ok(())
    }
}
