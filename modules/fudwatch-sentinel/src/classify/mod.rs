//! The two-stage classification pipeline.
//!
//! Per message: `Received → Stage1Evaluated → {Discarded | Stage2Pending}
//! → Stage2Evaluated → {Clean | FudConfirmed}`. Stage 2 runs iff stage 1
//! said yes, and is skipped entirely when the analysis cache holds a live
//! verdict for the author.

pub mod parse;
pub mod prompts;
pub mod stage1;
pub mod stage2;

pub use stage1::Stage1Classifier;
pub use stage2::Stage2Classifier;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use fudwatch_common::{FudAlert, MessageEvent, UserState};

use crate::alert::AlertNotifier;
use crate::cache::AnalysisCache;
use crate::stats::SentinelStats;
use crate::traits::StateStore;

/// Terminal disposition of one message's trip through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Stage 1 said no (or errored): dropped without further processing.
    Discarded,
    /// Deep analysis cleared the author.
    Clean,
    /// Deep analysis confirmed the author; an alert was raised.
    FudConfirmed,
    /// Stage 2 failed closed: no state change, no alert.
    Failed,
}

pub struct ClassificationPipeline {
    stage1: Stage1Classifier,
    stage2: Stage2Classifier,
    cache: AnalysisCache,
    states: Arc<dyn StateStore>,
    notifier: AlertNotifier,
    stats: Arc<SentinelStats>,
}

impl ClassificationPipeline {
    pub fn new(
        stage1: Stage1Classifier,
        stage2: Stage2Classifier,
        cache: AnalysisCache,
        states: Arc<dyn StateStore>,
        notifier: AlertNotifier,
        stats: Arc<SentinelStats>,
    ) -> Self {
        Self {
            stage1,
            stage2,
            cache,
            states,
            notifier,
            stats,
        }
    }

    /// Consume the dispatcher queue until it closes. Each message runs in
    /// a short-lived task; the two stages for one message stay sequential
    /// inside it, while independent messages proceed concurrently.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<MessageEvent>) {
        while let Some(event) = rx.recv().await {
            let pipeline = Arc::clone(&self);
            tokio::spawn(async move {
                pipeline.process(event).await;
            });
        }
        info!("Classification queue closed, pipeline stopping");
    }

    /// Run one message through both stages. Never errors — every failure
    /// mode is a logged disposition.
    pub async fn process(&self, event: MessageEvent) -> Disposition {
        let user_id = event.message.author.id.clone();
        let handle = event.message.author.handle.clone();

        // Stage-1 gate: no or error means discard, nothing else happens.
        match self.stage1.triage(&event).await {
            Ok(true) => {}
            Ok(false) => {
                SentinelStats::bump(&self.stats.stage1_discarded);
                debug!(
                    message_id = event.message.id.as_str(),
                    "Not FUD-like, discarded"
                );
                return Disposition::Discarded;
            }
            Err(e) => {
                SentinelStats::bump(&self.stats.stage1_errors);
                warn!(
                    message_id = event.message.id.as_str(),
                    error = %e,
                    "Stage-1 failed, discarding message"
                );
                return Disposition::Discarded;
            }
        }
        SentinelStats::bump(&self.stats.stage1_flagged);

        if let Err(e) = self.states.set_user_state(&user_id, UserState::Analyzing).await {
            warn!(user = handle.as_str(), error = %e, "Failed to record analyzing state");
        }

        // Cache short-circuit: a live verdict is reused verbatim.
        let (verdict, from_cache) = match self.cache.get_valid(&user_id).await {
            Some(cached) => {
                SentinelStats::bump(&self.stats.cache_hits);
                debug!(user = handle.as_str(), "Reusing cached verdict");
                (cached.verdict, true)
            }
            None => {
                let prior_summary = self.cache.prior_summary(&user_id).await;
                SentinelStats::bump(&self.stats.stage2_calls);
                match self.stage2.analyze(&event, prior_summary).await {
                    Ok(fresh) => {
                        self.cache.put(&user_id, &fresh).await;
                        (fresh, false)
                    }
                    Err(e) => {
                        SentinelStats::bump(&self.stats.stage2_failures);
                        warn!(user = handle.as_str(), error = %e, "Stage-2 failed closed");
                        return Disposition::Failed;
                    }
                }
            }
        };

        let state = if verdict.is_fud_user {
            UserState::FudConfirmed
        } else {
            UserState::Clean
        };
        if let Err(e) = self.states.set_user_state(&user_id, state).await {
            // A verdict is a point-in-time fact; persistence failure never
            // blocks the alert.
            warn!(user = handle.as_str(), error = %e, "Failed to persist user state");
        }

        if verdict.is_fud_user {
            SentinelStats::bump(&self.stats.users_confirmed);
            self.notifier
                .notify(FudAlert {
                    user: event.message.author.clone(),
                    verdict,
                    context: event.context.clone(),
                    observed_at: event.observed_at,
                    from_cache,
                    target: None,
                })
                .await;
            Disposition::FudConfirmed
        } else {
            SentinelStats::bump(&self.stats.users_clean);
            Disposition::Clean
        }
    }
}
