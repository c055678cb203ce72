//! Cross-component tests: detector → dispatcher → classification →
//! alerting, wired over scripted collaborators.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;

use fudwatch_common::UserState;

use crate::alert::AlertNotifier;
use crate::cache::AnalysisCache;
use crate::classify::{
    prompts, ClassificationPipeline, Disposition, Stage1Classifier, Stage2Classifier,
};
use crate::detector::{ChangeDetector, ChangeScanner, IncrementalScanner};
use crate::dispatch::Dispatcher;
use crate::stats::SentinelStats;
use crate::store::{InMemoryStateStore, InMemoryVerdictStore};
use crate::testing::{
    make_event, make_post, make_reply, FailingStateStore, FeedCycle, RecordingSink,
    ScriptedCompleter, ScriptedFeed,
};
use crate::traits::{Completer, FeedSource, NotificationSink, StateStore, VerdictStore};

const STAGE1_YES: &str = "isFud\":true}";
const STAGE1_NO: &str = "isFud\":false}";
const STAGE2_FUD: &str = concat!(
    "isFUDUser\": true, \"fudType\": \"panic seeding\", \"fudProbability\": 0.9, ",
    "\"userRiskLevel\": \"high\", \"keyEvidence\": [\"dev wallets moving\"], ",
    "\"decisionReason\": \"history of scare claims\", ",
    "\"userSummary\": \"account mostly posts doubt\"}"
);
const STAGE2_CLEAN: &str =
    "isFUDUser\": false, \"fudType\": \"none\", \"fudProbability\": 0.05, \"userRiskLevel\": \"low\"}";

struct Harness {
    pipeline: ClassificationPipeline,
    completer: Arc<ScriptedCompleter>,
    sink: Arc<RecordingSink>,
    states: Arc<InMemoryStateStore>,
    stats: Arc<SentinelStats>,
}

fn harness(completer: ScriptedCompleter) -> Harness {
    harness_with_states(completer, Arc::new(InMemoryStateStore::new()))
}

fn harness_with_states(completer: ScriptedCompleter, states: Arc<InMemoryStateStore>) -> Harness {
    let completer = Arc::new(completer);
    let feed = Arc::new(ScriptedFeed::new());
    let sink = Arc::new(RecordingSink::new());
    let stats = Arc::new(SentinelStats::default());
    let verdicts: Arc<dyn VerdictStore> = Arc::new(InMemoryVerdictStore::new());

    let pipeline = ClassificationPipeline::new(
        Stage1Classifier::new(Arc::clone(&completer) as Arc<dyn Completer>),
        Stage2Classifier::new(
            Arc::clone(&completer) as Arc<dyn Completer>,
            feed as Arc<dyn FeedSource>,
            "DOGE",
            2,
            Arc::new(AtomicBool::new(false)),
        ),
        AnalysisCache::new(verdicts, Duration::hours(24)),
        Arc::clone(&states) as Arc<dyn StateStore>,
        AlertNotifier::new(
            Arc::clone(&sink) as Arc<dyn NotificationSink>,
            "https://feed.example",
            Arc::clone(&stats),
        ),
        Arc::clone(&stats),
    );

    Harness {
        pipeline,
        completer,
        sink,
        states,
        stats,
    }
}

// ---------------------------------------------------------------------------
// Change detection properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cold_start_is_idempotent() {
    let baseline = FeedCycle::with_posts(vec![make_post("p1", "alice", 2)]).with_replies(
        "p1",
        vec![make_reply("r1", "bob", "p1"), make_reply("r2", "carol", "p1")],
    );

    // Two fresh runs over the same first poll: zero events each time.
    for _ in 0..2 {
        let feed = Arc::new(ScriptedFeed::new().with_cycle(baseline.clone()));
        let scanner = IncrementalScanner::new(feed, "c1");
        assert!(scanner.scan().await.unwrap().is_empty());
    }

    // And an unchanged second cycle within one run stays silent too.
    let feed = Arc::new(
        ScriptedFeed::new()
            .with_cycle(baseline.clone())
            .with_cycle(baseline),
    );
    let scanner = IncrementalScanner::new(feed, "c1");
    assert!(scanner.scan().await.unwrap().is_empty());
    assert!(scanner.scan().await.unwrap().is_empty());
}

#[tokio::test]
async fn at_most_one_event_per_id_across_cycles() {
    let r1 = make_reply("r1", "bob", "p1");
    let r2 = make_reply("r2", "carol", "p1");
    let feed = Arc::new(
        ScriptedFeed::new()
            .with_cycle(FeedCycle::with_posts(vec![make_post("p1", "alice", 0)]))
            .with_cycle(
                FeedCycle::with_posts(vec![make_post("p1", "alice", 1)])
                    .with_replies("p1", vec![r1.clone()]),
            )
            .with_cycle(
                FeedCycle::with_posts(vec![make_post("p1", "alice", 2)])
                    .with_replies("p1", vec![r1, r2]),
            ),
    );
    let scanner = IncrementalScanner::new(feed, "c1");

    assert!(scanner.scan().await.unwrap().is_empty());

    let second = scanner.scan().await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].message.id, "r1");

    // r1 appears again in the fetched list; only r2 is new.
    let third = scanner.scan().await.unwrap();
    assert_eq!(third.len(), 1);
    assert_eq!(third[0].message.id, "r2");
}

#[tokio::test]
async fn seeded_post_with_one_new_reply_emits_exactly_that_reply() {
    // P1 observed at reply_count=0 on cycle 1 (seeded, no event); on
    // cycle 2 reply_count=1 and the fetch returns R1.
    let feed = Arc::new(
        ScriptedFeed::new()
            .with_cycle(FeedCycle::with_posts(vec![make_post("p1", "alice", 0)]))
            .with_cycle(
                FeedCycle::with_posts(vec![make_post("p1", "alice", 1)])
                    .with_replies("p1", vec![make_reply("r1", "bob", "p1")]),
            ),
    );
    let scanner = IncrementalScanner::new(feed, "c1");

    assert!(scanner.scan().await.unwrap().is_empty(), "cycle 1 seeds");

    let events = scanner.scan().await.unwrap();
    assert_eq!(events.len(), 1, "exactly one event for R1");
    let event = &events[0];
    assert_eq!(event.message.id, "r1");
    assert_eq!(
        event.context.parent.as_ref().map(|p| p.id.as_str()),
        Some("p1")
    );
    assert!(event.context.grandparent.is_none());
}

#[tokio::test]
async fn detector_loop_feeds_both_pipelines() {
    let feed = Arc::new(
        ScriptedFeed::new()
            .with_cycle(FeedCycle::default())
            .with_cycle(FeedCycle::with_posts(vec![make_post("p1", "alice", 0)])),
    );
    let scanner: Arc<dyn ChangeScanner> = Arc::new(IncrementalScanner::new(feed, "c1"));

    let mut dispatcher = Dispatcher::new();
    let mut classify_rx = dispatcher.register("classification", 8);
    let mut mention_rx = dispatcher.register("mentions", 8);
    let dispatcher = Arc::new(dispatcher);

    let stats = Arc::new(SentinelStats::default());
    let stop = Arc::new(AtomicBool::new(false));
    let detector = ChangeDetector::new(
        scanner,
        Arc::clone(&dispatcher),
        Arc::clone(&stats),
        StdDuration::from_millis(10),
        Arc::clone(&stop),
    );

    let runner = tokio::spawn(async move { detector.run().await });
    tokio::time::sleep(StdDuration::from_millis(200)).await;
    stop.store(true, Ordering::SeqCst);
    runner.await.unwrap();

    assert!(stats.cycles.load(Ordering::Relaxed) >= 2);
    assert_eq!(stats.events_emitted.load(Ordering::Relaxed), 1);
    assert_eq!(classify_rx.try_recv().unwrap().message.id, "p1");
    assert_eq!(mention_rx.try_recv().unwrap().message.id, "p1");
}

// ---------------------------------------------------------------------------
// Classification pipeline properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn negative_stage1_never_reaches_stage2() {
    let h = harness(ScriptedCompleter::new().then_ok(STAGE1_NO));

    let disposition = h.pipeline.process(make_event("m1", "alice")).await;
    assert_eq!(disposition, Disposition::Discarded);

    let calls = h.completer.calls();
    assert_eq!(calls.len(), 1, "stage 2 must never be called");
    assert_eq!(calls[0].1, prompts::STAGE1_SYSTEM_PROMPT);
    assert!(h.sink.sends().is_empty());
    // A discarded message makes no state change at all.
    assert_eq!(
        h.states.user_state("u-alice").await.unwrap(),
        UserState::Unknown
    );
}

#[tokio::test]
async fn stage1_error_discards_without_state_change() {
    let h = harness(ScriptedCompleter::new().then_err("service unavailable"));

    let disposition = h.pipeline.process(make_event("m1", "alice")).await;
    assert_eq!(disposition, Disposition::Discarded);
    assert_eq!(h.stats.stage1_errors.load(Ordering::Relaxed), 1);
    assert_eq!(
        h.states.user_state("u-alice").await.unwrap(),
        UserState::Unknown
    );
}

#[tokio::test]
async fn confirmed_user_is_alerted_and_recorded() {
    let h = harness(ScriptedCompleter::new().then_ok(STAGE1_YES).then_ok(STAGE2_FUD));

    let disposition = h.pipeline.process(make_event("m1", "alice")).await;
    assert_eq!(disposition, Disposition::FudConfirmed);
    assert_eq!(
        h.states.user_state("u-alice").await.unwrap(),
        UserState::FudConfirmed
    );

    let sends = h.sink.sends();
    assert_eq!(sends.len(), 1);
    assert!(sends[0].1.contains("Risk:       high"));
    assert_eq!(h.completer.calls()[1].1, prompts::STAGE2_SYSTEM_PROMPT);
}

#[tokio::test]
async fn clean_verdict_sets_state_without_alert() {
    let h = harness(
        ScriptedCompleter::new()
            .then_ok(STAGE1_YES)
            .then_ok(STAGE2_CLEAN),
    );

    let disposition = h.pipeline.process(make_event("m1", "alice")).await;
    assert_eq!(disposition, Disposition::Clean);
    assert_eq!(
        h.states.user_state("u-alice").await.unwrap(),
        UserState::Clean
    );
    assert!(h.sink.sends().is_empty());
}

#[tokio::test]
async fn cached_verdict_short_circuits_stage2_and_still_alerts() {
    // Three responses: stage 1 (message 1), stage 2 (message 1),
    // stage 1 (message 2). A fourth call would error the pipeline.
    let h = harness(
        ScriptedCompleter::new()
            .then_ok(STAGE1_YES)
            .then_ok(STAGE2_FUD)
            .then_ok(STAGE1_YES),
    );

    assert_eq!(
        h.pipeline.process(make_event("m1", "alice")).await,
        Disposition::FudConfirmed
    );
    assert_eq!(
        h.pipeline.process(make_event("m2", "alice")).await,
        Disposition::FudConfirmed,
        "cached verdict must be reused, not re-analyzed"
    );

    assert_eq!(h.completer.call_count(), 3, "no second stage-2 call");
    assert_eq!(h.stats.cache_hits.load(Ordering::Relaxed), 1);
    assert_eq!(h.stats.stage2_calls.load(Ordering::Relaxed), 1);

    let sends = h.sink.sends();
    assert_eq!(sends.len(), 2, "each offending message still alerts");
    assert!(sends[0].1.contains("Source:     fresh analysis"));
    assert!(sends[1].1.contains("Source:     cached verdict"));
    // The emitted verdict equals the cached one.
    assert!(sends[1].1.contains("Risk:       high"));
    assert!(sends[1].1.contains("history of scare claims"));
}

#[tokio::test]
async fn malformed_stage2_fails_closed() {
    let h = harness(
        ScriptedCompleter::new()
            .then_ok(STAGE1_YES)
            .then_ok("I cannot answer in JSON"),
    );

    let disposition = h.pipeline.process(make_event("m1", "alice")).await;
    assert_eq!(disposition, Disposition::Failed);
    assert!(h.sink.sends().is_empty(), "no alert on a failed stage");
    assert_eq!(h.stats.stage2_failures.load(Ordering::Relaxed), 1);
    // No verdict transition: the user stays where stage 1 left them.
    assert_eq!(
        h.states.user_state("u-alice").await.unwrap(),
        UserState::Analyzing
    );
}

#[tokio::test]
async fn state_write_failure_does_not_block_alert() {
    let completer = Arc::new(
        ScriptedCompleter::new()
            .then_ok(STAGE1_YES)
            .then_ok(STAGE2_FUD),
    );
    let sink = Arc::new(RecordingSink::new());
    let stats = Arc::new(SentinelStats::default());

    let pipeline = ClassificationPipeline::new(
        Stage1Classifier::new(Arc::clone(&completer) as Arc<dyn Completer>),
        Stage2Classifier::new(
            Arc::clone(&completer) as Arc<dyn Completer>,
            Arc::new(ScriptedFeed::new()) as Arc<dyn FeedSource>,
            "DOGE",
            2,
            Arc::new(AtomicBool::new(false)),
        ),
        AnalysisCache::new(Arc::new(InMemoryVerdictStore::new()), Duration::hours(24)),
        Arc::new(FailingStateStore) as Arc<dyn StateStore>,
        AlertNotifier::new(
            Arc::clone(&sink) as Arc<dyn NotificationSink>,
            "https://feed.example",
            Arc::clone(&stats),
        ),
        stats,
    );

    let disposition = pipeline.process(make_event("m1", "alice")).await;
    assert_eq!(disposition, Disposition::FudConfirmed);
    assert_eq!(sink.sends().len(), 1, "alert is a point-in-time fact");
}
