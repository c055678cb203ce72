use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::Claude;
use courier_client::CourierClient;
use feed_client::FeedClient;
use fudwatch_common::{Config, ScanStrategy};
use fudwatch_sentinel::alert::AlertNotifier;
use fudwatch_sentinel::cache::AnalysisCache;
use fudwatch_sentinel::classify::{ClassificationPipeline, Stage1Classifier, Stage2Classifier};
use fudwatch_sentinel::detector::{
    ChangeDetector, ChangeScanner, FullScanScanner, IncrementalScanner,
};
use fudwatch_sentinel::dispatch::Dispatcher;
use fudwatch_sentinel::mentions::MentionPipeline;
use fudwatch_sentinel::stats::SentinelStats;
use fudwatch_sentinel::store::{InMemoryStateStore, InMemoryVerdictStore};
use fudwatch_sentinel::traits::{
    Completer, CourierSink, FeedSource, NotificationSink, StateStore, VerdictStore,
};

/// How often the background compaction purges expired verdict rows.
const COMPACTION_INTERVAL: Duration = Duration::from_secs(3600);
/// How often the run counters are logged while the sentinel is up.
const STATS_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("fudwatch=info".parse()?))
        .init();

    let run_id = uuid::Uuid::new_v4();
    info!(run_id = %run_id, "FUD sentinel starting...");

    // Load config — missing credentials are the only fatal error.
    let config = Config::from_env();
    config.log_redacted();

    // Collaborators
    let feed: Arc<dyn FeedSource> = Arc::new(FeedClient::new(
        &config.feed_api_base,
        &config.feed_api_key,
    ));
    let stage1_completer: Arc<dyn Completer> = Arc::new(Claude::new(
        &config.anthropic_api_key,
        &config.stage1_model,
    ));
    let stage2_completer: Arc<dyn Completer> = Arc::new(Claude::new(
        &config.anthropic_api_key,
        &config.stage2_model,
    ));
    let sink: Arc<dyn NotificationSink> = Arc::new(CourierSink::new(
        CourierClient::new(&config.courier_api_base, &config.courier_token),
        config.courier_recipients.clone(),
    ));

    // Stores stand in for the external storage layer.
    let verdicts: Arc<dyn VerdictStore> = Arc::new(InMemoryVerdictStore::new());
    let states: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());

    let stats = Arc::new(SentinelStats::default());
    let stop = Arc::new(AtomicBool::new(false));
    let cache = AnalysisCache::new(
        Arc::clone(&verdicts),
        chrono::Duration::hours(config.cache_ttl_hours),
    );

    // Fan-out: one bounded queue per downstream pipeline.
    let mut dispatcher = Dispatcher::new();
    let classify_rx = dispatcher.register("classification", config.queue_capacity);
    let mention_rx = dispatcher.register("mentions", config.queue_capacity);
    let dispatcher = Arc::new(dispatcher);

    // Classification pipeline
    let pipeline = Arc::new(ClassificationPipeline::new(
        Stage1Classifier::new(stage1_completer),
        Stage2Classifier::new(
            stage2_completer,
            Arc::clone(&feed),
            &config.ticker,
            config.history_page_cap,
            Arc::clone(&stop),
        ),
        cache.clone(),
        Arc::clone(&states),
        AlertNotifier::new(Arc::clone(&sink), &config.feed_api_base, Arc::clone(&stats)),
        Arc::clone(&stats),
    ));
    tokio::spawn(pipeline.run(classify_rx));

    // Mention-reaction pipeline
    let mentions = Arc::new(MentionPipeline::new(
        &config.bot_handle,
        Arc::clone(&sink),
        Arc::clone(&stats),
    ));
    tokio::spawn(mentions.run(mention_rx));

    // Background cache compaction (lazy expiry keeps correctness without it)
    tokio::spawn({
        let cache = cache.clone();
        async move {
            let mut ticker = tokio::time::interval(COMPACTION_INTERVAL);
            loop {
                ticker.tick().await;
                cache.compact().await;
            }
        }
    });

    // Periodic run-counter summary
    tokio::spawn({
        let stats = Arc::clone(&stats);
        async move {
            let mut ticker = tokio::time::interval(STATS_INTERVAL);
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                info!("{stats}");
            }
        }
    });

    // Change detector
    let scanner: Arc<dyn ChangeScanner> = match config.scan_strategy {
        ScanStrategy::Incremental => Arc::new(IncrementalScanner::new(
            Arc::clone(&feed),
            &config.community_id,
        )),
        ScanStrategy::FullScan => Arc::new(FullScanScanner::new(
            Arc::clone(&feed),
            &config.community_id,
            config.full_scan_max_depth,
            config.seen_set_cap,
        )),
    };
    let detector = ChangeDetector::new(
        scanner,
        Arc::clone(&dispatcher),
        Arc::clone(&stats),
        Duration::from_secs(config.poll_interval_secs),
        Arc::clone(&stop),
    );

    // Cooperative stop on ctrl-c.
    tokio::spawn({
        let stop = Arc::clone(&stop);
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
                stop.store(true, Ordering::SeqCst);
            }
        }
    });

    detector.run().await;

    info!(dropped = dispatcher.dropped_total(), "Sentinel stopped");
    info!("{stats}");
    Ok(())
}
