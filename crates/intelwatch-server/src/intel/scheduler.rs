//! Collection and sweep scheduling.
//!
//! Two independent recurring jobs share one discipline: a timer fire (or a
//! manual trigger, which is a synthetic timer fire) while the same job is
//! already running is a logged no-op skip, so at most one cycle per job type
//! is ever in flight. Each job's Idle/Running state is owned here and only
//! exposed through `is_collection_running()` / `is_sweep_running()`.

use chrono::Utc;
use intelwatch_feeds::collector::FeedCollector;
use intelwatch_feeds::normalizer::normalize;
use intelwatch_ingest::{IngestEngine, RetentionSweeper};
use intelwatch_storage::SqlThreatStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{interval, Duration};

pub struct CollectionScheduler {
    store: Arc<SqlThreatStore>,
    engine: Arc<IngestEngine>,
    collector: FeedCollector,
    sweeper: RetentionSweeper,
    collection_interval_secs: u64,
    sweep_interval_secs: u64,
    retention_days: u32,
    collection_running: AtomicBool,
    sweep_running: AtomicBool,
}

impl CollectionScheduler {
    pub fn new(
        store: Arc<SqlThreatStore>,
        engine: Arc<IngestEngine>,
        collector: FeedCollector,
        sweeper: RetentionSweeper,
        collection_interval_secs: u64,
        sweep_interval_secs: u64,
        retention_days: u32,
    ) -> Self {
        Self {
            store,
            engine,
            collector,
            sweeper,
            collection_interval_secs,
            sweep_interval_secs,
            retention_days,
            collection_running: AtomicBool::new(false),
            sweep_running: AtomicBool::new(false),
        }
    }

    pub fn is_collection_running(&self) -> bool {
        self.collection_running.load(Ordering::SeqCst)
    }

    pub fn is_sweep_running(&self) -> bool {
        self.sweep_running.load(Ordering::SeqCst)
    }

    /// Recurring collection timer. Every fire goes through the same
    /// single-flight gate as a manual trigger.
    pub async fn run_collection_loop(self: Arc<Self>) {
        tracing::info!(
            interval_secs = self.collection_interval_secs,
            sources = ?self.collector.source_names(),
            "Threat collection scheduler started"
        );
        let mut tick = interval(Duration::from_secs(self.collection_interval_secs));
        loop {
            tick.tick().await;
            self.trigger_collection_now();
        }
    }

    /// Recurring sweep timer.
    pub async fn run_sweep_loop(self: Arc<Self>) {
        tracing::info!(
            interval_secs = self.sweep_interval_secs,
            retention_days = self.retention_days,
            "Retention sweep scheduler started"
        );
        let mut tick = interval(Duration::from_secs(self.sweep_interval_secs));
        loop {
            tick.tick().await;
            self.trigger_sweep_now();
        }
    }

    /// Synthetic timer fire for collection. Returns false when a cycle is
    /// already running (the fire is skipped, not queued); true when a
    /// background cycle was started.
    pub fn trigger_collection_now(self: &Arc<Self>) -> bool {
        if self
            .collection_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("Threat collection already running, skipping");
            return false;
        }
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.collect_once().await;
            // Back to Idle unconditionally, whatever happened in the cycle
            scheduler.collection_running.store(false, Ordering::SeqCst);
        });
        true
    }

    /// Synthetic timer fire for the retention sweep, same single-flight rule.
    pub fn trigger_sweep_now(self: &Arc<Self>) -> bool {
        if self
            .sweep_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("Retention sweep already running, skipping");
            return false;
        }
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.sweep_once().await;
            scheduler.sweep_running.store(false, Ordering::SeqCst);
        });
        true
    }

    /// One collection cycle: fetch all sources concurrently, normalize,
    /// upsert, and record per-source collection state. A source failure is
    /// logged and treated as zero observations; it never fails the cycle.
    async fn collect_once(&self) {
        let started = Utc::now();
        tracing::info!("Starting threat intelligence collection");

        let fetches = self.collector.collect_all().await;
        for fetch in fetches {
            match fetch.result {
                Ok(items) => {
                    let mut observations = Vec::with_capacity(items.len());
                    let mut rejected = 0usize;
                    for item in &items {
                        match normalize(item, &fetch.source) {
                            Ok(obs) => observations.push(obs),
                            Err(e) => {
                                rejected += 1;
                                tracing::warn!(
                                    source = %fetch.source,
                                    error = %e,
                                    "Skipping raw feed item"
                                );
                            }
                        }
                    }

                    let report = self.engine.upsert_batch(&observations).await;
                    tracing::info!(
                        source = %fetch.source,
                        fetched = items.len(),
                        rejected,
                        created = report.created,
                        updated = report.updated,
                        failed = report.failed,
                        "Processed feed source"
                    );

                    if let Err(e) = self
                        .store
                        .upsert_collection_state(
                            &fetch.source,
                            started,
                            observations.len() as i32,
                            None,
                        )
                        .await
                    {
                        tracing::error!(
                            source = %fetch.source,
                            error = %e,
                            "Failed to update collection state"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(
                        source = %fetch.source,
                        error = %e,
                        "Feed fetch failed, treating as zero observations"
                    );
                    if let Err(err) = self
                        .store
                        .upsert_collection_state(&fetch.source, started, 0, Some(&e.to_string()))
                        .await
                    {
                        tracing::error!(
                            source = %fetch.source,
                            error = %err,
                            "Failed to update collection state"
                        );
                    }
                }
            }
        }

        tracing::info!("Threat intelligence collection completed");
    }

    /// One retention sweep. A failed sweep applies nothing and is retried on
    /// the next tick.
    async fn sweep_once(&self) {
        match self
            .sweeper
            .sweep(chrono::Duration::days(i64::from(self.retention_days)))
            .await
        {
            Ok(0) => tracing::debug!("Retention sweep found no stale threats"),
            Ok(count) => tracing::info!(count, "Retention sweep deactivated stale threats"),
            Err(e) => {
                tracing::error!(error = %e, "Retention sweep failed, will retry on next tick")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use intelwatch_feeds::error::FetchError;
    use intelwatch_feeds::simulated::SimulatedFeed;
    use intelwatch_feeds::{FeedProvider, RawFeedItem};
    use intelwatch_storage::ThreatStore;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    struct CountingSlowFeed {
        calls: Arc<AtomicUsize>,
        delay_ms: u64,
    }

    #[async_trait]
    impl FeedProvider for CountingSlowFeed {
        fn name(&self) -> &str {
            "SlowFeed"
        }

        async fn fetch(&self) -> Result<Vec<RawFeedItem>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            Ok(SimulatedFeed::named("AbuseIPDB").fetch().await?)
        }
    }

    async fn setup(providers: Vec<Arc<dyn FeedProvider>>) -> (TempDir, Arc<CollectionScheduler>) {
        intelwatch_common::id::init(1, 1);
        let dir = TempDir::new().unwrap();
        let db_url = format!("sqlite://{}/intelwatch.db?mode=rwc", dir.path().display());
        let store = Arc::new(SqlThreatStore::connect(&db_url).await.unwrap());
        let engine = Arc::new(IngestEngine::new(store.clone()));
        let sweeper = RetentionSweeper::new(store.clone());
        let collector = FeedCollector::new(providers, 5);
        let scheduler = Arc::new(CollectionScheduler::new(
            store, engine, collector, sweeper, 900, 86400, 30,
        ));
        (dir, scheduler)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn trigger_while_running_is_a_skipped_no_op() {
        let calls = Arc::new(AtomicUsize::new(0));
        let feed = Arc::new(CountingSlowFeed {
            calls: calls.clone(),
            delay_ms: 300,
        });
        let (_dir, scheduler) = setup(vec![feed]).await;

        assert!(scheduler.trigger_collection_now());
        // Give the spawned cycle a moment to mark itself Running
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(scheduler.is_collection_running());
        assert!(!scheduler.trigger_collection_now());
        assert!(!scheduler.trigger_collection_now());

        // Wait for the single cycle to finish
        for _ in 0..100 {
            if !scheduler.is_collection_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!scheduler.is_collection_running());
        assert_eq!(calls.load(Ordering::SeqCst), 1, "only one fetch cycle ran");

        // Idle again: the next trigger starts a fresh cycle
        assert!(scheduler.trigger_collection_now());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn collection_cycle_upserts_and_records_state() {
        let providers: Vec<Arc<dyn FeedProvider>> = vec![
            Arc::new(SimulatedFeed::named("AbuseIPDB")),
            Arc::new(SimulatedFeed::named("CustomFeed")),
        ];
        let (_dir, scheduler) = setup(providers).await;

        assert!(scheduler.trigger_collection_now());
        for _ in 0..100 {
            if !scheduler.is_collection_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let state = scheduler.store.list_collection_state().await.unwrap();
        assert_eq!(state.len(), 2);
        assert!(state.iter().all(|s| s.last_error.is_none()));
        assert!(state.iter().all(|s| s.last_item_count > 0));

        // Two identical observations of the same key across cycles fold
        let obs = scheduler
            .store
            .find_active_by_key(&intelwatch_common::types::ThreatKey {
                indicator_value: "10.0.0.50".to_string(),
                indicator_type: intelwatch_common::types::IndicatorType::Ip,
                source: "AbuseIPDB".to_string(),
            })
            .await
            .unwrap()
            .expect("AbuseIPDB C2 indicator should be stored");
        assert_eq!(obs.observation_count, 1);

        assert!(scheduler.trigger_collection_now());
        for _ in 0..100 {
            if !scheduler.is_collection_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let obs = scheduler
            .store
            .find_active_by_key(&obs.key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(obs.observation_count, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_source_is_recorded_and_does_not_block_others() {
        struct BrokenFeed;

        #[async_trait]
        impl FeedProvider for BrokenFeed {
            fn name(&self) -> &str {
                "BrokenFeed"
            }

            async fn fetch(&self) -> Result<Vec<RawFeedItem>, FetchError> {
                Err(FetchError::Transport {
                    source: "BrokenFeed".to_string(),
                    message: "connection refused".to_string(),
                })
            }
        }

        let providers: Vec<Arc<dyn FeedProvider>> = vec![
            Arc::new(BrokenFeed),
            Arc::new(SimulatedFeed::named("PhishTank")),
        ];
        let (_dir, scheduler) = setup(providers).await;

        assert!(scheduler.trigger_collection_now());
        for _ in 0..100 {
            if !scheduler.is_collection_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let state = scheduler.store.list_collection_state().await.unwrap();
        assert_eq!(state.len(), 2);

        let broken = state.iter().find(|s| s.source == "BrokenFeed").unwrap();
        assert!(broken.last_error.is_some());
        assert_eq!(broken.last_item_count, 0);

        let healthy = state.iter().find(|s| s.source == "PhishTank").unwrap();
        assert!(healthy.last_error.is_none());
        assert!(healthy.last_item_count > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sweep_trigger_is_single_flight_and_idempotent() {
        let (_dir, scheduler) = setup(vec![Arc::new(SimulatedFeed::named("CustomFeed"))
            as Arc<dyn FeedProvider>])
        .await;

        assert!(scheduler.trigger_sweep_now());
        for _ in 0..100 {
            if !scheduler.is_sweep_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!scheduler.is_sweep_running());
        assert!(scheduler.trigger_sweep_now());
    }
}
