use crate::engine::{IngestEngine, UpsertOutcome};
use crate::sweeper::RetentionSweeper;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use intelwatch_common::types::{
    Geolocation, IndicatorType, Severity, ThreatCategory, ThreatKey, ThreatObservation,
    ThreatRecord, ThreatUpdate,
};
use intelwatch_storage::{Result as StorageResult, StorageError, ThreatStore};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// In-memory store used to exercise engine and sweeper semantics without a
/// database. `yield_now` calls widen the window between lookup and write so
/// the engine's per-key locking is actually load-bearing in the concurrency
/// test.
#[derive(Default)]
struct MemoryThreatStore {
    rows: Mutex<Vec<ThreatRecord>>,
    fail_values: HashSet<String>,
}

impl MemoryThreatStore {
    fn failing_on(values: &[&str]) -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            fail_values: values.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn snapshot(&self) -> Vec<ThreatRecord> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl ThreatStore for MemoryThreatStore {
    async fn find_active_by_key(&self, key: &ThreatKey) -> StorageResult<Option<ThreatRecord>> {
        tokio::task::yield_now().await;
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .find(|r| r.is_active && r.key() == *key)
            .cloned())
    }

    async fn insert_threat(&self, record: &ThreatRecord) -> StorageResult<ThreatRecord> {
        tokio::task::yield_now().await;
        if self.fail_values.contains(&record.indicator_value) {
            return Err(StorageError::Conflict {
                entity: "threat",
                detail: "injected failure".to_string(),
            });
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|r| r.is_active && r.key() == record.key()) {
            return Err(StorageError::Conflict {
                entity: "threat",
                detail: "active record already exists".to_string(),
            });
        }
        rows.push(record.clone());
        Ok(record.clone())
    }

    async fn update_threat(&self, id: &str, update: &ThreatUpdate) -> StorageResult<ThreatRecord> {
        tokio::task::yield_now().await;
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StorageError::NotFound {
                entity: "threat",
                id: id.to_string(),
            })?;
        row.category = update.category;
        row.severity = update.severity;
        row.confidence = update.confidence;
        row.description = update.description.clone();
        row.geolocation = update.geolocation.clone();
        row.tags = update.tags.clone();
        row.metadata = update.metadata.clone();
        row.last_seen = update.last_seen;
        row.observation_count = update.observation_count;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn find_stale_active(&self, cutoff: DateTime<Utc>) -> StorageResult<Vec<String>> {
        tokio::task::yield_now().await;
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|r| r.is_active && r.last_seen < cutoff)
            .map(|r| r.id.clone())
            .collect())
    }

    async fn bulk_deactivate(&self, ids: &[String]) -> StorageResult<u64> {
        tokio::task::yield_now().await;
        let mut rows = self.rows.lock().unwrap();
        let mut count = 0;
        for row in rows.iter_mut() {
            if row.is_active && ids.contains(&row.id) {
                row.is_active = false;
                row.updated_at = Utc::now();
                count += 1;
            }
        }
        Ok(count)
    }
}

fn observation(value: &str, source: &str) -> ThreatObservation {
    ThreatObservation {
        indicator_type: IndicatorType::Ip,
        indicator_value: value.to_string(),
        category: ThreatCategory::Malware,
        severity: Severity::High,
        confidence: 80,
        source: source.to_string(),
        description: None,
        geolocation: None,
        tags: vec![],
        metadata: HashMap::new(),
    }
}

fn engine_with_store() -> (Arc<MemoryThreatStore>, IngestEngine) {
    let store = Arc::new(MemoryThreatStore::default());
    let engine = IngestEngine::new(store.clone());
    (store, engine)
}

#[tokio::test]
async fn first_observation_creates_a_record() {
    let (store, engine) = engine_with_store();

    let outcome = engine
        .upsert(&observation("203.0.113.5", "TestFeed"))
        .await
        .unwrap();
    assert!(outcome.is_created());

    let rows = store.snapshot();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].observation_count, 1);
    assert_eq!(rows[0].first_seen, rows[0].last_seen);
    assert!(rows[0].is_active);
}

#[tokio::test]
async fn repeat_observation_folds_into_the_same_record() {
    let (store, engine) = engine_with_store();

    let mut first = observation("203.0.113.5", "TestFeed");
    first.confidence = 80;
    engine.upsert(&first).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let mut second = observation("203.0.113.5", "TestFeed");
    second.confidence = 60;
    second.severity = Severity::Low;
    let outcome = engine.upsert(&second).await.unwrap();

    let updated = match outcome {
        UpsertOutcome::Updated(r) => r,
        UpsertOutcome::Created(_) => panic!("second observation must not create"),
    };
    assert_eq!(updated.observation_count, 2);
    assert!(updated.last_seen > updated.first_seen);
    // confidence is the running max, severity follows the latest observation
    assert_eq!(updated.confidence, 80);
    assert_eq!(updated.severity, Severity::Low);

    assert_eq!(store.snapshot().len(), 1);
}

#[tokio::test]
async fn merge_keeps_existing_optional_fields_unless_replaced() {
    let (_store, engine) = engine_with_store();

    let mut first = observation("203.0.113.5", "TestFeed");
    first.description = Some("Malware C&C communication".to_string());
    first.geolocation = Some(Geolocation {
        country: Some("Russia".to_string()),
        country_code: Some("RU".to_string()),
        city: Some("Moscow".to_string()),
        latitude: Some(55.7558),
        longitude: Some(37.6173),
    });
    first.tags = vec!["c2".to_string()];
    engine.upsert(&first).await.unwrap();

    // Second observation carries none of the optional payload
    let second = observation("203.0.113.5", "TestFeed");
    let updated = engine.upsert(&second).await.unwrap().record().clone();
    assert_eq!(
        updated.description.as_deref(),
        Some("Malware C&C communication")
    );
    assert!(updated.geolocation.is_some());
    assert_eq!(updated.tags, vec!["c2".to_string()]);

    // Third observation replaces what it carries
    let mut third = observation("203.0.113.5", "TestFeed");
    third.description = Some("Now serving exploit kits".to_string());
    third.tags = vec!["exploit-kit".to_string()];
    let updated = engine.upsert(&third).await.unwrap().record().clone();
    assert_eq!(updated.description.as_deref(), Some("Now serving exploit kits"));
    assert_eq!(updated.tags, vec!["exploit-kit".to_string()]);
    assert!(updated.geolocation.is_some());
}

#[tokio::test]
async fn same_value_from_another_source_creates_a_second_record() {
    let (store, engine) = engine_with_store();

    engine
        .upsert(&observation("203.0.113.5", "FeedA"))
        .await
        .unwrap();
    let outcome = engine
        .upsert(&observation("203.0.113.5", "FeedB"))
        .await
        .unwrap();
    assert!(outcome.is_created());
    assert_eq!(store.snapshot().len(), 2);
}

#[tokio::test]
async fn batch_reports_per_item_outcomes_without_aborting() {
    let store = Arc::new(MemoryThreatStore::failing_on(&["203.0.113.66"]));
    let engine = IngestEngine::new(store.clone());

    let batch = vec![
        observation("203.0.113.5", "TestFeed"),
        observation("203.0.113.66", "TestFeed"), // injected store failure
        observation("203.0.113.5", "TestFeed"),  // same key as the first
        observation("198.51.100.42", "TestFeed"),
    ];
    let report = engine.upsert_batch(&batch).await;

    assert_eq!(report.created, 2);
    assert_eq!(report.updated, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.succeeded(), 3);
    assert_eq!(report.total(), 4);

    let rows = store.snapshot();
    assert_eq!(rows.len(), 2);
    let folded = rows
        .iter()
        .find(|r| r.indicator_value == "203.0.113.5")
        .unwrap();
    assert_eq!(folded.observation_count, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_upserts_for_a_new_key_create_exactly_one_record() {
    let (store, engine) = engine_with_store();
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .upsert(&observation("203.0.113.5", "TestFeed"))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let rows = store.snapshot();
    assert_eq!(rows.len(), 1, "no duplicate rows under concurrency");
    assert_eq!(rows[0].observation_count, 8);
}

#[tokio::test]
async fn sweep_deactivates_stale_records_and_is_idempotent() {
    let (store, engine) = engine_with_store();
    let sweeper = RetentionSweeper::new(store.clone());

    engine
        .upsert(&observation("198.51.100.42", "CustomFeed"))
        .await
        .unwrap();
    // Age the record past the retention window
    {
        let mut rows = store.rows.lock().unwrap();
        rows[0].first_seen = Utc::now() - Duration::days(60);
        rows[0].last_seen = Utc::now() - Duration::days(45);
    }
    engine
        .upsert(&observation("203.0.113.5", "TestFeed"))
        .await
        .unwrap();

    let swept = sweeper.sweep(Duration::days(30)).await.unwrap();
    assert_eq!(swept, 1);

    // Second sweep with no new observations finds nothing
    let swept_again = sweeper.sweep(Duration::days(30)).await.unwrap();
    assert_eq!(swept_again, 0);

    let rows = store.snapshot();
    let stale = rows
        .iter()
        .find(|r| r.indicator_value == "198.51.100.42")
        .unwrap();
    assert!(!stale.is_active);
    // Historical fields survive the sweep untouched
    assert_eq!(stale.observation_count, 1);
    assert!(stale.first_seen < Utc::now() - Duration::days(59));

    let fresh = rows
        .iter()
        .find(|r| r.indicator_value == "203.0.113.5")
        .unwrap();
    assert!(fresh.is_active);
}

#[tokio::test]
async fn reobserving_a_deactivated_key_creates_a_new_record() {
    let (store, engine) = engine_with_store();
    let sweeper = RetentionSweeper::new(store.clone());

    // Two identical observations fold into one record with count 2
    engine
        .upsert(&observation("203.0.113.5", "TestFeed"))
        .await
        .unwrap();
    let updated = engine
        .upsert(&observation("203.0.113.5", "TestFeed"))
        .await
        .unwrap();
    assert_eq!(updated.record().observation_count, 2);
    let original_id = updated.record().id.clone();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    // A zero-length retention window deactivates it
    let swept = sweeper.sweep(Duration::zero()).await.unwrap();
    assert_eq!(swept, 1);

    // The next identical observation starts a fresh record
    let outcome = engine
        .upsert(&observation("203.0.113.5", "TestFeed"))
        .await
        .unwrap();
    assert!(outcome.is_created());
    assert_eq!(outcome.record().observation_count, 1);
    assert_ne!(outcome.record().id, original_id);

    // The old row is frozen: still inactive, count unchanged
    let rows = store.snapshot();
    assert_eq!(rows.len(), 2);
    let old = rows.iter().find(|r| r.id == original_id).unwrap();
    assert!(!old.is_active);
    assert_eq!(old.observation_count, 2);
}
