use crate::store::{SqlThreatStore, ThreatListFilter};
use crate::{StorageError, ThreatStore};
use chrono::{Duration, Utc};
use intelwatch_common::types::{
    Geolocation, IndicatorType, Severity, ThreatCategory, ThreatRecord, ThreatUpdate,
};
use std::collections::HashMap;
use tempfile::TempDir;

async fn setup() -> (TempDir, SqlThreatStore) {
    intelwatch_common::id::init(1, 1);
    let dir = TempDir::new().unwrap();
    let db_url = format!("sqlite://{}/intelwatch.db?mode=rwc", dir.path().display());
    let store = SqlThreatStore::connect(&db_url).await.unwrap();
    (dir, store)
}

fn make_record(value: &str, indicator_type: IndicatorType, source: &str) -> ThreatRecord {
    let now = Utc::now();
    ThreatRecord {
        id: intelwatch_common::id::next_id(),
        indicator_type,
        indicator_value: value.to_string(),
        category: ThreatCategory::Malware,
        severity: Severity::High,
        confidence: 80,
        source: source.to_string(),
        description: Some("Malware C&C communication".to_string()),
        geolocation: Some(Geolocation {
            country: Some("Germany".to_string()),
            country_code: Some("DE".to_string()),
            city: Some("Berlin".to_string()),
            latitude: Some(52.52),
            longitude: Some(13.405),
        }),
        tags: vec!["c2".to_string()],
        metadata: HashMap::new(),
        first_seen: now,
        last_seen: now,
        observation_count: 1,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn insert_and_find_active_by_key() {
    let (_dir, store) = setup().await;

    let record = make_record("203.0.113.5", IndicatorType::Ip, "TestFeed");
    let inserted = store.insert_threat(&record).await.unwrap();
    assert_eq!(inserted.indicator_value, "203.0.113.5");
    assert_eq!(inserted.observation_count, 1);

    let found = store.find_active_by_key(&record.key()).await.unwrap();
    let found = found.expect("active record should be found by key");
    assert_eq!(found.id, inserted.id);
    assert_eq!(found.tags, vec!["c2".to_string()]);
    assert_eq!(
        found.geolocation.as_ref().and_then(|g| g.country.clone()),
        Some("Germany".to_string())
    );
}

#[tokio::test]
async fn second_active_insert_for_same_key_conflicts() {
    let (_dir, store) = setup().await;

    let record = make_record("203.0.113.5", IndicatorType::Ip, "TestFeed");
    store.insert_threat(&record).await.unwrap();

    let dup = make_record("203.0.113.5", IndicatorType::Ip, "TestFeed");
    let err = store.insert_threat(&dup).await.unwrap_err();
    assert!(matches!(err, StorageError::Conflict { .. }));
}

#[tokio::test]
async fn same_value_different_source_is_a_different_key() {
    let (_dir, store) = setup().await;

    store
        .insert_threat(&make_record("203.0.113.5", IndicatorType::Ip, "FeedA"))
        .await
        .unwrap();
    store
        .insert_threat(&make_record("203.0.113.5", IndicatorType::Ip, "FeedB"))
        .await
        .unwrap();

    let filter = ThreatListFilter::default();
    assert_eq!(store.count_threats(&filter).await.unwrap(), 2);
}

#[tokio::test]
async fn update_threat_applies_merged_fields_only() {
    let (_dir, store) = setup().await;

    let record = make_record("203.0.113.5", IndicatorType::Ip, "TestFeed");
    let inserted = store.insert_threat(&record).await.unwrap();

    let later = Utc::now() + Duration::seconds(5);
    let update = ThreatUpdate {
        category: ThreatCategory::Botnet,
        severity: Severity::Critical,
        confidence: 95,
        description: Some("Botnet command and control".to_string()),
        geolocation: inserted.geolocation.clone(),
        tags: vec!["c2".to_string(), "botnet".to_string()],
        metadata: HashMap::new(),
        last_seen: later,
        observation_count: 2,
    };
    let updated = store.update_threat(&inserted.id, &update).await.unwrap();

    assert_eq!(updated.severity, Severity::Critical);
    assert_eq!(updated.confidence, 95);
    assert_eq!(updated.observation_count, 2);
    assert!(updated.last_seen > updated.first_seen);
    // first_seen and identity fields are untouched by updates
    assert_eq!(updated.first_seen, inserted.first_seen);
    assert_eq!(updated.indicator_value, inserted.indicator_value);
    assert!(updated.is_active);
}

#[tokio::test]
async fn update_missing_threat_returns_not_found() {
    let (_dir, store) = setup().await;

    let update = ThreatUpdate {
        category: ThreatCategory::Other,
        severity: Severity::Low,
        confidence: 10,
        description: None,
        geolocation: None,
        tags: vec![],
        metadata: HashMap::new(),
        last_seen: Utc::now(),
        observation_count: 1,
    };
    let err = store.update_threat("missing-id", &update).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
}

#[tokio::test]
async fn deactivated_key_allows_a_new_active_record() {
    let (_dir, store) = setup().await;

    let record = make_record("203.0.113.5", IndicatorType::Ip, "TestFeed");
    let first = store.insert_threat(&record).await.unwrap();

    let deactivated = store.bulk_deactivate(&[first.id.clone()]).await.unwrap();
    assert_eq!(deactivated, 1);

    assert!(store
        .find_active_by_key(&record.key())
        .await
        .unwrap()
        .is_none());

    // The partial unique index only covers active rows, so a new record for
    // the same key can be created while the old one stays frozen.
    let second = store
        .insert_threat(&make_record("203.0.113.5", IndicatorType::Ip, "TestFeed"))
        .await
        .unwrap();
    assert_ne!(second.id, first.id);

    let old = store.get_threat_by_id(&first.id).await.unwrap().unwrap();
    assert!(!old.is_active);
    assert_eq!(old.observation_count, 1);
}

#[tokio::test]
async fn find_stale_active_respects_cutoff_and_active_flag() {
    let (_dir, store) = setup().await;

    let mut stale = make_record("198.51.100.42", IndicatorType::Ip, "CustomFeed");
    stale.first_seen = Utc::now() - Duration::days(60);
    stale.last_seen = Utc::now() - Duration::days(45);
    let stale = store.insert_threat(&stale).await.unwrap();

    let fresh = make_record("203.0.113.5", IndicatorType::Ip, "TestFeed");
    store.insert_threat(&fresh).await.unwrap();

    let cutoff = Utc::now() - Duration::days(30);
    let ids = store.find_stale_active(cutoff).await.unwrap();
    assert_eq!(ids, vec![stale.id.clone()]);

    assert_eq!(store.bulk_deactivate(&ids).await.unwrap(), 1);

    // Second pass finds nothing: the stale record is no longer active.
    assert!(store.find_stale_active(cutoff).await.unwrap().is_empty());
}

#[tokio::test]
async fn bulk_deactivate_empty_is_a_noop() {
    let (_dir, store) = setup().await;
    assert_eq!(store.bulk_deactivate(&[]).await.unwrap(), 0);
}

#[tokio::test]
async fn list_threats_filters_and_paginates() {
    let (_dir, store) = setup().await;

    for i in 0..5 {
        let mut r = make_record(&format!("203.0.113.{i}"), IndicatorType::Ip, "FeedA");
        r.severity = if i % 2 == 0 {
            Severity::High
        } else {
            Severity::Low
        };
        store.insert_threat(&r).await.unwrap();
    }
    store
        .insert_threat(&make_record("evil.example.com", IndicatorType::Domain, "FeedB"))
        .await
        .unwrap();

    let all = ThreatListFilter::default();
    assert_eq!(store.count_threats(&all).await.unwrap(), 6);

    let high_only = ThreatListFilter {
        severity_eq: Some(Severity::High),
        ..Default::default()
    };
    assert_eq!(store.count_threats(&high_only).await.unwrap(), 3);

    let domains = ThreatListFilter {
        indicator_type_eq: Some(IndicatorType::Domain),
        ..Default::default()
    };
    let rows = store.list_threats(&domains, 20, 0).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].indicator_value, "evil.example.com");

    let page1 = store.list_threats(&all, 4, 0).await.unwrap();
    let page2 = store.list_threats(&all, 4, 4).await.unwrap();
    assert_eq!(page1.len(), 4);
    assert_eq!(page2.len(), 2);
}

#[tokio::test]
async fn search_matches_value_description_and_tags() {
    let (_dir, store) = setup().await;

    let mut r = make_record("evil.example.com", IndicatorType::Domain, "FeedB");
    r.description = Some("Phishing website hosting".to_string());
    r.tags = vec!["phish-kit".to_string()];
    store.insert_threat(&r).await.unwrap();

    let by_value = store.search_threats("example.com", None, 50).await.unwrap();
    assert_eq!(by_value.len(), 1);

    let by_description = store.search_threats("Phishing", None, 50).await.unwrap();
    assert_eq!(by_description.len(), 1);

    let by_tag = store.search_threats("phish-kit", None, 50).await.unwrap();
    assert_eq!(by_tag.len(), 1);

    let wrong_type = store
        .search_threats("example.com", Some(IndicatorType::Ip), 50)
        .await
        .unwrap();
    assert!(wrong_type.is_empty());
}

#[tokio::test]
async fn delete_and_bulk_delete() {
    let (_dir, store) = setup().await;

    let a = store
        .insert_threat(&make_record("203.0.113.1", IndicatorType::Ip, "FeedA"))
        .await
        .unwrap();
    let b = store
        .insert_threat(&make_record("203.0.113.2", IndicatorType::Ip, "FeedA"))
        .await
        .unwrap();

    assert!(store.delete_threat(&a.id).await.unwrap());
    assert!(!store.delete_threat(&a.id).await.unwrap());

    let deleted = store.bulk_delete_threats(&[b.id]).await.unwrap();
    assert_eq!(deleted, 1);
}

#[tokio::test]
async fn user_lifecycle() {
    let (_dir, store) = setup().await;

    let hash = crate::auth::hash_password("changeme").unwrap();
    let user = store
        .create_user("admin", "admin@example.com", &hash, "admin")
        .await
        .unwrap();
    assert_eq!(store.count_users().await.unwrap(), 1);
    assert!(user.last_login_at.is_none());

    let dup = store
        .create_user("admin", "other@example.com", &hash, "viewer")
        .await;
    assert!(matches!(dup, Err(StorageError::Conflict { .. })));

    let fetched = store.get_user_by_username("admin").await.unwrap().unwrap();
    assert!(crate::auth::verify_password("changeme", &fetched.password_hash));

    store.touch_last_login(&user.id).await.unwrap();
    let fetched = store.get_user_by_id(&user.id).await.unwrap().unwrap();
    assert!(fetched.last_login_at.is_some());
}

#[tokio::test]
async fn collection_state_upserts_in_place() {
    let (_dir, store) = setup().await;

    let now = Utc::now();
    store
        .upsert_collection_state("AbuseIPDB", now, 2, None)
        .await
        .unwrap();
    store
        .upsert_collection_state("AbuseIPDB", now, 5, Some("timeout"))
        .await
        .unwrap();

    let rows = store.list_collection_state().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].last_item_count, 5);
    assert_eq!(rows[0].last_error.as_deref(), Some("timeout"));

    let row = store.get_collection_state("AbuseIPDB").await.unwrap();
    assert!(row.is_some());
}

#[tokio::test]
async fn analytics_summaries_count_rows() {
    let (_dir, store) = setup().await;

    store
        .insert_threat(&make_record("203.0.113.5", IndicatorType::Ip, "FeedA"))
        .await
        .unwrap();
    let mut low = make_record("evil.example.com", IndicatorType::Domain, "FeedB");
    low.severity = Severity::Low;
    low.category = ThreatCategory::Phishing;
    store.insert_threat(&low).await.unwrap();

    let stats = store.threat_stats().await.unwrap();
    assert_eq!(stats.total_threats, 2);
    assert_eq!(stats.recent_threats, 2);
    assert_eq!(stats.severity_counts.get("high"), Some(&1));
    assert_eq!(stats.category_counts.get("phishing"), Some(&1));

    let dashboard = store.dashboard_summary().await.unwrap();
    assert_eq!(dashboard.total_threats, 2);
    assert_eq!(dashboard.threats_last_7_days, 2);
    assert_eq!(dashboard.top_countries.len(), 1);
    assert_eq!(dashboard.top_countries[0].country, "Germany");

    let series = store.threat_timeseries(7).await.unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].count, 2);

    let geo = store.geographic_distribution().await.unwrap();
    assert!(!geo.is_empty());
    assert_eq!(geo[0].country, "Germany");
}
