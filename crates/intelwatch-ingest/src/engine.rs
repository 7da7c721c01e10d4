//! Deduplicating upsert engine.
//!
//! One observation either creates a new active threat record or folds into
//! the existing active record for its dedup key (indicator value, indicator
//! type, source). Lookup-then-write is made atomic per key with an in-process
//! async lock table; the storage layer's partial unique index on active keys
//! backs this up at the database level.

use chrono::{DateTime, Utc};
use intelwatch_common::types::{ThreatKey, ThreatObservation, ThreatRecord, ThreatUpdate};
use intelwatch_storage::{StorageError, ThreatStore};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

/// Outcome of a single upsert.
#[derive(Debug, Clone)]
pub enum UpsertOutcome {
    Created(ThreatRecord),
    Updated(ThreatRecord),
}

impl UpsertOutcome {
    pub fn record(&self) -> &ThreatRecord {
        match self {
            UpsertOutcome::Created(r) | UpsertOutcome::Updated(r) => r,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, UpsertOutcome::Created(_))
    }
}

/// Aggregate outcome of a batch upsert. Items are independent: a failure is
/// counted, logged, and never aborts the remaining items.
#[derive(Debug, Clone, Copy, Default, Serialize, utoipa::ToSchema)]
pub struct BatchReport {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.created + self.updated
    }

    pub fn total(&self) -> usize {
        self.succeeded() + self.failed
    }
}

/// Entries for keys nobody currently holds are pruned once the table grows
/// past this size.
const LOCK_TABLE_PRUNE_THRESHOLD: usize = 1024;

pub struct IngestEngine {
    store: Arc<dyn ThreatStore>,
    key_locks: Mutex<HashMap<ThreatKey, Arc<AsyncMutex<()>>>>,
}

impl IngestEngine {
    pub fn new(store: Arc<dyn ThreatStore>) -> Self {
        Self {
            store,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    fn key_lock(&self, key: &ThreatKey) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .key_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks.len() > LOCK_TABLE_PRUNE_THRESHOLD {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Create or fold one observation. Holds the key's lock only for this
    /// single item: acquire, act, release.
    pub async fn upsert(
        &self,
        observation: &ThreatObservation,
    ) -> Result<UpsertOutcome, StorageError> {
        let key = observation.key();
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        let now = Utc::now();
        match self.store.find_active_by_key(&key).await? {
            Some(existing) => {
                let update = merge(&existing, observation, now);
                let updated = self.store.update_threat(&existing.id, &update).await?;
                Ok(UpsertOutcome::Updated(updated))
            }
            None => {
                let record = new_record(observation, now);
                let created = self.store.insert_threat(&record).await?;
                Ok(UpsertOutcome::Created(created))
            }
        }
    }

    /// Upsert a batch in submission order, collecting per-item outcomes.
    pub async fn upsert_batch(&self, observations: &[ThreatObservation]) -> BatchReport {
        let mut report = BatchReport::default();
        for observation in observations {
            match self.upsert(observation).await {
                Ok(UpsertOutcome::Created(_)) => report.created += 1,
                Ok(UpsertOutcome::Updated(_)) => report.updated += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        value = %observation.indicator_value,
                        source = %observation.source,
                        error = %e,
                        "Failed to upsert observation"
                    );
                }
            }
        }
        report
    }
}

/// Merge rules for folding an observation into an existing active record:
/// confidence is the running maximum, severity and category follow the most
/// recent observation, and optional payload fields are replaced only when the
/// new observation actually carries them.
fn merge(
    existing: &ThreatRecord,
    observation: &ThreatObservation,
    now: DateTime<Utc>,
) -> ThreatUpdate {
    ThreatUpdate {
        category: observation.category,
        severity: observation.severity,
        confidence: existing.confidence.max(observation.confidence),
        description: observation
            .description
            .clone()
            .or_else(|| existing.description.clone()),
        geolocation: observation
            .geolocation
            .clone()
            .or_else(|| existing.geolocation.clone()),
        tags: if observation.tags.is_empty() {
            existing.tags.clone()
        } else {
            observation.tags.clone()
        },
        metadata: if observation.metadata.is_empty() {
            existing.metadata.clone()
        } else {
            observation.metadata.clone()
        },
        last_seen: now,
        observation_count: existing.observation_count + 1,
    }
}

fn new_record(observation: &ThreatObservation, now: DateTime<Utc>) -> ThreatRecord {
    ThreatRecord {
        id: intelwatch_common::id::next_id(),
        indicator_type: observation.indicator_type,
        indicator_value: observation.indicator_value.clone(),
        category: observation.category,
        severity: observation.severity,
        confidence: observation.confidence,
        source: observation.source.clone(),
        description: observation.description.clone(),
        geolocation: observation.geolocation.clone(),
        tags: observation.tags.clone(),
        metadata: observation.metadata.clone(),
        first_seen: now,
        last_seen: now,
        observation_count: 1,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}
