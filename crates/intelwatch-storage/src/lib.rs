//! Relational storage layer for threat records, user accounts, and per-source
//! collection state.
//!
//! The default implementation ([`store::SqlThreatStore`]) uses SeaORM over
//! SQLite with WAL mode; the schema is applied by the `migration` crate at
//! connect time. The ingestion core only depends on the [`ThreatStore`]
//! trait, so another storage engine can be substituted without touching the
//! normalizer or upsert engine.

pub mod auth;
pub mod entities;
pub mod error;
pub mod store;

#[cfg(test)]
mod tests;

pub use error::{Result, StorageError};
pub use store::{
    CollectionStateRow, CountryCount, DashboardSummary, GeoPoint, SqlThreatStore,
    ThreatListFilter, ThreatStatsSummary, TimeseriesPoint,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intelwatch_common::types::{ThreatKey, ThreatRecord, ThreatUpdate};

/// Persistence contract the ingestion core is written against.
///
/// Implementations must be safe to share across tasks (`Send + Sync`)
/// because the store is accessed from the REST API and the collection
/// scheduler concurrently. At most one *active* record may exist per
/// [`ThreatKey`]; [`SqlThreatStore`] enforces this with a partial unique
/// index restricted to `is_active = 1` rows.
#[async_trait]
pub trait ThreatStore: Send + Sync {
    /// Looks up the active record matching the dedup key, if any.
    /// Inactive (historical) records never match.
    async fn find_active_by_key(&self, key: &ThreatKey) -> Result<Option<ThreatRecord>>;

    /// Inserts a new threat record. Fails with [`StorageError::Conflict`]
    /// when an active record for the same key already exists.
    async fn insert_threat(&self, record: &ThreatRecord) -> Result<ThreatRecord>;

    /// Applies merged field values to an existing record. `first_seen`,
    /// `is_active`, and the dedup key are never modified by an update.
    async fn update_threat(&self, id: &str, update: &ThreatUpdate) -> Result<ThreatRecord>;

    /// Returns ids of active records with `last_seen` strictly before
    /// `cutoff`.
    async fn find_stale_active(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>>;

    /// Deactivates the given records in a single statement and returns the
    /// number of rows affected.
    async fn bulk_deactivate(&self, ids: &[String]) -> Result<u64>;
}
