//! Ingestion core: the deduplicating upsert engine and the retention sweeper.
//!
//! Both are written against the [`intelwatch_storage::ThreatStore`] trait, so
//! they are independent of the storage engine and of how observations reach
//! them (scheduled feed collection or the REST API).

pub mod engine;
pub mod sweeper;

#[cfg(test)]
mod tests;

pub use engine::{BatchReport, IngestEngine, UpsertOutcome};
pub use sweeper::RetentionSweeper;
