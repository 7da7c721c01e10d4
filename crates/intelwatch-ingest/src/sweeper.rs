//! Retention sweeper: deactivates threat records that have not been observed
//! within the retention window.

use chrono::{Duration, Utc};
use intelwatch_storage::{StorageError, ThreatStore};
use std::sync::Arc;

pub struct RetentionSweeper {
    store: Arc<dyn ThreatStore>,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn ThreatStore>) -> Self {
        Self { store }
    }

    /// Deactivates every active record whose `last_seen` is older than
    /// `retention` and returns the number of records deactivated.
    ///
    /// The deactivation is one bulk statement, so a failed sweep applies
    /// nothing and is simply retried on the next scheduled tick. Running the
    /// sweep twice with no intervening observations deactivates zero records
    /// the second time. Historical fields (`first_seen`,
    /// `observation_count`) are never touched.
    pub async fn sweep(&self, retention: Duration) -> Result<u64, StorageError> {
        let cutoff = Utc::now() - retention;
        let ids = self.store.find_stale_active(cutoff).await?;
        if ids.is_empty() {
            return Ok(0);
        }
        let count = self.store.bulk_deactivate(&ids).await?;
        tracing::info!(count, "Deactivated stale threat records");
        Ok(count)
    }
}
