use crate::config::ServerConfig;
use crate::intel::scheduler::CollectionScheduler;
use chrono::{DateTime, Utc};
use intelwatch_ingest::IngestEngine;
use intelwatch_storage::SqlThreatStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqlThreatStore>,
    pub engine: Arc<IngestEngine>,
    pub scheduler: Arc<CollectionScheduler>,
    pub jwt_secret: Arc<String>,
    pub token_expire_secs: u64,
    pub start_time: DateTime<Utc>,
    pub config: Arc<ServerConfig>,
}
