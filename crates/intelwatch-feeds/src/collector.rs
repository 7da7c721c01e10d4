//! Concurrent fetch across all configured feed providers.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::error::FetchError;
use crate::{FeedProvider, RawFeedItem};

/// Outcome of fetching one source during a collection cycle.
pub struct SourceFetch {
    pub source: String,
    pub result: Result<Vec<RawFeedItem>, FetchError>,
}

/// Fires all provider fetches concurrently and awaits them all. Individual
/// failures (including timeouts) surface per source; one bad feed never
/// aborts the cycle.
pub struct FeedCollector {
    providers: Vec<Arc<dyn FeedProvider>>,
    fetch_timeout_secs: u64,
}

impl FeedCollector {
    pub fn new(providers: Vec<Arc<dyn FeedProvider>>, fetch_timeout_secs: u64) -> Self {
        Self {
            providers,
            fetch_timeout_secs,
        }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    pub async fn collect_all(&self) -> Vec<SourceFetch> {
        let mut tasks = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let provider = Arc::clone(provider);
            let timeout_secs = self.fetch_timeout_secs;
            tasks.push(tokio::spawn(async move {
                let source = provider.name().to_string();
                let result = match timeout(Duration::from_secs(timeout_secs), provider.fetch())
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout {
                        source: source.clone(),
                        timeout_secs,
                    }),
                };
                SourceFetch { source, result }
            }));
        }

        let mut fetches = Vec::with_capacity(tasks.len());
        for task in tasks {
            match task.await {
                Ok(fetch) => fetches.push(fetch),
                Err(e) => {
                    tracing::error!(error = %e, "Feed fetch task panicked");
                }
            }
        }
        fetches
    }
}
