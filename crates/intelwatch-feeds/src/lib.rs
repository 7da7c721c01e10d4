//! Threat feed providers and the indicator normalizer.
//!
//! A feed is anything that can produce a batch of [`RawFeedItem`]s behind the
//! [`FeedProvider`] trait. The bundled providers are simulated (canned data);
//! a real HTTP or file-based feed plugs in at the same seam without touching
//! the normalizer or the upsert engine downstream.

pub mod collector;
pub mod error;
pub mod normalizer;
pub mod simulated;

use intelwatch_common::types::Geolocation;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use error::FetchError;

/// Raw threat item as reported by a feed, before validation. All fields are
/// optional because feeds disagree about what they populate; the normalizer
/// decides what is acceptable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFeedItem {
    #[serde(default, rename = "type")]
    pub indicator_type: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub geolocation: Option<Geolocation>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Feed source entry from the server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSourceConfig {
    /// Source name, also the `source` component of the dedup key.
    pub name: String,
    /// Provider kind; currently only "simulated" is registered.
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_kind() -> String {
    "simulated".to_string()
}

fn default_enabled() -> bool {
    true
}

/// Capability trait for fetching raw items from one threat feed.
#[async_trait::async_trait]
pub trait FeedProvider: Send + Sync {
    /// Source name reported on every item fetched from this provider.
    fn name(&self) -> &str;

    /// Fetch the current batch of raw items.
    async fn fetch(&self) -> Result<Vec<RawFeedItem>, FetchError>;
}

/// Instantiate a provider from its configuration entry.
pub fn build_provider(config: &FeedSourceConfig) -> Result<Box<dyn FeedProvider>, FetchError> {
    match config.kind.as_str() {
        "simulated" => Ok(Box::new(simulated::SimulatedFeed::named(&config.name))),
        other => Err(FetchError::UnsupportedKind(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_provider_rejects_unknown_kind() {
        let config = FeedSourceConfig {
            name: "AbuseIPDB".to_string(),
            kind: "grpc".to_string(),
            enabled: true,
        };
        let err = build_provider(&config).err().unwrap();
        assert!(matches!(err, FetchError::UnsupportedKind(_)));
    }

    #[test]
    fn build_provider_accepts_simulated() {
        let config = FeedSourceConfig {
            name: "AbuseIPDB".to_string(),
            kind: default_kind(),
            enabled: true,
        };
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "AbuseIPDB");
    }
}
