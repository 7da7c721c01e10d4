//! Simulated feed providers with canned indicator data.
//!
//! These stand in for real feed integrations; they exercise the full
//! normalize/upsert path with stable, recognizable payloads.

use intelwatch_common::types::Geolocation;

use crate::error::FetchError;
use crate::{FeedProvider, RawFeedItem};

/// A feed provider that returns a fixed batch of items on every fetch.
pub struct SimulatedFeed {
    name: String,
    items: Vec<RawFeedItem>,
}

impl SimulatedFeed {
    /// Canned data for the well-known source names; any other name yields an
    /// empty feed.
    pub fn named(name: &str) -> Self {
        let items = match name {
            "AbuseIPDB" => abuse_ipdb_items(),
            "MalwareBazaar" => malware_bazaar_items(),
            "PhishTank" => phish_tank_items(),
            "CustomFeed" => custom_feed_items(),
            _ => Vec::new(),
        };
        Self {
            name: name.to_string(),
            items,
        }
    }

    pub fn with_items(name: &str, items: Vec<RawFeedItem>) -> Self {
        Self {
            name: name.to_string(),
            items,
        }
    }
}

#[async_trait::async_trait]
impl FeedProvider for SimulatedFeed {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<RawFeedItem>, FetchError> {
        Ok(self.items.clone())
    }
}

fn item(
    indicator_type: &str,
    value: &str,
    category: &str,
    severity: &str,
    confidence: f64,
    description: &str,
) -> RawFeedItem {
    RawFeedItem {
        indicator_type: Some(indicator_type.to_string()),
        value: Some(value.to_string()),
        category: Some(category.to_string()),
        severity: Some(severity.to_string()),
        confidence: Some(confidence),
        description: Some(description.to_string()),
        ..Default::default()
    }
}

fn geo(country: &str, code: &str, city: &str, lat: f64, lon: f64) -> Option<Geolocation> {
    Some(Geolocation {
        country: Some(country.to_string()),
        country_code: Some(code.to_string()),
        city: Some(city.to_string()),
        latitude: Some(lat),
        longitude: Some(lon),
    })
}

fn abuse_ipdb_items() -> Vec<RawFeedItem> {
    let mut scanning = item(
        "ip",
        "192.168.1.100",
        "scanning",
        "medium",
        85.0,
        "Port scanning activity detected",
    );
    scanning.geolocation = geo("United States", "US", "San Francisco", 37.7749, -122.4194);

    let mut c2 = item(
        "ip",
        "10.0.0.50",
        "malware",
        "high",
        95.0,
        "Malware C&C communication",
    );
    c2.geolocation = geo("Russia", "RU", "Moscow", 55.7558, 37.6173);
    c2.tags = vec!["c2".to_string()];

    vec![scanning, c2]
}

fn malware_bazaar_items() -> Vec<RawFeedItem> {
    let mut host = item(
        "ip",
        "172.16.0.25",
        "malware",
        "critical",
        98.0,
        "Active malware distribution",
    );
    host.geolocation = geo("China", "CN", "Beijing", 39.9042, 116.4074);

    let mut sample = item(
        "hash",
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        "malware",
        "critical",
        97.0,
        "Malware sample SHA-256",
    );
    sample.tags = vec!["sample".to_string()];

    vec![host, sample]
}

fn phish_tank_items() -> Vec<RawFeedItem> {
    let mut hosting = item(
        "ip",
        "203.0.113.15",
        "phishing",
        "high",
        90.0,
        "Phishing website hosting",
    );
    hosting.geolocation = geo("Germany", "DE", "Berlin", 52.52, 13.405);

    let mut kit = item(
        "url",
        "https://login.example-secure.com/verify",
        "phishing",
        "high",
        92.0,
        "Credential harvesting page",
    );
    kit.tags = vec!["phish-kit".to_string()];

    vec![hosting, kit]
}

fn custom_feed_items() -> Vec<RawFeedItem> {
    let mut botnet = item(
        "ip",
        "198.51.100.42",
        "botnet",
        "high",
        88.0,
        "Botnet command and control",
    );
    botnet.geolocation = geo("United Kingdom", "GB", "London", 51.5074, -0.1278);

    let mut spam = item(
        "ip",
        "192.0.2.123",
        "spam",
        "low",
        65.0,
        "Spam email source",
    );
    spam.geolocation = geo("Canada", "CA", "Toronto", 43.6532, -79.3832);

    let sender = item(
        "email",
        "promo@bulk-mailer.example.net",
        "spam",
        "low",
        60.0,
        "Bulk spam sender address",
    );

    vec![botnet, spam, sender]
}
