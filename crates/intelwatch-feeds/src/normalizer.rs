//! Converts heterogeneous raw feed payloads into canonical
//! [`ThreatObservation`]s.
//!
//! Pure and deterministic: identical input always produces identical output,
//! and nothing here touches the store.

use intelwatch_common::types::{IndicatorType, Severity, ThreatCategory, ThreatObservation};

use crate::error::NormalizationError;
use crate::RawFeedItem;

/// Confidence assumed when a feed omits the field.
const DEFAULT_CONFIDENCE: f64 = 50.0;

/// Validate and normalize one raw feed item.
pub fn normalize(
    raw: &RawFeedItem,
    source_name: &str,
) -> Result<ThreatObservation, NormalizationError> {
    let source = source_name.trim();
    if source.is_empty() {
        return Err(NormalizationError::MissingField { field: "source" });
    }

    let type_str = raw
        .indicator_type
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(NormalizationError::MissingField { field: "type" })?;
    let value = raw
        .value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(NormalizationError::MissingField { field: "value" })?;

    let indicator_type: IndicatorType =
        type_str
            .parse()
            .map_err(|_| NormalizationError::InvalidIndicator {
                indicator_type: type_str.to_string(),
                value: value.to_string(),
            })?;

    if !matches_grammar(indicator_type, value) {
        return Err(NormalizationError::InvalidIndicator {
            indicator_type: indicator_type.to_string(),
            value: value.to_string(),
        });
    }

    // A category or severity that is present but unparseable is treated the
    // same as an absent one.
    let category: ThreatCategory = raw
        .category
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
        .ok_or(NormalizationError::MissingField { field: "category" })?;
    let severity: Severity = raw
        .severity
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
        .ok_or(NormalizationError::MissingField { field: "severity" })?;

    let confidence = raw.confidence.unwrap_or(DEFAULT_CONFIDENCE);
    if !(0.0..=100.0).contains(&confidence) {
        return Err(NormalizationError::OutOfRange {
            field: "confidence",
            value: confidence,
        });
    }

    Ok(ThreatObservation {
        indicator_type,
        indicator_value: value.to_string(),
        category,
        severity,
        confidence: confidence.round() as i32,
        source: source.to_string(),
        description: raw
            .description
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        geolocation: raw.geolocation.clone(),
        tags: raw.tags.clone(),
        metadata: raw.metadata.clone(),
    })
}

fn matches_grammar(indicator_type: IndicatorType, value: &str) -> bool {
    match indicator_type {
        IndicatorType::Ip => value.parse::<std::net::IpAddr>().is_ok(),
        IndicatorType::Domain => is_valid_domain(value),
        IndicatorType::Url => is_valid_url(value),
        IndicatorType::Hash => is_valid_hash(value),
        IndicatorType::Email => is_valid_email(value),
    }
}

/// RFC 1035-shaped hostname: dot-separated alphanumeric/hyphen labels with an
/// alphabetic TLD of at least two characters.
fn is_valid_domain(value: &str) -> bool {
    if value.len() > 253 {
        return false;
    }
    let labels: Vec<&str> = value.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    let valid_label = |label: &&str| {
        !label.is_empty()
            && label.len() <= 63
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
            && !label.starts_with('-')
            && !label.ends_with('-')
    };
    if !labels.iter().all(valid_label) {
        return false;
    }
    let tld = labels[labels.len() - 1];
    tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic())
}

fn is_valid_url(value: &str) -> bool {
    match url::Url::parse(value) {
        Ok(parsed) => parsed.has_host(),
        Err(_) => false,
    }
}

/// MD5 (32), SHA-1 (40), or SHA-256 (64) hex digest.
fn is_valid_hash(value: &str) -> bool {
    matches!(value.len(), 32 | 40 | 64) && value.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_valid_email(value: &str) -> bool {
    let mut parts = value.splitn(2, '@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    !local.is_empty()
        && !local.contains(char::is_whitespace)
        && local.len() <= 64
        && is_valid_domain(domain)
}
