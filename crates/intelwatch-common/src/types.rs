use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of threat indicator reported by a feed.
///
/// # Examples
///
/// ```
/// use intelwatch_common::types::IndicatorType;
///
/// let t: IndicatorType = "ip".parse().unwrap();
/// assert_eq!(t, IndicatorType::Ip);
/// assert_eq!(t.to_string(), "ip");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorType {
    Ip,
    Domain,
    Url,
    Hash,
    Email,
}

impl std::fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndicatorType::Ip => write!(f, "ip"),
            IndicatorType::Domain => write!(f, "domain"),
            IndicatorType::Url => write!(f, "url"),
            IndicatorType::Hash => write!(f, "hash"),
            IndicatorType::Email => write!(f, "email"),
        }
    }
}

impl std::str::FromStr for IndicatorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ip" => Ok(IndicatorType::Ip),
            "domain" => Ok(IndicatorType::Domain),
            "url" => Ok(IndicatorType::Url),
            "hash" => Ok(IndicatorType::Hash),
            "email" => Ok(IndicatorType::Email),
            _ => Err(format!("unknown indicator type: {s}")),
        }
    }
}

/// Threat severity, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use intelwatch_common::types::Severity;
///
/// let sev: Severity = "high".parse().unwrap();
/// assert_eq!(sev, Severity::High);
/// assert_eq!(sev.to_string(), "high");
/// assert!(Severity::Critical > Severity::Low);
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Category assigned to a threat by the reporting feed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ThreatCategory {
    Malware,
    Phishing,
    Botnet,
    Spam,
    Ddos,
    Bruteforce,
    Scanning,
    Other,
}

impl std::fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreatCategory::Malware => write!(f, "malware"),
            ThreatCategory::Phishing => write!(f, "phishing"),
            ThreatCategory::Botnet => write!(f, "botnet"),
            ThreatCategory::Spam => write!(f, "spam"),
            ThreatCategory::Ddos => write!(f, "ddos"),
            ThreatCategory::Bruteforce => write!(f, "bruteforce"),
            ThreatCategory::Scanning => write!(f, "scanning"),
            ThreatCategory::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for ThreatCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "malware" => Ok(ThreatCategory::Malware),
            "phishing" => Ok(ThreatCategory::Phishing),
            "botnet" => Ok(ThreatCategory::Botnet),
            "spam" => Ok(ThreatCategory::Spam),
            "ddos" => Ok(ThreatCategory::Ddos),
            "bruteforce" => Ok(ThreatCategory::Bruteforce),
            "scanning" => Ok(ThreatCategory::Scanning),
            "other" => Ok(ThreatCategory::Other),
            _ => Err(format!("unknown threat category: {s}")),
        }
    }
}

/// Geographic origin attached to an indicator by a feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Geolocation {
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Identity of a logical threat record. Two observations with the same key
/// fold into the same active record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreatKey {
    pub indicator_value: String,
    pub indicator_type: IndicatorType,
    pub source: String,
}

/// One normalized report of an indicator from one fetch cycle.
/// Produced fresh on every cycle; never persisted directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatObservation {
    pub indicator_type: IndicatorType,
    pub indicator_value: String,
    pub category: ThreatCategory,
    pub severity: Severity,
    /// Confidence score, 0-100 inclusive.
    pub confidence: i32,
    pub source: String,
    pub description: Option<String>,
    pub geolocation: Option<Geolocation>,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ThreatObservation {
    pub fn key(&self) -> ThreatKey {
        ThreatKey {
            indicator_value: self.indicator_value.clone(),
            indicator_type: self.indicator_type,
            source: self.source.clone(),
        }
    }
}

/// Persistent threat record (threats table).
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ThreatRecord {
    pub id: String,
    pub indicator_type: IndicatorType,
    pub indicator_value: String,
    pub category: ThreatCategory,
    pub severity: Severity,
    pub confidence: i32,
    pub source: String,
    pub description: Option<String>,
    pub geolocation: Option<Geolocation>,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    /// Set once at creation, never updated afterwards.
    pub first_seen: DateTime<Utc>,
    /// Bumped on every matching observation.
    pub last_seen: DateTime<Utc>,
    /// Number of observations folded into this record since `first_seen`.
    pub observation_count: i64,
    /// True while the record is within the retention window.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ThreatRecord {
    pub fn key(&self) -> ThreatKey {
        ThreatKey {
            indicator_value: self.indicator_value.clone(),
            indicator_type: self.indicator_type,
            source: self.source.clone(),
        }
    }
}

/// Field values applied to an existing threat record by an update.
/// `first_seen`, `is_active`, and the dedup key are never part of an update.
#[derive(Debug, Clone)]
pub struct ThreatUpdate {
    pub category: ThreatCategory,
    pub severity: Severity,
    pub confidence: i32,
    pub description: Option<String>,
    pub geolocation: Option<Geolocation>,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub last_seen: DateTime<Utc>,
    pub observation_count: i64,
}

// User & auth types

/// User account row (password hash never serialized).
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Role: admin / analyst / viewer.
    pub role: String,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Login request.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct LoginResponse {
    /// JWT access token.
    pub access_token: String,
    /// Token lifetime in seconds.
    pub expires_in: u64,
}

/// Account registration request.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Optional role; defaults to "viewer".
    pub role: Option<String>,
}

// Threat API request types

/// Create-or-observe threat request. Goes through the same normalization and
/// upsert path as feed ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CreateThreatRequest {
    /// Indicator type: ip / domain / url / hash / email.
    #[serde(rename = "type")]
    pub indicator_type: String,
    pub value: String,
    pub category: String,
    pub severity: String,
    pub confidence: i32,
    pub source: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub geolocation: Option<Geolocation>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Partial update of a stored threat. Omitted fields keep their value.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct UpdateThreatRequest {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub confidence: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub geolocation: Option<Geolocation>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Bulk create-or-observe request.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BulkThreatsRequest {
    pub threats: Vec<CreateThreatRequest>,
}

/// Bulk delete request.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BulkDeleteRequest {
    pub ids: Vec<String>,
}
