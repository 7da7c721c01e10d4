use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Statement};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::entities::threat::{Column as ThreatCol, Entity as ThreatEntity};
use crate::error::Result;
use crate::store::SqlThreatStore;

/// Headline threat counters for the threats stats endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ThreatStatsSummary {
    pub total_threats: u64,
    /// Threats first recorded within the last 24 hours.
    pub recent_threats: u64,
    pub category_counts: HashMap<String, u64>,
    pub severity_counts: HashMap<String, u64>,
}

/// Aggregated dashboard figures.
#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DashboardSummary {
    pub total_threats: u64,
    pub threats_last_30_days: u64,
    pub threats_last_7_days: u64,
    pub threats_today: u64,
    pub severity_distribution: HashMap<String, u64>,
    pub category_distribution: HashMap<String, u64>,
    pub top_countries: Vec<CountryCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CountryCount {
    pub country: String,
    pub count: u64,
}

/// One day of new-threat volume.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TimeseriesPoint {
    /// Day in YYYY-MM-DD form.
    pub date: String,
    pub count: u64,
}

/// Geolocated aggregation bucket for the threat map.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct GeoPoint {
    pub country: String,
    pub country_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub severity: String,
    pub category: String,
    pub count: u64,
}

impl SqlThreatStore {
    async fn group_counts(&self, column: &str) -> Result<HashMap<String, u64>> {
        let sql = format!("SELECT {column} AS k, COUNT(*) AS count FROM threats GROUP BY {column}");
        let rows = self
            .db()
            .query_all(Statement::from_string(
                self.db().get_database_backend(),
                sql,
            ))
            .await?;
        let mut counts = HashMap::new();
        for row in rows {
            let key: String = row.try_get("", "k")?;
            let count: i64 = row.try_get("", "count")?;
            counts.insert(key, count.max(0) as u64);
        }
        Ok(counts)
    }

    async fn count_created_since(&self, since: DateTime<Utc>) -> Result<u64> {
        Ok(ThreatEntity::find()
            .filter(ThreatCol::CreatedAt.gte(since.fixed_offset()))
            .count(self.db())
            .await?)
    }

    pub async fn threat_stats(&self) -> Result<ThreatStatsSummary> {
        let total = ThreatEntity::find().count(self.db()).await?;
        let recent = self
            .count_created_since(Utc::now() - chrono::Duration::hours(24))
            .await?;
        Ok(ThreatStatsSummary {
            total_threats: total,
            recent_threats: recent,
            category_counts: self.group_counts("category").await?,
            severity_counts: self.group_counts("severity").await?,
        })
    }

    pub async fn dashboard_summary(&self) -> Result<DashboardSummary> {
        let now = Utc::now();
        let today = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc();

        let total = ThreatEntity::find().count(self.db()).await?;
        let last_30 = self
            .count_created_since(now - chrono::Duration::days(30))
            .await?;
        let last_7 = self
            .count_created_since(now - chrono::Duration::days(7))
            .await?;
        let today_count = self.count_created_since(today).await?;

        let sql = "SELECT json_extract(geolocation, '$.country') AS country, COUNT(*) AS count
             FROM threats
             WHERE geolocation IS NOT NULL
               AND json_extract(geolocation, '$.country') IS NOT NULL
             GROUP BY country
             ORDER BY count DESC
             LIMIT 10";
        let rows = self
            .db()
            .query_all(Statement::from_string(
                self.db().get_database_backend(),
                sql.to_string(),
            ))
            .await?;
        let mut top_countries = Vec::with_capacity(rows.len());
        for row in rows {
            let country: String = row.try_get("", "country")?;
            let count: i64 = row.try_get("", "count")?;
            top_countries.push(CountryCount {
                country,
                count: count.max(0) as u64,
            });
        }

        Ok(DashboardSummary {
            total_threats: total,
            threats_last_30_days: last_30,
            threats_last_7_days: last_7,
            threats_today: today_count,
            severity_distribution: self.group_counts("severity").await?,
            category_distribution: self.group_counts("category").await?,
            top_countries,
        })
    }

    /// Per-day new-threat counts since `now - days`.
    pub async fn threat_timeseries(&self, days: u32) -> Result<Vec<TimeseriesPoint>> {
        let start = Utc::now() - chrono::Duration::days(i64::from(days));
        let sql = "SELECT DATE(created_at) AS date, COUNT(*) AS count
             FROM threats
             WHERE created_at >= ?
             GROUP BY DATE(created_at)
             ORDER BY DATE(created_at) ASC";
        let rows = self
            .db()
            .query_all(Statement::from_sql_and_values(
                self.db().get_database_backend(),
                sql,
                [start.fixed_offset().to_rfc3339().into()],
            ))
            .await?;
        let mut points = Vec::with_capacity(rows.len());
        for row in rows {
            let date: String = row.try_get("", "date")?;
            let count: i64 = row.try_get("", "count")?;
            points.push(TimeseriesPoint {
                date,
                count: count.max(0) as u64,
            });
        }
        Ok(points)
    }

    /// Geolocated aggregation for map rendering. Rows without coordinates are
    /// excluded.
    pub async fn geographic_distribution(&self) -> Result<Vec<GeoPoint>> {
        let sql = "SELECT
                json_extract(geolocation, '$.country') AS country,
                json_extract(geolocation, '$.country_code') AS country_code,
                CAST(json_extract(geolocation, '$.latitude') AS REAL) AS latitude,
                CAST(json_extract(geolocation, '$.longitude') AS REAL) AS longitude,
                severity,
                category,
                COUNT(*) AS count
             FROM threats
             WHERE geolocation IS NOT NULL
               AND json_extract(geolocation, '$.latitude') IS NOT NULL
               AND json_extract(geolocation, '$.longitude') IS NOT NULL
             GROUP BY country, country_code, latitude, longitude, severity, category";
        let rows = self
            .db()
            .query_all(Statement::from_string(
                self.db().get_database_backend(),
                sql.to_string(),
            ))
            .await?;
        let mut points = Vec::with_capacity(rows.len());
        for row in rows {
            let country: Option<String> = row.try_get("", "country")?;
            let country_code: Option<String> = row.try_get("", "country_code")?;
            let latitude: f64 = row.try_get("", "latitude")?;
            let longitude: f64 = row.try_get("", "longitude")?;
            let severity: String = row.try_get("", "severity")?;
            let category: String = row.try_get("", "category")?;
            let count: i64 = row.try_get("", "count")?;
            points.push(GeoPoint {
                country: country.unwrap_or_else(|| "Unknown".to_string()),
                country_code: country_code.unwrap_or_default(),
                latitude,
                longitude,
                severity,
                category,
                count: count.max(0) as u64,
            });
        }
        Ok(points)
    }
}
