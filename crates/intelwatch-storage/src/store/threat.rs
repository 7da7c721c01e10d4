use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intelwatch_common::types::{
    IndicatorType, Severity, ThreatCategory, ThreatKey, ThreatRecord, ThreatUpdate,
};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, EntityTrait, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, SqlErr,
};

use crate::entities::threat::{self, Column as ThreatCol, Entity as ThreatEntity};
use crate::error::{Result, StorageError};
use crate::store::SqlThreatStore;

/// Filters for the paginated threat listing.
#[derive(Debug, Clone, Default)]
pub struct ThreatListFilter {
    pub indicator_type_eq: Option<IndicatorType>,
    pub category_eq: Option<ThreatCategory>,
    pub severity_eq: Option<Severity>,
    pub source_contains: Option<String>,
    pub is_active_eq: Option<bool>,
    pub first_seen_gte: Option<DateTime<Utc>>,
    pub first_seen_lte: Option<DateTime<Utc>>,
}

pub(crate) fn model_to_record(m: threat::Model) -> Result<ThreatRecord> {
    let indicator_type: IndicatorType =
        m.indicator_type
            .parse()
            .map_err(|_| StorageError::InvalidColumn {
                column: "indicator_type",
                value: m.indicator_type.clone(),
            })?;
    let category: ThreatCategory = m.category.parse().map_err(|_| StorageError::InvalidColumn {
        column: "category",
        value: m.category.clone(),
    })?;
    let severity: Severity = m.severity.parse().map_err(|_| StorageError::InvalidColumn {
        column: "severity",
        value: m.severity.clone(),
    })?;
    let geolocation = m
        .geolocation
        .as_deref()
        .and_then(|s| serde_json::from_str(s).ok());
    let tags: Vec<String> = serde_json::from_str(&m.tags).unwrap_or_default();
    let metadata = serde_json::from_str(&m.metadata).unwrap_or_default();

    Ok(ThreatRecord {
        id: m.id,
        indicator_type,
        indicator_value: m.indicator_value,
        category,
        severity,
        confidence: m.confidence,
        source: m.source,
        description: m.description,
        geolocation,
        tags,
        metadata,
        first_seen: m.first_seen.with_timezone(&Utc),
        last_seen: m.last_seen.with_timezone(&Utc),
        observation_count: m.observation_count,
        is_active: m.is_active,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    })
}

fn apply_filter(
    mut q: sea_orm::Select<ThreatEntity>,
    filter: &ThreatListFilter,
) -> sea_orm::Select<ThreatEntity> {
    if let Some(t) = filter.indicator_type_eq {
        q = q.filter(ThreatCol::IndicatorType.eq(t.to_string()));
    }
    if let Some(c) = filter.category_eq {
        q = q.filter(ThreatCol::Category.eq(c.to_string()));
    }
    if let Some(s) = filter.severity_eq {
        q = q.filter(ThreatCol::Severity.eq(s.to_string()));
    }
    if let Some(ref s) = filter.source_contains {
        q = q.filter(ThreatCol::Source.contains(s.as_str()));
    }
    if let Some(active) = filter.is_active_eq {
        q = q.filter(ThreatCol::IsActive.eq(active));
    }
    if let Some(from) = filter.first_seen_gte {
        q = q.filter(ThreatCol::FirstSeen.gte(from.fixed_offset()));
    }
    if let Some(to) = filter.first_seen_lte {
        q = q.filter(ThreatCol::FirstSeen.lte(to.fixed_offset()));
    }
    q
}

impl SqlThreatStore {
    pub async fn get_threat_by_id(&self, id: &str) -> Result<Option<ThreatRecord>> {
        let model = ThreatEntity::find_by_id(id).one(self.db()).await?;
        model.map(model_to_record).transpose()
    }

    /// Paginated listing, most recently seen first.
    pub async fn list_threats(
        &self,
        filter: &ThreatListFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ThreatRecord>> {
        let rows = apply_filter(ThreatEntity::find(), filter)
            .order_by(ThreatCol::LastSeen, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_record).collect()
    }

    pub async fn count_threats(&self, filter: &ThreatListFilter) -> Result<u64> {
        Ok(apply_filter(ThreatEntity::find(), filter)
            .count(self.db())
            .await?)
    }

    /// Free-text search over indicator value, description, and tags.
    pub async fn search_threats(
        &self,
        query: &str,
        indicator_type_eq: Option<IndicatorType>,
        limit: usize,
    ) -> Result<Vec<ThreatRecord>> {
        let mut q = ThreatEntity::find().filter(
            Condition::any()
                .add(ThreatCol::IndicatorValue.contains(query))
                .add(ThreatCol::Description.contains(query))
                .add(ThreatCol::Tags.contains(query)),
        );
        if let Some(t) = indicator_type_eq {
            q = q.filter(ThreatCol::IndicatorType.eq(t.to_string()));
        }
        let rows = q
            .order_by(ThreatCol::LastSeen, Order::Desc)
            .limit(limit as u64)
            .all(self.db())
            .await?;
        rows.into_iter().map(model_to_record).collect()
    }

    pub async fn delete_threat(&self, id: &str) -> Result<bool> {
        let res = ThreatEntity::delete_by_id(id).exec(self.db()).await?;
        Ok(res.rows_affected > 0)
    }

    pub async fn bulk_delete_threats(&self, ids: &[String]) -> Result<u64> {
        let res = ThreatEntity::delete_many()
            .filter(ThreatCol::Id.is_in(ids.to_vec()))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected)
    }
}

#[async_trait]
impl crate::ThreatStore for SqlThreatStore {
    async fn find_active_by_key(&self, key: &ThreatKey) -> Result<Option<ThreatRecord>> {
        let model = ThreatEntity::find()
            .filter(ThreatCol::IndicatorValue.eq(key.indicator_value.as_str()))
            .filter(ThreatCol::IndicatorType.eq(key.indicator_type.to_string()))
            .filter(ThreatCol::Source.eq(key.source.as_str()))
            .filter(ThreatCol::IsActive.eq(true))
            .one(self.db())
            .await?;
        model.map(model_to_record).transpose()
    }

    async fn insert_threat(&self, record: &ThreatRecord) -> Result<ThreatRecord> {
        let geolocation = record
            .geolocation
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let am = threat::ActiveModel {
            id: Set(record.id.clone()),
            indicator_type: Set(record.indicator_type.to_string()),
            indicator_value: Set(record.indicator_value.clone()),
            category: Set(record.category.to_string()),
            severity: Set(record.severity.to_string()),
            confidence: Set(record.confidence),
            source: Set(record.source.clone()),
            description: Set(record.description.clone()),
            geolocation: Set(geolocation),
            tags: Set(serde_json::to_string(&record.tags)?),
            metadata: Set(serde_json::to_string(&record.metadata)?),
            first_seen: Set(record.first_seen.fixed_offset()),
            last_seen: Set(record.last_seen.fixed_offset()),
            observation_count: Set(record.observation_count),
            is_active: Set(record.is_active),
            created_at: Set(record.created_at.fixed_offset()),
            updated_at: Set(record.updated_at.fixed_offset()),
        };
        let model = am.insert(self.db()).await.map_err(|e| {
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                StorageError::Conflict {
                    entity: "threat",
                    detail: format!(
                        "active record already exists for ({}, {}, {})",
                        record.indicator_value, record.indicator_type, record.source
                    ),
                }
            } else {
                StorageError::from(e)
            }
        })?;
        model_to_record(model)
    }

    async fn update_threat(&self, id: &str, update: &ThreatUpdate) -> Result<ThreatRecord> {
        let model = ThreatEntity::find_by_id(id).one(self.db()).await?;
        let model = model.ok_or_else(|| StorageError::NotFound {
            entity: "threat",
            id: id.to_string(),
        })?;
        let geolocation = update
            .geolocation
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let mut am: threat::ActiveModel = model.into();
        am.category = Set(update.category.to_string());
        am.severity = Set(update.severity.to_string());
        am.confidence = Set(update.confidence);
        am.description = Set(update.description.clone());
        am.geolocation = Set(geolocation);
        am.tags = Set(serde_json::to_string(&update.tags)?);
        am.metadata = Set(serde_json::to_string(&update.metadata)?);
        am.last_seen = Set(update.last_seen.fixed_offset());
        am.observation_count = Set(update.observation_count);
        am.updated_at = Set(Utc::now().fixed_offset());
        let updated = am.update(self.db()).await?;
        model_to_record(updated)
    }

    async fn find_stale_active(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>> {
        let rows = ThreatEntity::find()
            .filter(ThreatCol::IsActive.eq(true))
            .filter(ThreatCol::LastSeen.lt(cutoff.fixed_offset()))
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(|m| m.id).collect())
    }

    async fn bulk_deactivate(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let res = ThreatEntity::update_many()
            .col_expr(ThreatCol::IsActive, Expr::value(false))
            .col_expr(
                ThreatCol::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(ThreatCol::Id.is_in(ids.to_vec()))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected)
    }
}
