use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, EntityTrait, Order, QueryOrder};
use serde::{Deserialize, Serialize};

use crate::entities::collection_state::{self, Column as StateCol, Entity as StateEntity};
use crate::error::Result;
use crate::store::SqlThreatStore;

/// Per-source collection bookkeeping, refreshed after every cycle.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CollectionStateRow {
    pub source: String,
    pub last_collected_at: DateTime<Utc>,
    pub last_item_count: i32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SqlThreatStore {
    pub async fn upsert_collection_state(
        &self,
        source: &str,
        last_collected_at: DateTime<Utc>,
        last_item_count: i32,
        last_error: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().fixed_offset();
        let am = collection_state::ActiveModel {
            source: Set(source.to_owned()),
            last_collected_at: Set(last_collected_at.fixed_offset()),
            last_item_count: Set(last_item_count),
            last_error: Set(last_error.map(|s| s.to_owned())),
            updated_at: Set(now),
        };
        StateEntity::insert(am)
            .on_conflict(
                OnConflict::column(StateCol::Source)
                    .update_columns([
                        StateCol::LastCollectedAt,
                        StateCol::LastItemCount,
                        StateCol::LastError,
                        StateCol::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(self.db())
            .await?;
        Ok(())
    }

    pub async fn get_collection_state(&self, source: &str) -> Result<Option<CollectionStateRow>> {
        let model = StateEntity::find_by_id(source).one(self.db()).await?;
        Ok(model.map(|m| CollectionStateRow {
            source: m.source,
            last_collected_at: m.last_collected_at.with_timezone(&Utc),
            last_item_count: m.last_item_count,
            last_error: m.last_error,
            updated_at: m.updated_at.with_timezone(&Utc),
        }))
    }

    pub async fn list_collection_state(&self) -> Result<Vec<CollectionStateRow>> {
        let rows = StateEntity::find()
            .order_by(StateCol::Source, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows
            .into_iter()
            .map(|m| CollectionStateRow {
                source: m.source,
                last_collected_at: m.last_collected_at.with_timezone(&Utc),
                last_item_count: m.last_item_count,
                last_error: m.last_error,
                updated_at: m.updated_at.with_timezone(&Utc),
            })
            .collect())
    }
}
