use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "threats")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub indicator_type: String,
    pub indicator_value: String,
    pub category: String,
    pub severity: String,
    pub confidence: i32,
    pub source: String,
    pub description: Option<String>,
    /// JSON-encoded `Geolocation`.
    pub geolocation: Option<String>,
    /// JSON-encoded string array.
    pub tags: String,
    /// JSON-encoded object.
    pub metadata: String,
    pub first_seen: DateTimeWithTimeZone,
    pub last_seen: DateTimeWithTimeZone,
    pub observation_count: i64,
    pub is_active: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
