use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DOWN_SQL)
            .await?;
        Ok(())
    }
}

const UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY NOT NULL,
    username TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'viewer',
    is_active INTEGER NOT NULL DEFAULT 1,
    last_login_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);

CREATE TABLE IF NOT EXISTS threats (
    id TEXT PRIMARY KEY NOT NULL,
    indicator_type TEXT NOT NULL,
    indicator_value TEXT NOT NULL,
    category TEXT NOT NULL,
    severity TEXT NOT NULL,
    confidence INTEGER NOT NULL DEFAULT 0,
    source TEXT NOT NULL,
    description TEXT,
    geolocation TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}',
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL,
    observation_count INTEGER NOT NULL DEFAULT 1,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_threats_value ON threats(indicator_value);
CREATE INDEX IF NOT EXISTS idx_threats_type ON threats(indicator_type);
CREATE INDEX IF NOT EXISTS idx_threats_category ON threats(category);
CREATE INDEX IF NOT EXISTS idx_threats_severity ON threats(severity);
CREATE INDEX IF NOT EXISTS idx_threats_source ON threats(source);
CREATE INDEX IF NOT EXISTS idx_threats_first_seen ON threats(first_seen);
CREATE INDEX IF NOT EXISTS idx_threats_last_seen ON threats(last_seen DESC);
CREATE INDEX IF NOT EXISTS idx_threats_is_active ON threats(is_active);
-- One active record per dedup key; historical (inactive) rows are exempt.
CREATE UNIQUE INDEX IF NOT EXISTS idx_threats_active_key
    ON threats(indicator_value, indicator_type, source) WHERE is_active = 1;

CREATE TABLE IF NOT EXISTS collection_state (
    source TEXT PRIMARY KEY NOT NULL,
    last_collected_at TEXT NOT NULL,
    last_item_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    updated_at TEXT NOT NULL
);
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS collection_state;
DROP TABLE IF EXISTS threats;
DROP TABLE IF EXISTS users;
";
