use chrono::Utc;
use intelwatch_common::types::UserRecord;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, SqlErr,
};

use crate::entities::user::{self, Column as UserCol, Entity as UserEntity};
use crate::error::{Result, StorageError};
use crate::store::SqlThreatStore;

fn model_to_user(m: user::Model) -> UserRecord {
    UserRecord {
        id: m.id,
        username: m.username,
        email: m.email,
        password_hash: m.password_hash,
        role: m.role,
        is_active: m.is_active,
        last_login_at: m.last_login_at.map(|t| t.with_timezone(&Utc)),
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

impl SqlThreatStore {
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<UserRecord> {
        let now = Utc::now().fixed_offset();
        let am = user::ActiveModel {
            id: Set(intelwatch_common::id::next_id()),
            username: Set(username.to_owned()),
            email: Set(email.to_owned()),
            password_hash: Set(password_hash.to_owned()),
            role: Set(role.to_owned()),
            is_active: Set(true),
            last_login_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await.map_err(|e| {
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                StorageError::Conflict {
                    entity: "user",
                    detail: format!("username or email already taken ({username})"),
                }
            } else {
                StorageError::from(e)
            }
        })?;
        Ok(model_to_user(model))
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let model = UserEntity::find()
            .filter(UserCol::Username.eq(username))
            .one(self.db())
            .await?;
        Ok(model.map(model_to_user))
    }

    pub async fn get_user_by_id(&self, id: &str) -> Result<Option<UserRecord>> {
        let model = UserEntity::find_by_id(id).one(self.db()).await?;
        Ok(model.map(model_to_user))
    }

    pub async fn count_users(&self) -> Result<u64> {
        Ok(UserEntity::find().count(self.db()).await?)
    }

    pub async fn list_users(&self, limit: usize, offset: usize) -> Result<Vec<UserRecord>> {
        let rows = UserEntity::find()
            .order_by(UserCol::CreatedAt, Order::Desc)
            .limit(limit as u64)
            .offset(offset as u64)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(model_to_user).collect())
    }

    /// Stamps `last_login_at` after a successful login.
    pub async fn touch_last_login(&self, id: &str) -> Result<()> {
        let model = UserEntity::find_by_id(id).one(self.db()).await?;
        let model = model.ok_or_else(|| StorageError::NotFound {
            entity: "user",
            id: id.to_string(),
        })?;
        let now = Utc::now().fixed_offset();
        let mut am: user::ActiveModel = model.into();
        am.last_login_at = Set(Some(now));
        am.updated_at = Set(now);
        am.update(self.db()).await?;
        Ok(())
    }
}
