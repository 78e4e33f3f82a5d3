//! Profile store - participant display names

use crate::entities::users;
use crate::error::{BackendError, BackendResult};
use crate::models::UserId;
use sea_orm::prelude::Expr;
use sea_orm::sea_query::OnConflict;
use sea_orm::*;
use tracing::debug;

pub struct ProfileStore {
    db: DatabaseConnection,
}

impl ProfileStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create the user or update its display name and role
    pub async fn upsert_user(&self, id: &UserId, display_name: &str, role: &str) -> BackendResult<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let row = users::ActiveModel {
            id: Set(id.0.clone()),
            display_name: Set(display_name.to_string()),
            role: Set(role.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        users::Entity::insert(row)
            .on_conflict(
                OnConflict::column(users::Column::Id)
                    .update_columns([
                        users::Column::DisplayName,
                        users::Column::Role,
                        users::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        debug!("Upserted user {} ({})", id, display_name);
        Ok(())
    }

    pub async fn display_name(&self, id: &UserId) -> BackendResult<Option<String>> {
        let user = users::Entity::find_by_id(id.0.clone()).one(&self.db).await?;
        Ok(user.map(|u| u.display_name))
    }

    pub async fn update_display_name(&self, id: &UserId, name: &str) -> BackendResult<()> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::DisplayName, Expr::value(name))
            .col_expr(
                users::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().timestamp_millis()),
            )
            .filter(users::Column::Id.eq(id.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(BackendError::NotFound(format!("user {}", id)));
        }
        Ok(())
    }
}
