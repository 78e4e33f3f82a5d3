//! Presence store - which conversation each user has in the foreground

use crate::entities::presence;
use crate::error::BackendResult;
use crate::models::{ConversationId, UserId};
use chrono::{Duration, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::*;
use tracing::debug;

pub struct PresenceStore {
    db: DatabaseConnection,
}

impl PresenceStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Record the viewer's foreground conversation and refresh its timestamp
    pub async fn set_viewing(
        &self,
        viewer: &UserId,
        conversation: Option<&ConversationId>,
    ) -> BackendResult<()> {
        let row = presence::ActiveModel {
            user_id: Set(viewer.0.clone()),
            conversation_id: Set(conversation.map(|c| c.0.clone())),
            updated_at: Set(Utc::now().timestamp_millis()),
        };

        presence::Entity::insert(row)
            .on_conflict(
                OnConflict::column(presence::Column::UserId)
                    .update_columns([
                        presence::Column::ConversationId,
                        presence::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        debug!(
            "{} is viewing {}",
            viewer,
            conversation.map_or("nothing", |c| c.as_str())
        );
        Ok(())
    }

    /// True when the user reported `conversation` within the last `ttl`
    pub async fn is_viewing(
        &self,
        user: &UserId,
        conversation: &ConversationId,
        ttl: Duration,
    ) -> BackendResult<bool> {
        let row = presence::Entity::find_by_id(user.0.clone())
            .one(&self.db)
            .await?;

        let cutoff = (Utc::now() - ttl).timestamp_millis();
        Ok(row.is_some_and(|p| {
            p.conversation_id.as_deref() == Some(conversation.as_str()) && p.updated_at >= cutoff
        }))
    }
}
