//! Notification store - per-recipient notification feed

use crate::entities::notifications;
use crate::error::{BackendError, BackendResult};
use crate::from_millis;
use crate::models::{NewNotification, Notification, NotificationId, UserId};
use chrono::Utc;
use sea_orm::prelude::Expr;
use sea_orm::*;
use tracing::{debug, info};

/// Notification store
pub struct NotificationStore {
    db: DatabaseConnection,
}

impl NotificationStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a notification for `recipient`
    pub async fn insert(
        &self,
        recipient: &UserId,
        new: NewNotification,
    ) -> BackendResult<Notification> {
        let model = notifications::Model {
            id: uuid::Uuid::new_v4().to_string(),
            recipient_id: recipient.0.clone(),
            kind: new.kind,
            title: new.title,
            body: new.body,
            href: new.href,
            entity_type: new.entity_type,
            entity_id: new.entity_id,
            is_read: false,
            created_at: Utc::now().timestamp_millis(),
        };

        notifications::Entity::insert(notifications::ActiveModel {
            id: Set(model.id.clone()),
            recipient_id: Set(model.recipient_id.clone()),
            kind: Set(model.kind.clone()),
            title: Set(model.title.clone()),
            body: Set(model.body.clone()),
            href: Set(model.href.clone()),
            entity_type: Set(model.entity_type.clone()),
            entity_id: Set(model.entity_id.clone()),
            is_read: Set(false),
            created_at: Set(model.created_at),
        })
        .exec(&self.db)
        .await?;

        debug!("Stored {} notification {} for {}", model.kind, model.id, recipient);
        model_to_notification(model)
    }

    /// The recipient's notifications, newest first
    pub async fn list(&self, recipient: &UserId) -> BackendResult<Vec<Notification>> {
        let models = notifications::Entity::find()
            .filter(notifications::Column::RecipientId.eq(recipient.as_str()))
            .order_by_desc(notifications::Column::CreatedAt)
            .order_by_desc(notifications::Column::Id)
            .all(&self.db)
            .await?;

        models.into_iter().map(model_to_notification).collect()
    }

    pub async fn mark_read(&self, id: &NotificationId) -> BackendResult<()> {
        let result = notifications::Entity::update_many()
            .col_expr(notifications::Column::IsRead, Expr::value(true))
            .filter(notifications::Column::Id.eq(id.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(BackendError::NotFound(format!("notification {}", id)));
        }
        Ok(())
    }

    /// Mark every unread notification of the recipient as read
    pub async fn mark_all_read(&self, recipient: &UserId) -> BackendResult<u64> {
        let result = notifications::Entity::update_many()
            .col_expr(notifications::Column::IsRead, Expr::value(true))
            .filter(notifications::Column::RecipientId.eq(recipient.as_str()))
            .filter(notifications::Column::IsRead.eq(false))
            .exec(&self.db)
            .await?;

        info!(
            "Marked {} notifications read for {}",
            result.rows_affected, recipient
        );
        Ok(result.rows_affected)
    }

    pub async fn unread_count(&self, recipient: &UserId) -> BackendResult<u64> {
        Ok(notifications::Entity::find()
            .filter(notifications::Column::RecipientId.eq(recipient.as_str()))
            .filter(notifications::Column::IsRead.eq(false))
            .count(&self.db)
            .await?)
    }
}

fn model_to_notification(model: notifications::Model) -> BackendResult<Notification> {
    Ok(Notification {
        id: NotificationId(model.id),
        kind: model.kind,
        title: model.title,
        body: model.body,
        href: model.href,
        entity_type: model.entity_type,
        entity_id: model.entity_id,
        is_read: model.is_read,
        created_at: from_millis(model.created_at)?,
    })
}
