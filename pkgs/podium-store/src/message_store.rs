//! Message store - persistent message log with soft deletes

use crate::entities::{conversation_members, messages};
use crate::error::{BackendError, BackendResult};
use crate::from_millis;
use crate::models::{ConversationId, Message, MessageId, UserId};
use chrono::Utc;
use sea_orm::prelude::Expr;
use sea_orm::*;
use tracing::debug;

/// Message store - manages persistent message storage
pub struct MessageStore {
    pub(crate) db: DatabaseConnection,
}

impl MessageStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert a message from a member of the conversation
    pub async fn insert(
        &self,
        conversation: &ConversationId,
        sender: &UserId,
        body: &str,
    ) -> BackendResult<Message> {
        let is_member = conversation_members::Entity::find_by_id((
            conversation.0.clone(),
            sender.0.clone(),
        ))
        .one(&self.db)
        .await?
        .is_some();
        if !is_member {
            return Err(BackendError::NotFound(format!(
                "{} is not a member of {}",
                sender, conversation
            )));
        }

        let model = messages::Model {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation.0.clone(),
            sender_id: sender.0.clone(),
            body: body.to_string(),
            created_at: Utc::now().timestamp_millis(),
            deleted_at: None,
        };
        messages::Entity::insert(messages::ActiveModel {
            id: Set(model.id.clone()),
            conversation_id: Set(model.conversation_id.clone()),
            sender_id: Set(model.sender_id.clone()),
            body: Set(model.body.clone()),
            created_at: Set(model.created_at),
            deleted_at: Set(None),
        })
        .exec(&self.db)
        .await?;

        debug!("Stored message {} in {}", model.id, conversation);
        model_to_message(model)
    }

    /// Message history of one conversation, oldest first
    pub async fn list_by_conversation(
        &self,
        conversation: &ConversationId,
    ) -> BackendResult<Vec<Message>> {
        let models = messages::Entity::find()
            .filter(messages::Column::ConversationId.eq(conversation.as_str()))
            .filter(messages::Column::DeletedAt.is_null())
            .order_by_asc(messages::Column::CreatedAt)
            .order_by_asc(messages::Column::Id)
            .all(&self.db)
            .await?;

        debug!(
            "Retrieved {} messages from conversation {}",
            models.len(),
            conversation
        );
        models.into_iter().map(model_to_message).collect()
    }

    /// Message history of several conversations in one query, oldest first
    pub async fn list_for_conversations(
        &self,
        conversations: &[ConversationId],
    ) -> BackendResult<Vec<Message>> {
        if conversations.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<&str> = conversations.iter().map(|c| c.as_str()).collect();
        let models = messages::Entity::find()
            .filter(messages::Column::ConversationId.is_in(ids))
            .filter(messages::Column::DeletedAt.is_null())
            .order_by_asc(messages::Column::CreatedAt)
            .order_by_asc(messages::Column::Id)
            .all(&self.db)
            .await?;

        models.into_iter().map(model_to_message).collect()
    }

    /// Set `deleted_at` on a message; deleting twice keeps the first marker
    pub async fn soft_delete(&self, message: &MessageId) -> BackendResult<()> {
        let result = messages::Entity::update_many()
            .col_expr(
                messages::Column::DeletedAt,
                Expr::value(Utc::now().timestamp_millis()),
            )
            .filter(messages::Column::Id.eq(message.as_str()))
            .filter(messages::Column::DeletedAt.is_null())
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            let exists = messages::Entity::find_by_id(message.as_str().to_string())
                .one(&self.db)
                .await?
                .is_some();
            if !exists {
                return Err(BackendError::NotFound(format!("message {}", message)));
            }
        }

        debug!("Soft-deleted message {}", message);
        Ok(())
    }
}

/// Convert Sea-ORM model to Message
fn model_to_message(model: messages::Model) -> BackendResult<Message> {
    Ok(Message {
        id: MessageId::Server(model.id),
        conversation_id: ConversationId(model.conversation_id),
        sender_id: UserId(model.sender_id),
        body: model.body,
        created_at: from_millis(model.created_at)?,
        deleted_at: model.deleted_at.map(from_millis).transpose()?,
    })
}
