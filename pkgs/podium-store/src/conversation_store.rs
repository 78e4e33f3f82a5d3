//! Conversation store - conversation rows, memberships and read markers

use crate::entities::{conversation_members, conversations, messages, users};
use crate::error::{BackendError, BackendResult};
use crate::from_millis;
use crate::models::{ConversationId, ConversationRecord, UserId};
use chrono::{DateTime, Utc};
use sea_orm::*;
use std::collections::HashMap;
use tracing::{debug, info};

/// Conversation store
pub struct ConversationStore {
    pub(crate) db: DatabaseConnection,
}

impl ConversationStore {
    /// Create a conversation store with an existing database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Find the conversation between two participants, creating it and both
    /// memberships if it does not exist yet
    pub async fn get_or_create(&self, a: &UserId, b: &UserId) -> BackendResult<ConversationId> {
        if a == b {
            return Err(BackendError::InvalidRecord(format!(
                "cannot start a conversation with oneself ({})",
                a
            )));
        }
        let (low, high) = if a <= b { (a, b) } else { (b, a) };

        if let Some(existing) = self.find_by_pair(low, high).await? {
            return Ok(ConversationId(existing.id));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().timestamp_millis();

        let txn = self.db.begin().await?;
        let inserted = conversations::Entity::insert(conversations::ActiveModel {
            id: Set(id.clone()),
            participant_a: Set(low.0.clone()),
            participant_b: Set(high.0.clone()),
            created_at: Set(now),
        })
        .exec(&txn)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                // Another writer created the pair concurrently
                txn.rollback().await?;
                let model = self.find_by_pair(low, high).await?.ok_or_else(|| {
                    BackendError::NotFound("conversation missing after concurrent insert".into())
                })?;
                return Ok(ConversationId(model.id));
            }
            Err(e) => return Err(e.into()),
        }

        for member in [low, high] {
            conversation_members::Entity::insert(conversation_members::ActiveModel {
                conversation_id: Set(id.clone()),
                user_id: Set(member.0.clone()),
                last_read_at: Set(None),
                joined_at: Set(now),
            })
            .exec(&txn)
            .await?;
        }
        txn.commit().await?;

        info!("Created conversation {} between {} and {}", id, low, high);
        Ok(ConversationId(id))
    }

    async fn find_by_pair(
        &self,
        low: &UserId,
        high: &UserId,
    ) -> BackendResult<Option<conversations::Model>> {
        Ok(conversations::Entity::find()
            .filter(conversations::Column::ParticipantA.eq(low.as_str()))
            .filter(conversations::Column::ParticipantB.eq(high.as_str()))
            .one(&self.db)
            .await?)
    }

    /// Both participants of a conversation, in canonical order
    pub async fn participants(
        &self,
        conversation: &ConversationId,
    ) -> BackendResult<(UserId, UserId)> {
        let model = conversations::Entity::find_by_id(conversation.0.clone())
            .one(&self.db)
            .await?
            .ok_or_else(|| BackendError::NotFound(format!("conversation {}", conversation)))?;

        Ok((
            UserId(model.participant_a),
            UserId(model.participant_b),
        ))
    }

    /// Conversations the viewer belongs to
    pub async fn list_for_viewer(&self, viewer: &UserId) -> BackendResult<Vec<ConversationRecord>> {
        let memberships = conversation_members::Entity::find()
            .filter(conversation_members::Column::UserId.eq(viewer.as_str()))
            .all(&self.db)
            .await?;

        if memberships.is_empty() {
            debug!("{} has no conversations", viewer);
            return Ok(Vec::new());
        }

        let ids: Vec<String> = memberships
            .iter()
            .map(|m| m.conversation_id.clone())
            .collect();
        let convs: HashMap<String, conversations::Model> = conversations::Entity::find()
            .filter(conversations::Column::Id.is_in(ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        let others: Vec<String> = convs
            .values()
            .map(|c| other_of(c, viewer).to_string())
            .collect();
        let names: HashMap<String, String> = users::Entity::find()
            .filter(users::Column::Id.is_in(others))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|u| (u.id, u.display_name))
            .collect();

        let mut records = Vec::with_capacity(memberships.len());
        for membership in memberships {
            let Some(conv) = convs.get(&membership.conversation_id) else {
                continue;
            };
            let other = other_of(conv, viewer).to_string();
            records.push(ConversationRecord {
                id: ConversationId(conv.id.clone()),
                participants: (
                    UserId(conv.participant_a.clone()),
                    UserId(conv.participant_b.clone()),
                ),
                other_display_name: names.get(&other).cloned().unwrap_or_else(|| other.clone()),
                other_party: UserId(other),
                last_read_at: membership.last_read_at.map(from_millis).transpose()?,
                created_at: from_millis(conv.created_at)?,
            });
        }

        debug!("Listed {} conversations for {}", records.len(), viewer);
        Ok(records)
    }

    /// Advance the member's `last_read_at`. A marker never moves backwards.
    pub async fn mark_read(
        &self,
        conversation: &ConversationId,
        viewer: &UserId,
        at: DateTime<Utc>,
    ) -> BackendResult<()> {
        let membership = conversation_members::Entity::find_by_id((
            conversation.0.clone(),
            viewer.0.clone(),
        ))
        .one(&self.db)
        .await?
        .ok_or_else(|| {
            BackendError::NotFound(format!("{} is not a member of {}", viewer, conversation))
        })?;

        let at_ms = at.timestamp_millis();
        if membership.last_read_at.is_some_and(|current| current >= at_ms) {
            return Ok(());
        }

        let mut active: conversation_members::ActiveModel = membership.into();
        active.last_read_at = Set(Some(at_ms));
        active.update(&self.db).await?;

        debug!("{} read {} up to {}", viewer, conversation, at);
        Ok(())
    }

    /// Recount unread messages across every conversation of the viewer
    pub async fn unread_total(&self, viewer: &UserId) -> BackendResult<u64> {
        let memberships = conversation_members::Entity::find()
            .filter(conversation_members::Column::UserId.eq(viewer.as_str()))
            .all(&self.db)
            .await?;

        let mut total = 0;
        for membership in memberships {
            let mut query = messages::Entity::find()
                .filter(messages::Column::ConversationId.eq(membership.conversation_id.as_str()))
                .filter(messages::Column::SenderId.ne(viewer.as_str()))
                .filter(messages::Column::DeletedAt.is_null());
            if let Some(read) = membership.last_read_at {
                query = query.filter(messages::Column::CreatedAt.gt(read));
            }
            total += query.count(&self.db).await?;
        }

        Ok(total)
    }
}

fn other_of<'a>(conv: &'a conversations::Model, viewer: &UserId) -> &'a str {
    if conv.participant_a == viewer.0 {
        &conv.participant_b
    } else {
        &conv.participant_a
    }
}
