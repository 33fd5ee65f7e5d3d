//! In-memory conversation store
//!
//! Keeps everything behind a single `RwLock`, so each operation is atomic in
//! the same way a database transaction would be.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{check_assignment, validate_new_conversation, validate_new_message, ConversationStore};
use crate::error::{StoreError, StoreResult};
use crate::types::{
    Conversation, ConversationFilter, ConversationId, ConversationPatch, ConversationStats,
    ConversationStatus, Message, MessageId, MessageSender, NewConversation, NewMessage,
    DEFAULT_LAST_MESSAGE,
};

#[derive(Default)]
struct Inner {
    conversations: HashMap<ConversationId, Conversation>,
    /// Messages per conversation in insertion order
    messages: HashMap<ConversationId, Vec<Message>>,
}

#[derive(Clone, Default)]
pub struct MemoryConversationStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Inner {
    fn conversation_mut(&mut self, id: ConversationId) -> StoreResult<&mut Conversation> {
        self.conversations.get_mut(&id).ok_or(StoreError::NotFound(id))
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn create_conversation(&self, input: NewConversation) -> StoreResult<Conversation> {
        validate_new_conversation(&input)?;

        let now = OffsetDateTime::now_utc();
        let initial = input
            .initial_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        let conversation = Conversation {
            id: ConversationId::new(),
            customer_name: input.customer_name.clone(),
            customer_email: input.customer_email.filter(|e| !e.trim().is_empty()),
            status: ConversationStatus::Pending,
            assigned_staff_id: None,
            last_message: Some(initial.clone().unwrap_or_else(|| DEFAULT_LAST_MESSAGE.to_string())),
            unread_count: 1,
            created_at: now,
            updated_at: now,
        };

        let mut messages = Vec::new();
        if let Some(content) = initial {
            messages.push(Message {
                id: MessageId::new(),
                conversation_id: conversation.id,
                sender: MessageSender::Customer,
                sender_name: Some(input.customer_name),
                content,
                created_at: now,
            });
        }

        let mut inner = self.inner.write().await;
        inner.conversations.insert(conversation.id, conversation.clone());
        inner.messages.insert(conversation.id, messages);

        Ok(conversation)
    }

    async fn get_conversation(&self, id: ConversationId) -> StoreResult<Conversation> {
        let inner = self.inner.read().await;
        inner.conversations.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn list_conversations(&self, filter: &ConversationFilter) -> StoreResult<Vec<Conversation>> {
        let inner = self.inner.read().await;
        let mut conversations: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn update_conversation(
        &self,
        id: ConversationId,
        patch: ConversationPatch,
    ) -> StoreResult<Conversation> {
        let mut inner = self.inner.write().await;
        let conversation = inner.conversation_mut(id)?;

        if conversation.status.is_terminal() {
            return Err(StoreError::Closed(id));
        }
        if let Some(name) = patch.customer_name() {
            conversation.customer_name = name.to_string();
        }
        if let Some(email) = patch.customer_email() {
            conversation.customer_email = Some(email.to_string());
        }
        conversation.updated_at = OffsetDateTime::now_utc();

        Ok(conversation.clone())
    }

    async fn list_messages(&self, id: ConversationId) -> StoreResult<Vec<Message>> {
        let inner = self.inner.read().await;
        if !inner.conversations.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        Ok(inner.messages.get(&id).cloned().unwrap_or_default())
    }

    async fn create_message(&self, input: NewMessage) -> StoreResult<Message> {
        validate_new_message(&input)?;

        let mut inner = self.inner.write().await;
        let conversation = inner.conversation_mut(input.conversation_id)?;
        if conversation.status.is_terminal() {
            return Err(StoreError::Closed(input.conversation_id));
        }

        // Never go backwards in time relative to the previous message
        let now = OffsetDateTime::now_utc().max(conversation.updated_at);
        conversation.last_message = Some(input.content.clone());
        conversation.updated_at = now;
        if input.sender == MessageSender::Customer {
            conversation.unread_count += 1;
        }

        let message = Message {
            id: MessageId::new(),
            conversation_id: input.conversation_id,
            sender: input.sender,
            sender_name: input.sender_name,
            content: input.content,
            created_at: now,
        };
        inner
            .messages
            .entry(input.conversation_id)
            .or_default()
            .push(message.clone());

        Ok(message)
    }

    async fn assign_conversation(&self, id: ConversationId, staff_id: &str) -> StoreResult<Conversation> {
        let mut inner = self.inner.write().await;
        let conversation = inner.conversation_mut(id)?;

        if !check_assignment(conversation, staff_id)? {
            return Ok(conversation.clone());
        }

        conversation.assigned_staff_id = Some(staff_id.to_string());
        if conversation.status == ConversationStatus::Pending {
            conversation.status = ConversationStatus::Active;
        }
        conversation.updated_at = OffsetDateTime::now_utc();

        Ok(conversation.clone())
    }

    async fn close_conversation(&self, id: ConversationId) -> StoreResult<Conversation> {
        let mut inner = self.inner.write().await;
        let conversation = inner.conversation_mut(id)?;

        if conversation.status.can_transition_to(ConversationStatus::Closed) {
            conversation.status = ConversationStatus::Closed;
            conversation.updated_at = OffsetDateTime::now_utc();
        }

        Ok(conversation.clone())
    }

    async fn mark_read(&self, id: ConversationId) -> StoreResult<Conversation> {
        let mut inner = self.inner.write().await;
        let conversation = inner.conversation_mut(id)?;
        conversation.unread_count = 0;
        Ok(conversation.clone())
    }

    async fn delete_conversation(&self, id: ConversationId) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.conversations.remove(&id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        inner.messages.remove(&id);
        Ok(())
    }

    async fn bulk_delete_conversations(&self, ids: &[ConversationId]) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let mut deleted = 0;
        for id in ids {
            if inner.conversations.remove(id).is_some() {
                inner.messages.remove(id);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn statistics(&self) -> StoreResult<ConversationStats> {
        let inner = self.inner.read().await;
        let mut stats = ConversationStats::default();
        for conversation in inner.conversations.values() {
            stats.total += 1;
            match conversation.status {
                ConversationStatus::Pending => stats.pending += 1,
                ConversationStatus::Active => stats.active += 1,
                ConversationStatus::Closed => stats.closed += 1,
            }
        }
        Ok(stats)
    }
}
