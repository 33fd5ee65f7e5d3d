//! Conversation store contract
//!
//! The relay and REST routes only talk to persistence through
//! [`ConversationStore`]. Two implementations ship with the crate:
//! [`PgConversationStore`] for production and [`MemoryConversationStore`]
//! for tests and local development.

pub mod memory;
pub mod postgres;

pub use memory::MemoryConversationStore;
pub use postgres::PgConversationStore;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::types::{
    Conversation, ConversationFilter, ConversationId, ConversationPatch, ConversationStats,
    Message, NewConversation, NewMessage,
};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Open a conversation, creating the initial customer message in the same write
    async fn create_conversation(&self, input: NewConversation) -> StoreResult<Conversation>;

    /// Fetch one conversation, `NotFound` if absent
    async fn get_conversation(&self, id: ConversationId) -> StoreResult<Conversation>;

    /// List conversations, most recently updated first
    async fn list_conversations(&self, filter: &ConversationFilter) -> StoreResult<Vec<Conversation>>;

    async fn update_conversation(
        &self,
        id: ConversationId,
        patch: ConversationPatch,
    ) -> StoreResult<Conversation>;

    /// Messages of a conversation ordered by `created_at` ascending, insertion order on ties
    async fn list_messages(&self, id: ConversationId) -> StoreResult<Vec<Message>>;

    /// Persist a message and refresh the conversation's `last_message`/`updated_at`
    async fn create_message(&self, input: NewMessage) -> StoreResult<Message>;

    /// Set the assigned staff member and move `PENDING` to `ACTIVE`
    async fn assign_conversation(&self, id: ConversationId, staff_id: &str) -> StoreResult<Conversation>;

    /// Move the conversation to `CLOSED`; closing a closed conversation is a no-op
    async fn close_conversation(&self, id: ConversationId) -> StoreResult<Conversation>;

    /// Reset the unread counter
    async fn mark_read(&self, id: ConversationId) -> StoreResult<Conversation>;

    /// Delete a conversation and all of its messages atomically
    async fn delete_conversation(&self, id: ConversationId) -> StoreResult<()>;

    /// Delete several conversations in one transaction, returning how many existed
    async fn bulk_delete_conversations(&self, ids: &[ConversationId]) -> StoreResult<u64>;

    async fn statistics(&self) -> StoreResult<ConversationStats>;
}

// =============================================================================
// Validation shared by both stores
// =============================================================================

pub(crate) fn validate_new_conversation(input: &NewConversation) -> StoreResult<()> {
    if input.customer_name.trim().is_empty() {
        return Err(StoreError::Validation("Customer name is required".into()));
    }
    Ok(())
}

pub(crate) fn validate_new_message(input: &NewMessage) -> StoreResult<()> {
    if input.content.trim().is_empty() {
        return Err(StoreError::Validation(
            "Message content cannot be empty".into(),
        ));
    }
    Ok(())
}

/// Check that assigning `staff_id` to `current` is allowed
///
/// Returns `Ok(false)` when the conversation is already assigned to the same
/// staff member and nothing needs to change.
pub(crate) fn check_assignment(current: &Conversation, staff_id: &str) -> StoreResult<bool> {
    if staff_id.trim().is_empty() {
        return Err(StoreError::Validation("Staff ID is required".into()));
    }
    if current.status.is_terminal() {
        return Err(StoreError::Closed(current.id));
    }
    match current.assigned_staff_id.as_deref() {
        Some(existing) if existing == staff_id => Ok(false),
        Some(existing) => Err(StoreError::Conflict(format!(
            "Conversation {} is already assigned to {}",
            current.id, existing
        ))),
        None => Ok(true),
    }
}
