//! PostgreSQL conversation store
//!
//! Status transitions lock the conversation row (`SELECT ... FOR UPDATE`)
//! so that concurrent assign/close/send calls observe a consistent status.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::{check_assignment, validate_new_conversation, validate_new_message, ConversationStore};
use crate::error::{StoreError, StoreResult};
use crate::types::{
    Conversation, ConversationFilter, ConversationId, ConversationPatch, ConversationStats,
    ConversationStatus, Message, MessageId, MessageSender, NewConversation, NewMessage,
    DEFAULT_LAST_MESSAGE,
};

const CONVERSATION_COLUMNS: &str = r#"
    id, customer_name, customer_email, status, assigned_staff_id,
    last_message, unread_count, created_at, updated_at
"#;

/// ILIKE pattern matching `needle` anywhere, with wildcards taken literally
fn contains_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[derive(Clone)]
pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_conversation(
        tx: &mut Transaction<'_, Postgres>,
        id: ConversationId,
    ) -> StoreResult<Conversation> {
        let query = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM support_conversations WHERE id = $1 FOR UPDATE"
        );
        sqlx::query_as::<_, Conversation>(&query)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(StoreError::NotFound(id))
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn create_conversation(&self, input: NewConversation) -> StoreResult<Conversation> {
        validate_new_conversation(&input)?;

        let initial = input
            .initial_message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        let email = input.customer_email.filter(|e| !e.trim().is_empty());

        let mut tx = self.pool.begin().await?;

        let query = format!(
            r#"
            INSERT INTO support_conversations
                (id, customer_name, customer_email, status, unread_count, last_message)
            VALUES ($1, $2, $3, $4, 1, $5)
            RETURNING {CONVERSATION_COLUMNS}
            "#
        );
        let conversation = sqlx::query_as::<_, Conversation>(&query)
            .bind(ConversationId::new())
            .bind(&input.customer_name)
            .bind(&email)
            .bind(ConversationStatus::Pending)
            .bind(initial.as_deref().unwrap_or(DEFAULT_LAST_MESSAGE))
            .fetch_one(&mut *tx)
            .await?;

        if let Some(content) = &initial {
            sqlx::query(
                r#"
                INSERT INTO support_messages (id, conversation_id, sender, sender_name, content, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(MessageId::new())
            .bind(conversation.id)
            .bind(MessageSender::Customer)
            .bind(&input.customer_name)
            .bind(content)
            .bind(conversation.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(conversation_id = %conversation.id, "Created support conversation");
        Ok(conversation)
    }

    async fn get_conversation(&self, id: ConversationId) -> StoreResult<Conversation> {
        let query = format!("SELECT {CONVERSATION_COLUMNS} FROM support_conversations WHERE id = $1");
        sqlx::query_as::<_, Conversation>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    async fn list_conversations(&self, filter: &ConversationFilter) -> StoreResult<Vec<Conversation>> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(contains_pattern);

        let query = format!(
            r#"
            SELECT {CONVERSATION_COLUMNS}
            FROM support_conversations
            WHERE ($1::VARCHAR IS NULL OR status = $1)
              AND ($2::TEXT IS NULL OR assigned_staff_id = $2)
              AND ($3::TEXT IS NULL OR customer_name ILIKE $3 OR customer_email ILIKE $3)
            ORDER BY updated_at DESC
            "#
        );
        let conversations = sqlx::query_as::<_, Conversation>(&query)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.assigned_staff_id.as_deref())
            .bind(search)
            .fetch_all(&self.pool)
            .await?;

        Ok(conversations)
    }

    async fn update_conversation(
        &self,
        id: ConversationId,
        patch: ConversationPatch,
    ) -> StoreResult<Conversation> {
        let mut tx = self.pool.begin().await?;
        let current = Self::lock_conversation(&mut tx, id).await?;
        if current.status.is_terminal() {
            return Err(StoreError::Closed(id));
        }

        let query = format!(
            r#"
            UPDATE support_conversations
            SET customer_name = COALESCE($2, customer_name),
                customer_email = COALESCE($3, customer_email),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {CONVERSATION_COLUMNS}
            "#
        );
        let conversation = sqlx::query_as::<_, Conversation>(&query)
            .bind(id)
            .bind(patch.customer_name())
            .bind(patch.customer_email())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(conversation)
    }

    async fn list_messages(&self, id: ConversationId) -> StoreResult<Vec<Message>> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM support_conversations WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        if !exists {
            return Err(StoreError::NotFound(id));
        }

        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT id, conversation_id, sender, sender_name, content, created_at
            FROM support_messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC, seq ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    async fn create_message(&self, input: NewMessage) -> StoreResult<Message> {
        validate_new_message(&input)?;

        let mut tx = self.pool.begin().await?;
        let current = Self::lock_conversation(&mut tx, input.conversation_id).await?;
        if current.status.is_terminal() {
            return Err(StoreError::Closed(input.conversation_id));
        }

        // GREATEST keeps created_at monotonic per conversation even with clock skew
        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO support_messages (id, conversation_id, sender, sender_name, content, created_at)
            VALUES ($1, $2, $3, $4, $5, GREATEST(NOW(), $6))
            RETURNING id, conversation_id, sender, sender_name, content, created_at
            "#,
        )
        .bind(MessageId::new())
        .bind(input.conversation_id)
        .bind(input.sender)
        .bind(&input.sender_name)
        .bind(&input.content)
        .bind(current.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE support_conversations
            SET last_message = $2,
                updated_at = $3,
                unread_count = unread_count + CASE WHEN $4 THEN 1 ELSE 0 END
            WHERE id = $1
            "#,
        )
        .bind(input.conversation_id)
        .bind(&message.content)
        .bind(message.created_at)
        .bind(input.sender == MessageSender::Customer)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(message)
    }

    async fn assign_conversation(&self, id: ConversationId, staff_id: &str) -> StoreResult<Conversation> {
        let mut tx = self.pool.begin().await?;
        let current = Self::lock_conversation(&mut tx, id).await?;

        if !check_assignment(&current, staff_id)? {
            return Ok(current);
        }

        let query = format!(
            r#"
            UPDATE support_conversations
            SET assigned_staff_id = $2,
                status = CASE WHEN status = 'PENDING' THEN 'ACTIVE' ELSE status END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {CONVERSATION_COLUMNS}
            "#
        );
        let conversation = sqlx::query_as::<_, Conversation>(&query)
            .bind(id)
            .bind(staff_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(conversation)
    }

    async fn close_conversation(&self, id: ConversationId) -> StoreResult<Conversation> {
        let mut tx = self.pool.begin().await?;
        let current = Self::lock_conversation(&mut tx, id).await?;

        if !current.status.can_transition_to(ConversationStatus::Closed) {
            return Ok(current);
        }

        let query = format!(
            r#"
            UPDATE support_conversations
            SET status = 'CLOSED', updated_at = NOW()
            WHERE id = $1
            RETURNING {CONVERSATION_COLUMNS}
            "#
        );
        let conversation = sqlx::query_as::<_, Conversation>(&query)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(conversation)
    }

    async fn mark_read(&self, id: ConversationId) -> StoreResult<Conversation> {
        let query = format!(
            r#"
            UPDATE support_conversations
            SET unread_count = 0
            WHERE id = $1
            RETURNING {CONVERSATION_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Conversation>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    async fn delete_conversation(&self, id: ConversationId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM support_messages WHERE conversation_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM support_conversations WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::NotFound(id));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn bulk_delete_conversations(&self, ids: &[ConversationId]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<uuid::Uuid> = ids.iter().map(|id| id.0).collect();

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM support_messages WHERE conversation_id = ANY($1)")
            .bind(&ids)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM support_conversations WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected())
    }

    async fn statistics(&self) -> StoreResult<ConversationStats> {
        let (total, pending, active, closed): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status = 'PENDING'),
                COUNT(*) FILTER (WHERE status = 'ACTIVE'),
                COUNT(*) FILTER (WHERE status = 'CLOSED')
            FROM support_conversations
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(ConversationStats {
            total,
            pending,
            active,
            closed,
        })
    }
}
