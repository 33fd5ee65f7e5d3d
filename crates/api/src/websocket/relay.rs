//! Support conversation relay
//!
//! Applies client operations to the conversation store and fans the results
//! out to conversation rooms. A mutation is persisted first and broadcast
//! only once the write succeeded; on failure the originating session alone
//! receives an `error` event.

use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use salonchat_shared::{
    preview, ClientEvent, Conversation, ConversationId, ConversationStore, ConversationSummary,
    Message, MessagePayload, MessageSender, NewConversation, NewMessage, ServerEvent,
};

use super::connection::{Connection, SessionRole};
use super::locks::ConversationLocks;
use super::state::WebSocketState;
use crate::access::RoomAccess;
use crate::error::{RelayError, RelayResult};

/// Who issued an operation
///
/// Socket operations carry the session id so follow-up notifications skip
/// the originating session. REST calls have no session.
#[derive(Debug, Clone, Copy)]
pub struct Origin {
    pub session_id: Option<Uuid>,
    pub role: SessionRole,
}

impl Origin {
    pub fn session(conn: &Connection) -> Self {
        Self {
            session_id: Some(conn.session_id),
            role: conn.role,
        }
    }

    pub fn http(role: SessionRole) -> Self {
        Self {
            session_id: None,
            role,
        }
    }
}

/// Outgoing message request
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub conversation_id: ConversationId,
    pub content: String,
    /// Lower-case role as received from the client
    pub sender: String,
    pub sender_name: Option<String>,
    pub client_message_id: Option<String>,
}

pub struct SupportRelay {
    store: Arc<dyn ConversationStore>,
    ws: WebSocketState,
    access: RoomAccess,
    locks: ConversationLocks,
}

impl SupportRelay {
    pub fn new(store: Arc<dyn ConversationStore>, ws: WebSocketState, access: RoomAccess) -> Self {
        Self {
            store,
            ws,
            access,
            locks: ConversationLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn access(&self) -> &RoomAccess {
        &self.access
    }

    pub fn ws(&self) -> &WebSocketState {
        &self.ws
    }

    /// Sessions that may see conversation list traffic
    ///
    /// `conversation:new` and `conversation:updated` carry customer details
    /// and message previews, so with room access enforced only staff
    /// consoles receive them.
    fn list_audience(&self) -> Option<SessionRole> {
        self.access.is_enforced().then_some(SessionRole::Staff)
    }

    /// Open a conversation and announce it to the conversation lists
    ///
    /// Returns the conversation with the access token its customer presents
    /// on `conversation:join`.
    pub async fn open_conversation(&self, input: NewConversation) -> RelayResult<(Conversation, String)> {
        let conversation = self.store.create_conversation(input).await?;
        let token = self.access.conversation_token(conversation.id);

        let recipients = self
            .ws
            .broadcast_all(
                self.list_audience(),
                ServerEvent::NewConversation(conversation.clone()),
            )
            .await;

        tracing::info!(
            conversation_id = %conversation.id,
            recipients,
            "Support conversation opened"
        );

        Ok((conversation, token))
    }

    /// Subscribe a session to a conversation room
    ///
    /// Returns false when the session had already joined. Staff joins reset
    /// the unread counter.
    pub async fn join(
        &self,
        conn: &Arc<Connection>,
        conversation_id: ConversationId,
        access_token: Option<&str>,
    ) -> RelayResult<bool> {
        self.access
            .authorize_conversation(conn.role, conversation_id, access_token)?;
        self.store.get_conversation(conversation_id).await?;

        let joined = self.ws.rooms.join(conversation_id, Arc::clone(conn)).await;
        conn.subscribe(conversation_id).await;

        if joined && conn.role == SessionRole::Staff {
            if let Err(e) = self.store.mark_read(conversation_id).await {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "Failed to mark conversation read on staff join"
                );
            }
        }

        tracing::info!(
            session_id = %conn.session_id,
            conversation_id = %conversation_id,
            role = conn.role.as_str(),
            "Session joined conversation"
        );

        Ok(joined)
    }

    /// Unsubscribe a session; returns false if it was not in the room
    pub async fn leave(&self, conn: &Connection, conversation_id: ConversationId) -> bool {
        conn.unsubscribe(conversation_id).await;
        let left = self.ws.rooms.leave(&conversation_id, &conn.session_id).await;

        if left {
            tracing::info!(
                session_id = %conn.session_id,
                conversation_id = %conversation_id,
                "Session left conversation"
            );
        }
        left
    }

    /// Persist a message and broadcast `message:new` to the room
    pub async fn send(&self, origin: Origin, request: SendRequest) -> RelayResult<Message> {
        let sender = MessageSender::parse_role(&request.sender).ok_or_else(|| {
            RelayError::Validation(format!("Invalid sender role: {}", request.sender))
        })?;
        if request.content.trim().is_empty() {
            return Err(RelayError::Validation(
                "Message content cannot be empty".to_string(),
            ));
        }
        self.access.authorize_sender(origin.role, sender)?;

        let conversation_id = request.conversation_id;
        let _guard = self.locks.acquire(conversation_id).await;

        let message = self
            .store
            .create_message(NewMessage {
                conversation_id,
                sender,
                sender_name: request.sender_name,
                content: request.content,
            })
            .await?;

        let recipients = self
            .ws
            .rooms
            .broadcast(
                &conversation_id,
                ServerEvent::NewMessage(MessagePayload::from_message(
                    &message,
                    request.client_message_id,
                )),
            )
            .await;

        self.ws
            .broadcast_outside_room(
                &conversation_id,
                self.list_audience(),
                origin.session_id,
                ServerEvent::Updated(ConversationSummary {
                    conversation_id,
                    last_message: Some(preview(&message.content)),
                    status: None,
                    assigned_staff_id: None,
                    timestamp: message.created_at,
                }),
            )
            .await;

        tracing::debug!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            sender = sender.as_wire(),
            recipients,
            "Relayed message"
        );

        Ok(message)
    }

    /// Forward a typing indicator to the other members of the room
    pub async fn typing(&self, conn: &Connection, conversation_id: ConversationId, is_typing: bool) -> usize {
        self.ws
            .rooms
            .broadcast_except(
                &conversation_id,
                Some(conn.session_id),
                ServerEvent::Typing {
                    conversation_id,
                    is_typing,
                },
            )
            .await
    }

    /// Assign a conversation to a staff member
    ///
    /// Re-assigning to the same staff member succeeds without a broadcast.
    pub async fn assign(
        &self,
        origin: Origin,
        conversation_id: ConversationId,
        staff_id: &str,
    ) -> RelayResult<Conversation> {
        self.access.require_staff(origin.role, "assign conversations")?;
        let staff_id = staff_id.trim();
        if staff_id.is_empty() {
            return Err(RelayError::Validation("Staff ID is required".to_string()));
        }

        let _guard = self.locks.acquire(conversation_id).await;

        let current = self.store.get_conversation(conversation_id).await?;
        if !current.status.is_terminal() && current.assigned_staff_id.as_deref() == Some(staff_id) {
            return Ok(current);
        }

        let conversation = self
            .store
            .assign_conversation(conversation_id, staff_id)
            .await?;

        self.ws
            .rooms
            .broadcast(
                &conversation_id,
                ServerEvent::Assigned {
                    conversation_id,
                    staff_id: staff_id.to_string(),
                },
            )
            .await;
        self.announce_update(&conversation, origin).await;

        tracing::info!(
            conversation_id = %conversation_id,
            staff_id,
            "Conversation assigned"
        );

        Ok(conversation)
    }

    /// Close a conversation; closing a closed conversation changes nothing
    pub async fn close(&self, origin: Origin, conversation_id: ConversationId) -> RelayResult<Conversation> {
        let _guard = self.locks.acquire(conversation_id).await;

        let current = self.store.get_conversation(conversation_id).await?;
        if current.status.is_terminal() {
            return Ok(current);
        }

        let conversation = self.store.close_conversation(conversation_id).await?;

        self.ws
            .rooms
            .broadcast(&conversation_id, ServerEvent::Closed { conversation_id })
            .await;
        self.announce_update(&conversation, origin).await;

        tracing::info!(conversation_id = %conversation_id, "Conversation closed");

        Ok(conversation)
    }

    /// Apply one inbound socket event
    ///
    /// Failures are reported to `conn` only.
    pub async fn dispatch(&self, conn: &Arc<Connection>, event: ClientEvent) {
        let name = event.name();
        let conversation_id = event.conversation_id();
        let client_message_id = match &event {
            ClientEvent::Send {
                client_message_id, ..
            } => client_message_id.clone(),
            _ => None,
        };

        let origin = Origin::session(conn);
        let result = match event {
            ClientEvent::Join {
                conversation_id,
                access_token,
            } => self
                .join(conn, conversation_id, access_token.as_deref())
                .await
                .map(|_| ()),
            ClientEvent::Leave { conversation_id } => {
                self.leave(conn, conversation_id).await;
                Ok(())
            }
            ClientEvent::Send {
                conversation_id,
                content,
                sender,
                sender_name,
                client_message_id,
            } => match self.require_joined(conn, conversation_id).await {
                Ok(()) => self
                    .send(
                        origin,
                        SendRequest {
                            conversation_id,
                            content,
                            sender,
                            sender_name,
                            client_message_id,
                        },
                    )
                    .await
                    .map(|_| ()),
                Err(e) => Err(e),
            },
            ClientEvent::Typing {
                conversation_id,
                is_typing,
            } => match self.require_joined(conn, conversation_id).await {
                Ok(()) => {
                    self.typing(conn, conversation_id, is_typing).await;
                    Ok(())
                }
                Err(e) => Err(e),
            },
            ClientEvent::Assign {
                conversation_id,
                staff_id,
            } => self
                .assign(origin, conversation_id, &staff_id)
                .await
                .map(|_| ()),
            ClientEvent::Close { conversation_id } => {
                match self.require_joined(conn, conversation_id).await {
                    Ok(()) => self.close(origin, conversation_id).await.map(|_| ()),
                    Err(e) => Err(e),
                }
            }
        };

        if let Err(err) = result {
            report_error(conn, &err, Some(name), Some(conversation_id), client_message_id);
        }
    }

    /// Customer sessions must have joined a room before acting in it
    async fn require_joined(&self, conn: &Connection, conversation_id: ConversationId) -> RelayResult<()> {
        if self.access.is_enforced()
            && conn.role == SessionRole::Customer
            && !conn.is_subscribed(&conversation_id).await
        {
            return Err(RelayError::Forbidden(
                "Join the conversation before sending events to it".to_string(),
            ));
        }
        Ok(())
    }

    async fn announce_update(&self, conversation: &Conversation, origin: Origin) {
        self.ws
            .broadcast_outside_room(
                &conversation.id,
                self.list_audience(),
                origin.session_id,
                ServerEvent::Updated(ConversationSummary {
                    conversation_id: conversation.id,
                    last_message: None,
                    status: Some(conversation.status),
                    assigned_staff_id: conversation.assigned_staff_id.clone(),
                    timestamp: OffsetDateTime::now_utc(),
                }),
            )
            .await;
    }
}

/// Send an `error` event to one session
pub fn report_error(
    conn: &Connection,
    err: &RelayError,
    event: Option<&str>,
    conversation_id: Option<ConversationId>,
    client_message_id: Option<String>,
) {
    tracing::warn!(
        session_id = %conn.session_id,
        code = err.code(),
        event = event.unwrap_or("unknown"),
        error = %err,
        "Relay operation failed"
    );

    let payload = err.to_payload(event, conversation_id, client_message_id);
    if conn.send(ServerEvent::Error(payload)).is_err() {
        tracing::debug!(
            session_id = %conn.session_id,
            "Dropped error event for closed connection"
        );
    }
}
