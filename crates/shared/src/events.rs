//! Realtime event types and serialization
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": {...}}`. Event names and camelCase payload
//! keys are the interop contract with the salon web widget and staff console.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{Conversation, ConversationId, ConversationStatus, Message, MessageId};

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from a client session to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Subscribe to a conversation room
    #[serde(rename = "conversation:join", rename_all = "camelCase")]
    Join {
        conversation_id: ConversationId,
        /// Conversation access token handed out at creation (customer sessions)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        access_token: Option<String>,
    },

    /// Unsubscribe from a conversation room
    #[serde(rename = "conversation:leave", rename_all = "camelCase")]
    Leave { conversation_id: ConversationId },

    /// Persist and broadcast a message
    #[serde(rename = "message:send", rename_all = "camelCase")]
    Send {
        conversation_id: ConversationId,
        content: String,
        /// "customer" | "staff" | "ai"; validated by the relay
        sender: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_name: Option<String>,
        /// Client-side correlation id echoed back on `message:new`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_message_id: Option<String>,
    },

    /// Typing indicator (not persisted)
    #[serde(rename = "user:typing", rename_all = "camelCase")]
    Typing {
        conversation_id: ConversationId,
        is_typing: bool,
    },

    /// Assign the conversation to a staff member
    #[serde(rename = "conversation:assign", rename_all = "camelCase")]
    Assign {
        conversation_id: ConversationId,
        staff_id: String,
    },

    /// Close the conversation
    #[serde(rename = "conversation:close", rename_all = "camelCase")]
    Close { conversation_id: ConversationId },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "conversation:join",
            Self::Leave { .. } => "conversation:leave",
            Self::Send { .. } => "message:send",
            Self::Typing { .. } => "user:typing",
            Self::Assign { .. } => "conversation:assign",
            Self::Close { .. } => "conversation:close",
        }
    }

    pub fn conversation_id(&self) -> ConversationId {
        match self {
            Self::Join { conversation_id, .. }
            | Self::Leave { conversation_id }
            | Self::Send { conversation_id, .. }
            | Self::Typing { conversation_id, .. }
            | Self::Assign { conversation_id, .. }
            | Self::Close { conversation_id } => *conversation_id,
        }
    }
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from the relay to client sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// A message was persisted in a room the session has joined
    #[serde(rename = "message:new")]
    NewMessage(MessagePayload),

    /// Someone else in the room started or stopped typing
    #[serde(rename = "user:typing", rename_all = "camelCase")]
    Typing {
        conversation_id: ConversationId,
        is_typing: bool,
    },

    #[serde(rename = "conversation:assigned", rename_all = "camelCase")]
    Assigned {
        conversation_id: ConversationId,
        staff_id: String,
    },

    #[serde(rename = "conversation:closed", rename_all = "camelCase")]
    Closed { conversation_id: ConversationId },

    /// A conversation was opened (sent to every connected session)
    #[serde(rename = "conversation:new")]
    NewConversation(Conversation),

    /// Conversation list summary for sessions outside the room
    #[serde(rename = "conversation:updated")]
    Updated(ConversationSummary),

    /// Failure of an operation, sent only to the session that issued it
    #[serde(rename = "error")]
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewMessage(_) => "message:new",
            Self::Typing { .. } => "user:typing",
            Self::Assigned { .. } => "conversation:assigned",
            Self::Closed { .. } => "conversation:closed",
            Self::NewConversation(_) => "conversation:new",
            Self::Updated(_) => "conversation:updated",
            Self::Error(_) => "error",
        }
    }
}

// =============================================================================
// Event Data Structures
// =============================================================================

/// Message event data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    /// Lower-case role: "customer" | "staff" | "ai"
    pub sender: String,
    pub sender_name: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
}

impl MessagePayload {
    pub fn from_message(message: &Message, client_message_id: Option<String>) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender: message.sender.as_wire().to_string(),
            sender_name: message
                .sender_name
                .clone()
                .unwrap_or_else(|| crate::types::ANONYMOUS_SENDER.to_string()),
            content: message.content.clone(),
            created_at: message.created_at,
            client_message_id,
        }
    }
}

/// Conversation list update data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation_id: ConversationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ConversationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_staff_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Error event data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Stable machine-readable code, e.g. `VALIDATION_ERROR`
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::MessageSender;

    #[test]
    fn test_client_event_deserialization() {
        let json = r#"{"event":"message:send","data":{"conversationId":"550e8400-e29b-41d4-a716-446655440000","content":"Hello","sender":"customer","senderName":"Lan"}}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::Send {
                conversation_id,
                content,
                sender,
                sender_name,
                client_message_id,
            } => {
                assert_eq!(
                    conversation_id.to_string(),
                    "550e8400-e29b-41d4-a716-446655440000"
                );
                assert_eq!(content, "Hello");
                assert_eq!(sender, "customer");
                assert_eq!(sender_name.as_deref(), Some("Lan"));
                assert!(client_message_id.is_none());
            }
            _ => panic!("Expected Send event"),
        }
    }

    #[test]
    fn test_client_event_names_on_the_wire() {
        let id = ConversationId::new();
        let events = vec![
            ClientEvent::Join {
                conversation_id: id,
                access_token: None,
            },
            ClientEvent::Leave { conversation_id: id },
            ClientEvent::Send {
                conversation_id: id,
                content: "x".into(),
                sender: "staff".into(),
                sender_name: None,
                client_message_id: None,
            },
            ClientEvent::Typing {
                conversation_id: id,
                is_typing: true,
            },
            ClientEvent::Assign {
                conversation_id: id,
                staff_id: "s1".into(),
            },
            ClientEvent::Close { conversation_id: id },
        ];

        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["event"], event.name());
            assert_eq!(json["data"]["conversationId"], id.to_string());
        }
    }

    #[test]
    fn test_typing_event_uses_camel_case() {
        let id = ConversationId::new();
        let json = serde_json::to_value(ServerEvent::Typing {
            conversation_id: id,
            is_typing: false,
        })
        .unwrap();
        assert_eq!(json["event"], "user:typing");
        assert_eq!(json["data"]["isTyping"], false);
    }

    #[test]
    fn test_message_payload_uses_lowercase_sender() {
        let message = Message {
            id: MessageId::new(),
            conversation_id: ConversationId::new(),
            sender: MessageSender::Customer,
            sender_name: None,
            content: "Hello".into(),
            created_at: OffsetDateTime::now_utc(),
        };

        let event = ServerEvent::NewMessage(MessagePayload::from_message(&message, Some("tmp-1".into())));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "message:new");
        assert_eq!(json["data"]["sender"], "customer");
        assert_eq!(json["data"]["senderName"], "Anonymous");
        assert_eq!(json["data"]["clientMessageId"], "tmp-1");
    }

    #[test]
    fn test_error_event_serialization() {
        let event = ServerEvent::Error(ErrorPayload {
            code: "VALIDATION_ERROR".into(),
            message: "Message content cannot be empty".into(),
            event: Some("message:send".into()),
            conversation_id: None,
            client_message_id: None,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.starts_with(r#"{"event":"error""#));
        assert!(json.contains("VALIDATION_ERROR"));
        assert!(!json.contains("conversationId"));
    }
}
