//! Conversation room management for pub/sub
//!
//! Manages one "room" per conversation for broadcasting events to every
//! session that joined it.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use salonchat_shared::{ConversationId, ServerEvent};

use super::connection::Connection;

/// Manages conversation rooms for broadcasting events
pub struct RoomManager {
    /// Map of conversation_id -> connections in join order
    rooms: Arc<RwLock<HashMap<ConversationId, Vec<Arc<Connection>>>>>,
}

impl RoomManager {
    /// Create a new room manager
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a connection to a conversation room
    ///
    /// Returns false (and changes nothing) if the session is already in the room.
    pub async fn join(&self, conversation_id: ConversationId, conn: Arc<Connection>) -> bool {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(conversation_id).or_default();

        if members.iter().any(|c| c.session_id == conn.session_id) {
            return false;
        }
        members.push(Arc::clone(&conn));

        tracing::debug!(
            conversation_id = %conversation_id,
            session_id = %conn.session_id,
            room_size = members.len(),
            "Connection joined conversation room"
        );
        true
    }

    /// Remove a connection from a conversation room
    ///
    /// Returns false if the session was not in the room.
    pub async fn leave(&self, conversation_id: &ConversationId, session_id: &Uuid) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(conns) = rooms.get_mut(conversation_id) else {
            return false;
        };

        let before_len = conns.len();
        conns.retain(|c| c.session_id != *session_id);
        let removed = conns.len() < before_len;

        // Clean up empty rooms
        if conns.is_empty() {
            rooms.remove(conversation_id);
            tracing::debug!(
                conversation_id = %conversation_id,
                "Removed empty conversation room"
            );
        } else if removed {
            tracing::debug!(
                conversation_id = %conversation_id,
                session_id = %session_id,
                room_size = conns.len(),
                "Connection left conversation room"
            );
        }

        removed
    }

    /// Broadcast an event to all connections in a conversation room
    ///
    /// Returns the number of sessions the event was handed to. Send errors
    /// are ignored; closed connections are cleaned up on disconnect.
    pub async fn broadcast(&self, conversation_id: &ConversationId, event: ServerEvent) -> usize {
        self.broadcast_except(conversation_id, None, event).await
    }

    /// Broadcast to a room, skipping the session `exclude`
    pub async fn broadcast_except(
        &self,
        conversation_id: &ConversationId,
        exclude: Option<Uuid>,
        event: ServerEvent,
    ) -> usize {
        let rooms = self.rooms.read().await;
        let Some(conns) = rooms.get(conversation_id) else {
            tracing::debug!(
                conversation_id = %conversation_id,
                event = event.name(),
                "No room for conversation - no subscribers"
            );
            return 0;
        };

        let mut success_count = 0;
        let mut failed_count = 0;

        for conn in conns.iter().filter(|c| Some(c.session_id) != exclude) {
            match conn.send(event.clone()) {
                Ok(()) => success_count += 1,
                Err(_) => {
                    failed_count += 1;
                    tracing::warn!(
                        session_id = %conn.session_id,
                        "Failed to send event to connection (likely closed)"
                    );
                }
            }
        }

        tracing::debug!(
            conversation_id = %conversation_id,
            event = event.name(),
            recipients = success_count,
            failed = failed_count,
            "Broadcast event to conversation room"
        );

        success_count
    }

    /// Session ids currently in a room
    pub async fn members(&self, conversation_id: &ConversationId) -> Vec<Uuid> {
        let rooms = self.rooms.read().await;
        rooms
            .get(conversation_id)
            .map(|conns| conns.iter().map(|c| c.session_id).collect())
            .unwrap_or_default()
    }

    /// Remove a connection from all rooms
    pub async fn remove_connection(&self, session_id: &Uuid) {
        let mut rooms = self.rooms.write().await;
        let mut removed_from = 0;

        for conns in rooms.values_mut() {
            let before_len = conns.len();
            conns.retain(|c| c.session_id != *session_id);
            if conns.len() < before_len {
                removed_from += 1;
            }
        }

        // Clean up empty rooms
        rooms.retain(|_, conns| !conns.is_empty());

        if removed_from > 0 {
            tracing::debug!(
                session_id = %session_id,
                room_count = removed_from,
                "Removed connection from rooms"
            );
        }
    }

    /// Get room size (number of connections) for a conversation
    pub async fn get_room_size(&self, conversation_id: &ConversationId) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(conversation_id).map(|v| v.len()).unwrap_or(0)
    }

    /// Get total number of active rooms
    pub async fn get_room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}
