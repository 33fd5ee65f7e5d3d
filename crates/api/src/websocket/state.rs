//! Global WebSocket state management
//!
//! Maintains global state for all WebSocket connections and rooms.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use salonchat_shared::{ConversationId, ServerEvent};

use super::connection::{Connection, SessionRole};
use super::room::RoomManager;

/// Global WebSocket state shared across all connections
#[derive(Clone)]
pub struct WebSocketState {
    /// All active connections indexed by session_id
    pub connections: Arc<RwLock<HashMap<Uuid, Arc<Connection>>>>,

    /// Room manager for conversation subscriptions
    pub rooms: Arc<RoomManager>,
}

impl WebSocketState {
    /// Create new WebSocket state
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            rooms: Arc::new(RoomManager::new()),
        }
    }

    /// Add a connection
    pub async fn add_connection(&self, conn: Connection) -> Arc<Connection> {
        let conn = Arc::new(conn);
        let mut connections = self.connections.write().await;
        connections.insert(conn.session_id, Arc::clone(&conn));

        tracing::info!(
            session_id = %conn.session_id,
            role = conn.role.as_str(),
            total_connections = connections.len(),
            "WebSocket connection added"
        );

        conn
    }

    /// Remove a connection and drop it from every room
    pub async fn remove_connection(&self, session_id: &Uuid) {
        let mut connections = self.connections.write().await;
        if let Some(conn) = connections.remove(session_id) {
            self.rooms.remove_connection(session_id).await;

            tracing::info!(
                session_id = %session_id,
                role = conn.role.as_str(),
                remaining_connections = connections.len(),
                "WebSocket connection removed"
            );
        }
    }

    /// Get all connections with the given role
    pub async fn get_role_connections(&self, role: SessionRole) -> Vec<Arc<Connection>> {
        let connections = self.connections.read().await;
        connections
            .values()
            .filter(|c| c.role == role)
            .cloned()
            .collect()
    }

    /// Send an event to every connected session, or only to sessions of
    /// `audience` when one is given
    pub async fn broadcast_all(&self, audience: Option<SessionRole>, event: ServerEvent) -> usize {
        let recipients = match audience {
            Some(role) => self.get_role_connections(role).await,
            None => self.connections.read().await.values().cloned().collect(),
        };
        recipients
            .iter()
            .filter(|conn| conn.send(event.clone()).is_ok())
            .count()
    }

    /// Send an event to every session that has not joined `conversation_id`,
    /// skipping `exclude` (the session that caused the event) and sessions
    /// outside `audience`
    pub async fn broadcast_outside_room(
        &self,
        conversation_id: &ConversationId,
        audience: Option<SessionRole>,
        exclude: Option<Uuid>,
        event: ServerEvent,
    ) -> usize {
        let members = self.rooms.members(conversation_id).await;
        let connections = self.connections.read().await;

        let mut delivered = 0;
        for conn in connections.values() {
            if Some(conn.session_id) == exclude
                || members.contains(&conn.session_id)
                || audience.is_some_and(|role| conn.role != role)
            {
                continue;
            }
            if conn.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }

        tracing::debug!(
            conversation_id = %conversation_id,
            event = event.name(),
            recipients = delivered,
            "Broadcast event outside conversation room"
        );

        delivered
    }

    /// Get total number of active connections
    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    /// Get statistics about the WebSocket state
    pub async fn get_stats(&self) -> WebSocketStats {
        let connection_count = self.connection_count().await;
        let room_count = self.rooms.get_room_count().await;

        WebSocketStats {
            active_connections: connection_count,
            active_rooms: room_count,
        }
    }
}

impl Default for WebSocketState {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about WebSocket connections
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketStats {
    /// Number of active connections
    pub active_connections: usize,
    /// Number of active conversation rooms
    pub active_rooms: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_add_and_remove_connection() {
        let state = WebSocketState::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let conn = Connection::new(SessionRole::Customer, tx);
        let session_id = conn.session_id;

        let added_conn = state.add_connection(conn).await;
        assert_eq!(state.connection_count().await, 1);
        assert_eq!(added_conn.role, SessionRole::Customer);

        state.remove_connection(&session_id).await;
        assert_eq!(state.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_connection_leaves_rooms() {
        let state = WebSocketState::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = state
            .add_connection(Connection::new(SessionRole::Staff, tx))
            .await;
        let conversation_id = ConversationId::new();

        state.rooms.join(conversation_id, Arc::clone(&conn)).await;
        state.remove_connection(&conn.session_id).await;

        assert_eq!(state.rooms.get_room_size(&conversation_id).await, 0);
    }

    #[tokio::test]
    async fn test_get_role_connections() {
        let state = WebSocketState::new();

        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let (tx3, _rx3) = mpsc::unbounded_channel();

        state.add_connection(Connection::new(SessionRole::Staff, tx1)).await;
        state.add_connection(Connection::new(SessionRole::Staff, tx2)).await;
        state.add_connection(Connection::new(SessionRole::Customer, tx3)).await;

        assert_eq!(state.get_role_connections(SessionRole::Staff).await.len(), 2);
    }

    #[tokio::test]
    async fn test_broadcast_outside_room() {
        let state = WebSocketState::new();
        let conversation_id = ConversationId::new();

        let (tx_in, mut rx_in) = mpsc::unbounded_channel();
        let (tx_out, mut rx_out) = mpsc::unbounded_channel();
        let (tx_origin, mut rx_origin) = mpsc::unbounded_channel();

        let inside = state.add_connection(Connection::new(SessionRole::Customer, tx_in)).await;
        state.add_connection(Connection::new(SessionRole::Staff, tx_out)).await;
        let origin = state
            .add_connection(Connection::new(SessionRole::Staff, tx_origin))
            .await;
        state.rooms.join(conversation_id, inside).await;

        let delivered = state
            .broadcast_outside_room(
                &conversation_id,
                None,
                Some(origin.session_id),
                ServerEvent::Closed { conversation_id },
            )
            .await;

        assert_eq!(delivered, 1);
        assert!(rx_out.try_recv().is_ok());
        assert!(rx_in.try_recv().is_err());
        assert!(rx_origin.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_to_staff_audience() {
        let state = WebSocketState::new();
        let conversation_id = ConversationId::new();

        let (tx_staff, mut rx_staff) = mpsc::unbounded_channel();
        let (tx_customer, mut rx_customer) = mpsc::unbounded_channel();
        state.add_connection(Connection::new(SessionRole::Staff, tx_staff)).await;
        state.add_connection(Connection::new(SessionRole::Customer, tx_customer)).await;

        let event = ServerEvent::Closed { conversation_id };
        assert_eq!(state.broadcast_all(Some(SessionRole::Staff), event.clone()).await, 1);
        assert_eq!(
            state
                .broadcast_outside_room(&conversation_id, Some(SessionRole::Staff), None, event.clone())
                .await,
            1
        );
        assert_eq!(rx_staff.len(), 2);
        assert!(rx_customer.try_recv().is_err());

        // No audience: everyone
        assert_eq!(state.broadcast_all(None, event).await, 2);
        assert!(rx_customer.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_stats() {
        let state = WebSocketState::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        state.add_connection(Connection::new(SessionRole::Customer, tx)).await;

        let stats = state.get_stats().await;
        assert_eq!(stats.active_connections, 1);
        assert_eq!(stats.active_rooms, 0);
    }
}
