//! WebSocket connection management
//!
//! Represents one connected client session with its room subscriptions.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use salonchat_shared::{ConversationId, ServerEvent};

/// Who is on the other end of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    /// Customer chat widget
    Customer,
    /// Staff support console
    Staff,
}

impl SessionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionRole::Customer => "customer",
            SessionRole::Staff => "staff",
        }
    }
}

/// Represents an active WebSocket connection
#[derive(Debug)]
pub struct Connection {
    /// Unique session ID for this connection
    pub session_id: Uuid,

    pub role: SessionRole,

    /// Channel to send events to this connection
    pub sender: mpsc::UnboundedSender<ServerEvent>,

    /// Conversations this connection has joined
    pub subscriptions: Arc<RwLock<HashSet<ConversationId>>>,
}

impl Connection {
    /// Create a new connection
    pub fn new(role: SessionRole, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            role,
            sender,
            subscriptions: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Send an event to this connection
    ///
    /// Returns Err if the connection is closed
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }

    /// Record a joined conversation; returns false if it was already joined
    pub async fn subscribe(&self, conversation_id: ConversationId) -> bool {
        let mut subs = self.subscriptions.write().await;
        subs.insert(conversation_id)
    }

    /// Forget a joined conversation; returns false if it was not joined
    pub async fn unsubscribe(&self, conversation_id: ConversationId) -> bool {
        let mut subs = self.subscriptions.write().await;
        subs.remove(&conversation_id)
    }

    pub async fn is_subscribed(&self, conversation_id: &ConversationId) -> bool {
        let subs = self.subscriptions.read().await;
        subs.contains(conversation_id)
    }
}
