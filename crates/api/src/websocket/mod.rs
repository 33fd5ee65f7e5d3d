//! WebSocket support for live support chat
//!
//! Provides the realtime side of salon support conversations:
//! - Conversation rooms (who receives which conversation's events)
//! - Message relay (persist, then broadcast)
//! - Typing indicators
//! - Assignment and closing notifications
//!
//! # Architecture
//!
//! - **Connection**: One socket session with its role and joined rooms
//! - **Room**: Conversation-based pub/sub for broadcasting events
//! - **State**: Global WebSocket state shared across all connections
//! - **Relay**: Applies client operations against the conversation store
//! - **Handler**: Axum WebSocket route handler
//!
//! Event types live in `salonchat_shared::events` so the client crate
//! speaks the same protocol.

pub mod connection;
pub mod handler;
pub mod locks;
pub mod relay;
pub mod room;
pub mod state;

pub use connection::{Connection, SessionRole};
pub use handler::ws_handler;
pub use relay::{Origin, SendRequest, SupportRelay};
pub use state::WebSocketState;
