//! Salon support chat shared types and utilities
//!
//! This crate contains the conversation data model, the realtime wire
//! protocol and the persistence contract shared by the relay server and
//! client sessions.

pub mod db;
pub mod error;
pub mod events;
pub mod store;
pub mod types;

pub use db::*;
pub use error::*;
pub use events::{ClientEvent, ConversationSummary, ErrorPayload, MessagePayload, ServerEvent};
pub use store::{ConversationStore, MemoryConversationStore, PgConversationStore};
pub use types::*;
