//! Salon support chat API Library
//!
//! This crate contains the relay server for live support conversations:
//! REST routes, the WebSocket relay and room access control.

pub mod access;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod suggestions;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult, RelayError, RelayResult};
pub use state::AppState;
