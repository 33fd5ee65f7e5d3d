//! WebSocket handler for Axum
//!
//! Handles WebSocket connections, session roles and event routing.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use salonchat_shared::{ClientEvent, ServerEvent};

use super::{
    connection::{Connection, SessionRole},
    relay::report_error,
};
use crate::error::RelayError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    /// `customer` (default) or `staff`
    #[serde(default)]
    role: Option<String>,
    /// Staff token, required for staff sessions when room access is enforced
    #[serde(default)]
    token: Option<String>,
}

/// WebSocket handler - upgrades HTTP connection to WebSocket
///
/// The session role is fixed here for the lifetime of the socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
) -> Result<Response, StatusCode> {
    let requested_staff = match params.role.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("customer") => false,
        Some("staff") => true,
        Some(other) => {
            tracing::warn!(role = other, "WebSocket upgrade with unknown role");
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    let Some(role) = app_state
        .access
        .resolve_role(requested_staff, params.token.as_deref())
    else {
        tracing::warn!("WebSocket auth failed: invalid staff token");
        return Err(StatusCode::UNAUTHORIZED);
    };

    tracing::info!(role = role.as_str(), "WebSocket connection upgrade requested");

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, role, app_state)))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, role: SessionRole, app_state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for sending events to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let ws_state = app_state.ws_state.clone();
    let conn = ws_state.add_connection(Connection::new(role, tx)).await;
    let session_id = conn.session_id;

    // Spawn task to send events to client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
    });

    // Handle incoming messages
    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = ?e, "WebSocket receive error");
                break;
            }
        };

        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    app_state.relay.dispatch(&conn, event).await;
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        error = ?e,
                        "Failed to parse client event"
                    );
                    report_error(
                        &conn,
                        &RelayError::InvalidEvent(e.to_string()),
                        None,
                        None,
                        None,
                    );
                }
            },
            Message::Close(_) => {
                tracing::info!(session_id = %session_id, "WebSocket close frame received");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Axum handles ping/pong automatically
            }
            Message::Binary(_) => {
                report_error(
                    &conn,
                    &RelayError::InvalidEvent("binary frames are not supported".to_string()),
                    None,
                    None,
                    None,
                );
            }
        }
    }

    // Cleanup on disconnect
    tracing::info!(session_id = %session_id, role = role.as_str(), "WebSocket connection closing");
    ws_state.remove_connection(&session_id).await;

    send_task.abort();
}
