//! API routes

pub mod health;
pub mod support;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{state::AppState, websocket::ws_handler};

/// CORS for the salon web app; falls back to any origin if the configured
/// origin is not a valid header value
fn cors_layer(frontend_url: &str) -> CorsLayer {
    let origin = match HeaderValue::from_str(frontend_url) {
        Ok(value) => AllowOrigin::exact(value),
        Err(_) => {
            tracing::warn!(frontend_url, "Invalid FRONTEND_URL, allowing any origin");
            AllowOrigin::any()
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::HeaderName::from_static(support::CONVERSATION_TOKEN_HEADER),
        ])
}

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Support conversation routes - under /api/v1/support
    let support_routes = Router::new()
        .route(
            "/conversations",
            get(support::list_conversations).post(support::create_conversation),
        )
        .route(
            "/conversations/bulk-delete",
            post(support::bulk_delete_conversations),
        )
        .route(
            "/conversations/:id",
            get(support::get_conversation)
                .patch(support::update_conversation)
                .delete(support::delete_conversation),
        )
        .route("/conversations/:id/assign", post(support::assign_conversation))
        .route("/conversations/:id/close", post(support::close_conversation))
        .route("/conversations/:id/read", post(support::mark_read))
        .route("/conversations/:id/messages", get(support::list_messages))
        .route("/conversations/:id/ai-suggestions", get(support::ai_suggestions))
        .route("/messages", post(support::send_message))
        .route("/statistics", get(support::statistics));

    // WebSocket route (role and staff token checked in handler via query parameters)
    let websocket_routes = Router::new().route("/ws", get(ws_handler));

    let cors = cors_layer(&state.config.frontend_url);

    Router::new()
        .merge(health_routes)
        .merge(websocket_routes)
        .nest("/api/v1/support", support_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB; chat payloads are small
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}
