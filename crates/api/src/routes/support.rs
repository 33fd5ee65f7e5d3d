//! Support conversation routes
//!
//! REST surface for the salon web widget and staff console. Mutations that
//! other sessions must see (messages, assignment, closing, new
//! conversations) go through the relay so they are broadcast exactly like
//! their WebSocket counterparts.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use salonchat_shared::{
    Conversation, ConversationFilter, ConversationId, ConversationPatch, ConversationStats,
    ConversationWithMessages, Message, NewConversation, SuggestionsResponse,
};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
    websocket::{Origin, SendRequest, SessionRole},
};

/// Header carrying the customer's conversation access token
pub const CONVERSATION_TOKEN_HEADER: &str = "x-conversation-token";

// =============================================================================
// Caller identification
// =============================================================================

/// Role of an HTTP caller
///
/// A bearer staff token identifies staff. Anyone else is a customer who may
/// present a conversation access token. With room access enforcement off
/// every caller is treated as staff.
#[derive(Debug, Clone)]
pub struct Caller {
    pub role: SessionRole,
    conversation_token: Option<String>,
}

impl Caller {
    fn require_staff(&self) -> ApiResult<()> {
        match self.role {
            SessionRole::Staff => Ok(()),
            SessionRole::Customer => Err(ApiError::Forbidden),
        }
    }

    fn authorize(&self, state: &AppState, id: ConversationId) -> ApiResult<()> {
        state
            .access
            .authorize_conversation(self.role, id, self.conversation_token.as_deref())
            .map_err(ApiError::from)
    }

    fn origin(&self) -> Origin {
        Origin::http(self.role)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let conversation_token = parts
            .headers
            .get(CONVERSATION_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bearer = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        let role = match bearer {
            Some(token) if state.access.verify_staff_token(token) => SessionRole::Staff,
            Some(_) if state.access.is_enforced() => {
                tracing::warn!("Rejected request with invalid staff token");
                return Err(ApiError::Unauthorized);
            }
            _ if !state.access.is_enforced() => SessionRole::Staff,
            _ => SessionRole::Customer,
        };

        Ok(Self {
            role,
            conversation_token,
        })
    }
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationResponse {
    #[serde(flatten)]
    pub conversation: Conversation,
    /// Token the customer presents to join the conversation room
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    pub staff_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub conversation_id: ConversationId,
    pub content: String,
    pub sender: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub client_message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<ConversationId>,
}

#[derive(Debug, Serialize)]
pub struct BulkDeleteResponse {
    pub deleted: u64,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionQuery {
    #[serde(default)]
    pub language: Option<String>,
}

// =============================================================================
// Conversation Endpoints
// =============================================================================

/// List conversations for the staff console
pub async fn list_conversations(
    State(state): State<AppState>,
    caller: Caller,
    Query(filter): Query<ConversationFilter>,
) -> ApiResult<Json<Vec<Conversation>>> {
    caller.require_staff()?;
    let conversations = state.store.list_conversations(&filter).await?;
    Ok(Json(conversations))
}

/// Open a conversation from the customer widget
pub async fn create_conversation(
    State(state): State<AppState>,
    Json(input): Json<NewConversation>,
) -> ApiResult<(StatusCode, Json<CreateConversationResponse>)> {
    let (conversation, access_token) = state.relay.open_conversation(input).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateConversationResponse {
            conversation,
            access_token,
        }),
    ))
}

/// Get a conversation with its full message history
pub async fn get_conversation(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ConversationId>,
) -> ApiResult<Json<ConversationWithMessages>> {
    caller.authorize(&state, id)?;

    let conversation = state.store.get_conversation(id).await?;
    let messages = state.store.list_messages(id).await?;

    Ok(Json(ConversationWithMessages {
        conversation,
        messages,
    }))
}

/// Update customer name/email
pub async fn update_conversation(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ConversationId>,
    Json(patch): Json<ConversationPatch>,
) -> ApiResult<Json<Conversation>> {
    caller.authorize(&state, id)?;
    let conversation = state.store.update_conversation(id, patch).await?;
    Ok(Json(conversation))
}

pub async fn assign_conversation(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ConversationId>,
    Json(req): Json<AssignRequest>,
) -> ApiResult<Json<Conversation>> {
    caller.require_staff()?;
    let conversation = state.relay.assign(caller.origin(), id, &req.staff_id).await?;
    Ok(Json(conversation))
}

pub async fn close_conversation(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ConversationId>,
) -> ApiResult<Json<Conversation>> {
    caller.authorize(&state, id)?;
    let conversation = state.relay.close(caller.origin(), id).await?;
    Ok(Json(conversation))
}

/// Reset the unread counter
pub async fn mark_read(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ConversationId>,
) -> ApiResult<Json<Conversation>> {
    caller.require_staff()?;
    let conversation = state.store.mark_read(id).await?;
    Ok(Json(conversation))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ConversationId>,
) -> ApiResult<StatusCode> {
    caller.require_staff()?;
    state.store.delete_conversation(id).await?;

    tracing::info!(conversation_id = %id, "Support conversation deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn bulk_delete_conversations(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<BulkDeleteRequest>,
) -> ApiResult<Json<BulkDeleteResponse>> {
    caller.require_staff()?;
    if req.ids.is_empty() {
        return Err(ApiError::Validation("No conversation ids given".to_string()));
    }

    let deleted = state.store.bulk_delete_conversations(&req.ids).await?;

    tracing::info!(
        requested = req.ids.len(),
        deleted,
        "Support conversations bulk deleted"
    );

    Ok(Json(BulkDeleteResponse { deleted }))
}

// =============================================================================
// Message Endpoints
// =============================================================================

pub async fn list_messages(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ConversationId>,
) -> ApiResult<Json<Vec<Message>>> {
    caller.authorize(&state, id)?;
    let messages = state.store.list_messages(id).await?;
    Ok(Json(messages))
}

/// Send a message over HTTP (fallback when the socket is unavailable)
pub async fn send_message(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    caller.authorize(&state, req.conversation_id)?;

    let message = state
        .relay
        .send(
            caller.origin(),
            SendRequest {
                conversation_id: req.conversation_id,
                content: req.content,
                sender: req.sender,
                sender_name: req.sender_name,
                client_message_id: req.client_message_id,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

// =============================================================================
// Staff Tools
// =============================================================================

/// AI reply suggestions for a conversation
pub async fn ai_suggestions(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<ConversationId>,
    Query(query): Query<SuggestionQuery>,
) -> ApiResult<Json<SuggestionsResponse>> {
    caller.require_staff()?;
    let upstream = state
        .suggestions
        .as_ref()
        .ok_or(ApiError::ServiceUnavailable)?;

    let conversation = state.store.get_conversation(id).await?;
    let messages = state.store.list_messages(id).await?;
    let suggestions = upstream
        .suggest(&conversation, &messages, query.language.as_deref())
        .await?;

    Ok(Json(SuggestionsResponse { suggestions }))
}

pub async fn statistics(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Json<ConversationStats>> {
    caller.require_staff()?;
    let stats = state.store.statistics().await?;
    Ok(Json(stats))
}
