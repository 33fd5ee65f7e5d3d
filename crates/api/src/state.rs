//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;

use salonchat_shared::{ConversationStore, MemoryConversationStore, PgConversationStore};

use crate::access::RoomAccess;
use crate::config::{Config, StoreBackend};
use crate::suggestions::SuggestionUpstream;
use crate::websocket::{SupportRelay, WebSocketState};

/// State handed to every axum handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Present only with the Postgres store
    pub pool: Option<PgPool>,
    pub store: Arc<dyn ConversationStore>,
    pub ws_state: WebSocketState,
    pub relay: Arc<SupportRelay>,
    pub access: RoomAccess,
    pub suggestions: Option<SuggestionUpstream>,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Postgres store selected but no pool was provided")]
    MissingPool,
    #[error("Invalid access secret")]
    AccessSecret,
    #[error("Failed to build suggestion client: {0}")]
    Suggestions(#[from] reqwest::Error),
}

impl AppState {
    /// Wire the store, rooms and relay together for `config`
    pub fn new(config: Config, pool: Option<PgPool>) -> Result<Self, StateError> {
        let store: Arc<dyn ConversationStore> = match config.store_backend {
            StoreBackend::Postgres => {
                let pool = pool.clone().ok_or(StateError::MissingPool)?;
                Arc::new(PgConversationStore::new(pool))
            }
            StoreBackend::Memory => Arc::new(MemoryConversationStore::new()),
        };

        Self::with_store(config, pool, store)
    }

    /// Build state around an existing store
    pub fn with_store(
        config: Config,
        pool: Option<PgPool>,
        store: Arc<dyn ConversationStore>,
    ) -> Result<Self, StateError> {
        let access = RoomAccess::new(
            &config.access_secret,
            &config.staff_token,
            config.enforce_room_access,
        )
        .map_err(|_| StateError::AccessSecret)?;

        let suggestions = SuggestionUpstream::from_config(
            config.ai_suggestions_url.clone(),
            config.ai_suggestions_api_key.clone(),
            config.ai_suggestions_timeout_ms,
        )?;

        let ws_state = WebSocketState::new();
        let relay = Arc::new(SupportRelay::new(
            Arc::clone(&store),
            ws_state.clone(),
            access.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            pool,
            store,
            ws_state,
            relay,
            access,
            suggestions,
        })
    }
}
