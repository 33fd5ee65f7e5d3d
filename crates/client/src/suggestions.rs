//! AI suggestion gateway for the staff console
//!
//! One GET per request, never retried. Failures degrade to an empty list and
//! a notice the console shows instead of the suggestion panel.

use reqwest::Client;

use salonchat_shared::{ConversationId, Suggestion, SuggestionsResponse};

use crate::config::ClientConfig;

/// Shown when suggestions cannot be loaded
pub const SUGGESTIONS_UNAVAILABLE: &str = "AI suggestions are unavailable right now";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuggestionOutcome {
    pub suggestions: Vec<Suggestion>,
    /// User-visible notice when the request failed
    pub notice: Option<String>,
}

impl SuggestionOutcome {
    fn unavailable() -> Self {
        Self {
            suggestions: Vec::new(),
            notice: Some(SUGGESTIONS_UNAVAILABLE.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct SuggestionGateway {
    client: Client,
    api_url: String,
    token: Option<String>,
}

impl SuggestionGateway {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client: Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }

    pub async fn get_suggestions(
        &self,
        conversation_id: ConversationId,
        language: Option<&str>,
    ) -> SuggestionOutcome {
        let url = format!(
            "{}/support/conversations/{}/ai-suggestions",
            self.api_url, conversation_id
        );

        let mut request = self.client.get(&url);
        if let Some(language) = language {
            request = request.query(&[("language", language)]);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    status = %resp.status(),
                    "AI suggestions request failed"
                );
                return SuggestionOutcome::unavailable();
            }
            Err(e) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "AI suggestions request failed"
                );
                return SuggestionOutcome::unavailable();
            }
        };

        match response.json::<SuggestionsResponse>().await {
            Ok(body) => SuggestionOutcome {
                suggestions: body.suggestions.into_iter().map(Suggestion::normalized).collect(),
                notice: None,
            },
            Err(e) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "Failed to parse AI suggestions"
                );
                SuggestionOutcome::unavailable()
            }
        }
    }
}
