//! AI reply suggestion upstream
//!
//! Staff ask for suggested replies for a conversation. The server sends the
//! conversation snapshot to the configured suggestion service and returns
//! its proposals with confidence clamped into `[0, 1]`.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{error, warn};

use salonchat_shared::{Conversation, ConversationId, Message, Suggestion};

use crate::error::ApiError;

/// Client for the suggestion service
#[derive(Clone)]
pub struct SuggestionUpstream {
    client: Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SuggestionRequest<'a> {
    conversation_id: ConversationId,
    customer_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    messages: Vec<SnapshotMessage<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotMessage<'a> {
    sender: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sender_name: Option<&'a str>,
    content: &'a str,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

/// The service may answer with a bare list or wrap it
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SuggestionReply {
    Wrapped { suggestions: Vec<Suggestion> },
    Bare(Vec<Suggestion>),
}

impl SuggestionReply {
    fn into_suggestions(self) -> Vec<Suggestion> {
        match self {
            SuggestionReply::Wrapped { suggestions } | SuggestionReply::Bare(suggestions) => {
                suggestions
            }
        }
    }
}

impl SuggestionUpstream {
    pub fn new(url: String, api_key: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url,
            api_key,
        })
    }

    /// Create from config, returns None if no upstream URL is set
    pub fn from_config(
        url: Option<String>,
        api_key: Option<String>,
        timeout_ms: u64,
    ) -> Result<Option<Self>, reqwest::Error> {
        match url {
            Some(url) if !url.is_empty() => Ok(Some(Self::new(
                url,
                api_key.filter(|k| !k.is_empty()),
                Duration::from_millis(timeout_ms),
            )?)),
            _ => {
                warn!("AI suggestion service not configured - suggestions endpoint disabled");
                Ok(None)
            }
        }
    }

    /// Request reply suggestions for a conversation snapshot
    pub async fn suggest(
        &self,
        conversation: &Conversation,
        messages: &[Message],
        language: Option<&str>,
    ) -> Result<Vec<Suggestion>, ApiError> {
        let request = SuggestionRequest {
            conversation_id: conversation.id,
            customer_name: &conversation.customer_name,
            language,
            messages: messages
                .iter()
                .map(|m| SnapshotMessage {
                    sender: m.sender.as_wire(),
                    sender_name: m.sender_name.as_deref(),
                    content: &m.content,
                    created_at: m.created_at,
                })
                .collect(),
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            error!(conversation_id = %conversation.id, error = %e, "Failed to call suggestion service");
            ApiError::Upstream(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                conversation_id = %conversation.id,
                status = %status,
                body = %body,
                "Suggestion service returned error status"
            );
            return Err(ApiError::Upstream(format!("status {status}")));
        }

        let reply: SuggestionReply = response.json().await.map_err(|e| {
            error!(conversation_id = %conversation.id, error = %e, "Failed to parse suggestion response");
            ApiError::Upstream(e.to_string())
        })?;

        Ok(reply
            .into_suggestions()
            .into_iter()
            .map(Suggestion::normalized)
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use salonchat_shared::{ConversationStatus, MessageId, MessageSender};

    fn conversation() -> Conversation {
        let now = OffsetDateTime::now_utc();
        Conversation {
            id: ConversationId::new(),
            customer_name: "Lan Pham".into(),
            customer_email: None,
            status: ConversationStatus::Active,
            assigned_staff_id: Some("staff-1".into()),
            last_message: Some("Do you have openings Friday?".into()),
            unread_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn messages(conversation: &Conversation) -> Vec<Message> {
        vec![Message {
            id: MessageId::new(),
            conversation_id: conversation.id,
            sender: MessageSender::Customer,
            sender_name: Some("Lan".into()),
            content: "Do you have openings Friday?".into(),
            created_at: OffsetDateTime::now_utc(),
        }]
    }

    fn upstream(url: String, key: Option<&str>) -> SuggestionUpstream {
        SuggestionUpstream::new(url, key.map(str::to_string), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_suggest_clamps_confidence() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/suggest")
            .match_header("authorization", "Bearer secret-key")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"customerName":"Lan Pham","language":"vi"}"#.into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"suggestions":[
                    {"id":"s1","content":"Yes, 2pm is free","confidence":1.4,"reasoning":"calendar"},
                    {"id":"s2","content":"Let me check","confidence":-0.2,"reasoning":"fallback"}
                ]}"#,
            )
            .create_async()
            .await;

        let conversation = conversation();
        let suggestions = upstream(format!("{}/suggest", server.url()), Some("secret-key"))
            .suggest(&conversation, &messages(&conversation), Some("vi"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].confidence, 1.0);
        assert_eq!(suggestions[1].confidence, 0.0);
    }

    #[tokio::test]
    async fn test_suggest_accepts_bare_list() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"[{"id":"s1","content":"Hello!","confidence":0.8,"reasoning":"greeting"}]"#)
            .create_async()
            .await;

        let conversation = conversation();
        let suggestions = upstream(format!("{}/", server.url()), None)
            .suggest(&conversation, &[], None)
            .await
            .unwrap();

        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].content, "Hello!");
    }

    #[tokio::test]
    async fn test_upstream_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let conversation = conversation();
        let result = upstream(format!("{}/", server.url()), None)
            .suggest(&conversation, &[], None)
            .await;

        assert!(matches!(result, Err(ApiError::Upstream(_))));
    }

    #[test]
    fn test_from_config_without_url() {
        assert!(SuggestionUpstream::from_config(None, None, 1000).unwrap().is_none());
        assert!(SuggestionUpstream::from_config(Some(String::new()), None, 1000)
            .unwrap()
            .is_none());
    }
}
