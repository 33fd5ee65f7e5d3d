//! Conversation and message types shared by the relay, the REST surface and clients

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Conversation ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ConversationId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConversationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Message ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Lifecycle state of a support conversation
///
/// Transitions only move forward: `PENDING -> ACTIVE -> CLOSED`, or
/// `PENDING -> CLOSED` when the customer leaves before anyone picks it up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ConversationStatus {
    Pending,
    Active,
    Closed,
}

impl Default for ConversationStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Closed => "CLOSED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Whether moving from `self` to `next` is a legal forward transition
    pub fn can_transition_to(&self, next: ConversationStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active) | (Self::Pending, Self::Closed) | (Self::Active, Self::Closed)
        )
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "ACTIVE" => Ok(Self::Active),
            "CLOSED" => Ok(Self::Closed),
            other => Err(format!("unknown conversation status: {other}")),
        }
    }
}

/// Author role of a message
///
/// Stored and returned over REST in upper case; the realtime wire format
/// uses the lower-case [`MessageSender::as_wire`] spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageSender {
    Customer,
    Staff,
    Ai,
}

impl MessageSender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "CUSTOMER",
            Self::Staff => "STAFF",
            Self::Ai => "AI",
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Staff => "staff",
            Self::Ai => "ai",
        }
    }

    /// Parse a role in either spelling ("customer" or "CUSTOMER")
    pub fn parse_role(role: &str) -> Option<Self> {
        match role.trim().to_ascii_lowercase().as_str() {
            "customer" => Some(Self::Customer),
            "staff" => Some(Self::Staff),
            "ai" => Some(Self::Ai),
            _ => None,
        }
    }
}

impl fmt::Display for MessageSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Records
// =============================================================================

/// A support conversation between a customer and staff/AI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub customer_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    pub status: ConversationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_staff_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    pub unread_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A single message inside a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: MessageSender,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Conversation together with its full message history
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationWithMessages {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

// =============================================================================
// Inputs
// =============================================================================

/// Input for opening a new conversation
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConversation {
    pub customer_name: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub initial_message: Option<String>,
}

/// Input for persisting a message
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender: MessageSender,
    pub sender_name: Option<String>,
    pub content: String,
}

/// Partial update of the customer-facing conversation fields
///
/// Empty strings are ignored, matching how the widget submits untouched fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPatch {
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
}

impl ConversationPatch {
    pub fn customer_name(&self) -> Option<&str> {
        self.customer_name.as_deref().filter(|s| !s.trim().is_empty())
    }

    pub fn customer_email(&self) -> Option<&str> {
        self.customer_email.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// Filters for listing conversations in the staff console
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationFilter {
    pub status: Option<ConversationStatus>,
    pub assigned_staff_id: Option<String>,
    pub search: Option<String>,
}

impl ConversationFilter {
    pub fn matches(&self, conversation: &Conversation) -> bool {
        if let Some(status) = self.status {
            if conversation.status != status {
                return false;
            }
        }

        if let Some(staff_id) = &self.assigned_staff_id {
            if conversation.assigned_staff_id.as_deref() != Some(staff_id.as_str()) {
                return false;
            }
        }

        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            let in_name = conversation.customer_name.to_lowercase().contains(&needle);
            let in_email = conversation
                .customer_email
                .as_deref()
                .map(|e| e.to_lowercase().contains(&needle))
                .unwrap_or(false);
            if !in_name && !in_email {
                return false;
            }
        }

        true
    }
}

/// Conversation counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationStats {
    pub total: i64,
    pub pending: i64,
    pub active: i64,
    pub closed: i64,
}

/// AI-generated reply suggestion for staff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: String,
    pub content: String,
    /// Model confidence in `[0, 1]`
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

impl Suggestion {
    /// Clamp confidence into `[0, 1]`, mapping NaN to 0
    pub fn normalized(mut self) -> Self {
        self.confidence = if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        };
        self
    }
}

/// Body returned by the suggestions endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<Suggestion>,
}

/// Placeholder shown in conversation lists before any message arrives
pub const DEFAULT_LAST_MESSAGE: &str = "New conversation";

/// Display name used when a sender does not provide one
pub const ANONYMOUS_SENDER: &str = "Anonymous";

/// Length of the `lastMessage` preview pushed to conversation lists
pub const LAST_MESSAGE_PREVIEW_CHARS: usize = 100;

/// Truncate content to the list preview length on a char boundary
pub fn preview(content: &str) -> String {
    content.chars().take(LAST_MESSAGE_PREVIEW_CHARS).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_only_move_forward() {
        use ConversationStatus::*;

        assert!(Pending.can_transition_to(Active));
        assert!(Pending.can_transition_to(Closed));
        assert!(Active.can_transition_to(Closed));

        assert!(!Active.can_transition_to(Pending));
        assert!(!Closed.can_transition_to(Active));
        assert!(!Closed.can_transition_to(Pending));
        assert!(!Closed.can_transition_to(Closed));
        assert!(Closed.is_terminal());
    }

    #[test]
    fn test_sender_role_parsing() {
        assert_eq!(MessageSender::parse_role("customer"), Some(MessageSender::Customer));
        assert_eq!(MessageSender::parse_role("STAFF"), Some(MessageSender::Staff));
        assert_eq!(MessageSender::parse_role(" ai "), Some(MessageSender::Ai));
        assert_eq!(MessageSender::parse_role("robot"), None);
        assert_eq!(MessageSender::Ai.as_wire(), "ai");
    }

    #[test]
    fn test_conversation_serializes_camel_case() {
        let now = OffsetDateTime::now_utc();
        let conversation = Conversation {
            id: ConversationId::new(),
            customer_name: "Linh".to_string(),
            customer_email: None,
            status: ConversationStatus::Pending,
            assigned_staff_id: None,
            last_message: Some("Hello".to_string()),
            unread_count: 1,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&conversation).unwrap();
        assert_eq!(json["customerName"], "Linh");
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["unreadCount"], 1);
        assert!(json.get("customerEmail").is_none());
    }

    #[test]
    fn test_filter_search_is_case_insensitive() {
        let now = OffsetDateTime::now_utc();
        let conversation = Conversation {
            id: ConversationId::new(),
            customer_name: "Mai Tran".to_string(),
            customer_email: Some("mai@example.com".to_string()),
            status: ConversationStatus::Active,
            assigned_staff_id: Some("staff-1".to_string()),
            last_message: None,
            unread_count: 0,
            created_at: now,
            updated_at: now,
        };

        let by_name = ConversationFilter {
            search: Some("TRAN".to_string()),
            ..Default::default()
        };
        assert!(by_name.matches(&conversation));

        let by_email = ConversationFilter {
            search: Some("example.com".to_string()),
            ..Default::default()
        };
        assert!(by_email.matches(&conversation));

        let wrong_staff = ConversationFilter {
            assigned_staff_id: Some("staff-2".to_string()),
            ..Default::default()
        };
        assert!(!wrong_staff.matches(&conversation));

        let wrong_status = ConversationFilter {
            status: Some(ConversationStatus::Closed),
            ..Default::default()
        };
        assert!(!wrong_status.matches(&conversation));
    }

    #[test]
    fn test_suggestion_confidence_is_clamped() {
        let high = Suggestion {
            id: "s1".into(),
            content: "We have openings at 3pm".into(),
            confidence: 1.7,
            reasoning: String::new(),
        };
        assert_eq!(high.normalized().confidence, 1.0);

        let nan = Suggestion {
            id: "s2".into(),
            content: "x".into(),
            confidence: f64::NAN,
            reasoning: String::new(),
        };
        assert_eq!(nan.normalized().confidence, 0.0);
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(150);
        assert_eq!(preview(&long).chars().count(), LAST_MESSAGE_PREVIEW_CHARS);
        assert_eq!(preview("short"), "short");
    }
}
