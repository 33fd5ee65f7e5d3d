//! Conversation timeline with optimistic sends
//!
//! Messages typed locally are shown right away as pending entries tagged
//! with their correlation id. The relay echoes that id on `message:new`, at
//! which point the pending entry is replaced by the persisted message, or on
//! an `error` event, at which point it is marked failed.
//!
//! Incoming messages without a correlation id (history from another device,
//! older relays) fall back to a heuristic: same content and sender within a
//! short window count as one message.

use std::time::Duration;

use time::OffsetDateTime;

use salonchat_shared::{ConversationId, ErrorPayload, Message, MessageId, MessagePayload};

/// Window for the content/sender heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupWindow(pub Duration);

impl DedupWindow {
    /// Customer chat widget
    pub const WIDGET: DedupWindow = DedupWindow(Duration::from_secs(1));
    /// Staff support console
    pub const CONSOLE: DedupWindow = DedupWindow(Duration::from_secs(2));

    fn contains(&self, a: OffsetDateTime, b: OffsetDateTime) -> bool {
        (a - b).unsigned_abs() <= self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Sent locally, not yet confirmed by the relay
    Pending,
    Confirmed,
    /// The relay reported an error for this send
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub message_id: Option<MessageId>,
    pub client_message_id: Option<String>,
    /// Lower-case sender role
    pub sender: String,
    pub sender_name: Option<String>,
    pub content: String,
    pub created_at: OffsetDateTime,
    pub state: EntryState,
}

/// What [`Timeline::apply`] did with an incoming message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A pending entry was confirmed
    Confirmed,
    /// A new entry was appended
    Inserted,
    /// The message is already displayed
    Duplicate,
    /// The message belongs to another conversation
    Ignored,
}

#[derive(Debug, Clone)]
pub struct Timeline {
    conversation_id: ConversationId,
    window: DedupWindow,
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    pub fn new(conversation_id: ConversationId, window: DedupWindow) -> Self {
        Self {
            conversation_id,
            window,
            entries: Vec::new(),
        }
    }

    /// Seed with history loaded over REST
    pub fn with_history(conversation_id: ConversationId, window: DedupWindow, messages: &[Message]) -> Self {
        let mut timeline = Self::new(conversation_id, window);
        for message in messages {
            timeline.apply(&MessagePayload::from_message(message, None));
        }
        timeline
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Show a locally sent message before the relay confirms it
    pub fn push_pending(
        &mut self,
        client_message_id: String,
        sender: &str,
        sender_name: Option<String>,
        content: &str,
    ) {
        self.entries.push(TimelineEntry {
            message_id: None,
            client_message_id: Some(client_message_id),
            sender: sender.to_string(),
            sender_name,
            content: content.to_string(),
            created_at: OffsetDateTime::now_utc(),
            state: EntryState::Pending,
        });
    }

    /// Merge a `message:new` payload into the timeline
    pub fn apply(&mut self, payload: &MessagePayload) -> Applied {
        if payload.conversation_id != self.conversation_id {
            return Applied::Ignored;
        }

        if self.entries.iter().any(|e| e.message_id == Some(payload.id)) {
            return Applied::Duplicate;
        }

        if let Some(client_id) = payload.client_message_id.as_deref() {
            if let Some(entry) = self
                .entries
                .iter_mut()
                .find(|e| e.client_message_id.as_deref() == Some(client_id) && e.message_id.is_none())
            {
                entry.message_id = Some(payload.id);
                entry.sender_name = Some(payload.sender_name.clone());
                entry.content = payload.content.clone();
                entry.created_at = payload.created_at;
                entry.state = EntryState::Confirmed;
                return Applied::Confirmed;
            }
        } else if self.entries.iter().any(|e| {
            e.content == payload.content
                && e.sender == payload.sender
                && self.window.contains(e.created_at, payload.created_at)
        }) {
            return Applied::Duplicate;
        }

        self.entries.push(TimelineEntry {
            message_id: Some(payload.id),
            client_message_id: payload.client_message_id.clone(),
            sender: payload.sender.clone(),
            sender_name: Some(payload.sender_name.clone()),
            content: payload.content.clone(),
            created_at: payload.created_at,
            state: EntryState::Confirmed,
        });
        Applied::Inserted
    }

    /// Mark the pending entry named by an `error` event as failed
    pub fn fail_pending(&mut self, error: &ErrorPayload) -> bool {
        let Some(client_id) = error.client_message_id.as_deref() else {
            return false;
        };
        match self
            .entries
            .iter_mut()
            .find(|e| e.state == EntryState::Pending && e.client_message_id.as_deref() == Some(client_id))
        {
            Some(entry) => {
                entry.state = EntryState::Failed;
                true
            }
            None => false,
        }
    }
}
