//! Typed listener registry
//!
//! UI code subscribes to session events by kind. Listeners are isolated from
//! each other: one returning an error or panicking is logged and the rest
//! still run.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use salonchat_shared::{ErrorPayload, MessagePayload, ServerEvent};

/// Everything a session can report to the UI
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Server(ServerEvent),
    /// The link ended without the client asking for it; rooms are not re-joined
    Disconnected { reason: String },
}

/// Listener subscription key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    Typing,
    Assigned,
    Closed,
    NewConversation,
    Updated,
    Error,
    Disconnected,
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Server(event) => match event {
                ServerEvent::NewMessage(_) => EventKind::Message,
                ServerEvent::Typing { .. } => EventKind::Typing,
                ServerEvent::Assigned { .. } => EventKind::Assigned,
                ServerEvent::Closed { .. } => EventKind::Closed,
                ServerEvent::NewConversation(_) => EventKind::NewConversation,
                ServerEvent::Updated(_) => EventKind::Updated,
                ServerEvent::Error(_) => EventKind::Error,
            },
            SessionEvent::Disconnected { .. } => EventKind::Disconnected,
        }
    }
}

pub type ListenerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type Listener = Arc<dyn Fn(&SessionEvent) -> ListenerResult + Send + Sync>;

/// Handle returned by [`ListenerRegistry::on`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct Inner {
    next_id: u64,
    listeners: HashMap<EventKind, Vec<(ListenerId, Listener)>>,
}

#[derive(Default)]
pub struct ListenerRegistry {
    inner: RwLock<Inner>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one kind of event
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&SessionEvent) -> ListenerResult + Send + Sync + 'static,
    {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.next_id += 1;
        let id = ListenerId(inner.next_id);
        inner
            .listeners
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Register a listener for persisted messages
    pub fn on_message<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&MessagePayload) -> ListenerResult + Send + Sync + 'static,
    {
        self.on(EventKind::Message, move |event| match event {
            SessionEvent::Server(ServerEvent::NewMessage(payload)) => listener(payload),
            _ => Ok(()),
        })
    }

    /// Register a listener for relay errors
    pub fn on_error<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ErrorPayload) -> ListenerResult + Send + Sync + 'static,
    {
        self.on(EventKind::Error, move |event| match event {
            SessionEvent::Server(ServerEvent::Error(payload)) => listener(payload),
            _ => Ok(()),
        })
    }

    /// Remove a listener; returns false if it was not registered
    pub fn off(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let mut removed = false;
        for listeners in inner.listeners.values_mut() {
            let before = listeners.len();
            listeners.retain(|(lid, _)| *lid != id);
            removed |= listeners.len() < before;
        }
        inner.listeners.retain(|_, listeners| !listeners.is_empty());
        removed
    }

    /// Run every listener for the event's kind, returning how many succeeded
    pub fn emit(&self, event: &SessionEvent) -> usize {
        let kind = event.kind();
        // Snapshot so listeners may call `on`/`off` without deadlocking
        let listeners: Vec<(ListenerId, Listener)> = {
            let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
            inner.listeners.get(&kind).cloned().unwrap_or_default()
        };

        let mut delivered = 0;
        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!(listener = id.0, ?kind, error = %e, "Support listener failed");
                }
                Err(_) => {
                    tracing::error!(listener = id.0, ?kind, "Support listener panicked");
                }
            }
        }
        delivered
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.listeners.get(&kind).map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use salonchat_shared::ConversationId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn closed() -> SessionEvent {
        SessionEvent::Server(ServerEvent::Closed {
            conversation_id: ConversationId::new(),
        })
    }

    #[test]
    fn test_multiple_listeners_per_kind() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            registry.on(EventKind::Closed, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        assert_eq!(registry.emit(&closed()), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Other kinds are not triggered
        assert_eq!(registry.listener_count(EventKind::Message), 0);
    }

    #[test]
    fn test_failing_listener_does_not_stop_others() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        registry.on(EventKind::Closed, |_| Err("render failed".into()));
        registry.on(EventKind::Closed, |_| panic!("listener bug"));
        {
            let calls = Arc::clone(&calls);
            registry.on(EventKind::Closed, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        assert_eq!(registry.emit(&closed()), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_removes_only_that_listener() {
        let registry = ListenerRegistry::new();
        let first = registry.on(EventKind::Closed, |_| Ok(()));
        registry.on(EventKind::Closed, |_| Ok(()));

        assert!(registry.off(first));
        assert!(!registry.off(first));
        assert_eq!(registry.listener_count(EventKind::Closed), 1);
    }

    #[test]
    fn test_listener_can_unsubscribe_itself() {
        let registry = Arc::new(ListenerRegistry::new());
        let slot: Arc<RwLock<Option<ListenerId>>> = Arc::new(RwLock::new(None));

        let id = {
            let registry_ref = Arc::downgrade(&registry);
            let slot = Arc::clone(&slot);
            registry.on(EventKind::Closed, move |_| {
                if let (Some(registry), Some(id)) = (registry_ref.upgrade(), *slot.read().unwrap()) {
                    registry.off(id);
                }
                Ok(())
            })
        };
        *slot.write().unwrap() = Some(id);

        registry.emit(&closed());
        assert_eq!(registry.listener_count(EventKind::Closed), 0);
    }

    #[test]
    fn test_typed_message_listener() {
        let registry = ListenerRegistry::new();
        let seen = Arc::new(RwLock::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            registry.on_message(move |payload| {
                seen.write().unwrap().push(payload.content.clone());
                Ok(())
            });
        }

        let payload = MessagePayload {
            id: salonchat_shared::MessageId::new(),
            conversation_id: ConversationId::new(),
            sender: "staff".into(),
            sender_name: "Mai".into(),
            content: "Your booking is confirmed".into(),
            created_at: time::OffsetDateTime::now_utc(),
            client_message_id: None,
        };
        registry.emit(&SessionEvent::Server(ServerEvent::NewMessage(payload)));

        assert_eq!(*seen.read().unwrap(), vec!["Your booking is confirmed".to_string()]);
    }
}
