//! Client session wrapper
//!
//! [`SupportClient`] is built once per process and shared through an `Arc`.
//! Concurrent `connect` calls share one in-flight attempt, so the transport
//! is dialed exactly once. When the transport gives up on the link the
//! session reports [`SessionEvent::Disconnected`]; it does not re-join rooms
//! on its own.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::mpsc;

use salonchat_shared::{ClientEvent, ConversationId, MessageSender, ServerEvent};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::listeners::{EventKind, ListenerId, ListenerRegistry, ListenerResult, SessionEvent};
use crate::transport::{Link, Transport, WsTransport};

type ConnectAttempt = Shared<BoxFuture<'static, ClientResult<()>>>;

#[derive(Default)]
struct SessionState {
    outbound: Option<mpsc::UnboundedSender<ClientEvent>>,
    pending: Option<ConnectAttempt>,
    current_conversation: Option<ConversationId>,
    /// Bumped per link so a stale reader cannot tear down a newer link
    generation: u64,
}

pub struct SupportClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    listeners: ListenerRegistry,
    state: Mutex<SessionState>,
}

impl SupportClient {
    /// Client speaking WebSocket to `config.url`
    pub fn new(config: ClientConfig) -> Arc<Self> {
        let transport = Arc::new(WsTransport::new(config.clone()));
        Self::with_transport(config, transport)
    }

    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            config,
            transport,
            listeners: ListenerRegistry::new(),
            state: Mutex::new(SessionState::default()),
        })
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Connect to the relay
    ///
    /// Returns immediately when already connected. Fails with
    /// [`ClientError::Timeout`] after `connect_timeout`.
    pub async fn connect(self: &Arc<Self>) -> ClientResult<()> {
        let attempt = {
            let mut state = self.state();
            if state.outbound.as_ref().is_some_and(|tx| !tx.is_closed()) {
                return Ok(());
            }
            match &state.pending {
                Some(attempt) => attempt.clone(),
                None => {
                    let started = state.generation;
                    let attempt = Arc::clone(self).establish(started).boxed().shared();
                    state.pending = Some(attempt.clone());
                    attempt
                }
            }
        };

        attempt.await
    }

    /// Dial the transport for the attempt started at `started`
    ///
    /// A `disconnect` while dialing bumps the generation; the new link is then
    /// dropped instead of installed.
    async fn establish(self: Arc<Self>, started: u64) -> ClientResult<()> {
        let result = tokio::time::timeout(self.config.connect_timeout, self.transport.connect()).await;

        let link = {
            let mut state = self.state();
            if state.generation != started {
                tracing::debug!(url = %self.config.url, "Discarding link opened after disconnect");
                return Err(ClientError::NotConnected);
            }
            state.pending = None;
            match result {
                Err(_) => {
                    tracing::warn!(
                        url = %self.config.url,
                        timeout_ms = self.config.connect_timeout.as_millis() as u64,
                        "Support connection timed out"
                    );
                    return Err(ClientError::Timeout);
                }
                Ok(Err(e)) => {
                    tracing::warn!(url = %self.config.url, error = %e, "Support connection failed");
                    return Err(e);
                }
                Ok(Ok(Link { outbound, inbound })) => {
                    state.generation += 1;
                    state.outbound = Some(outbound);
                    (inbound, state.generation)
                }
            }
        };

        let (inbound, generation) = link;
        tokio::spawn(read_events(Arc::downgrade(&self), inbound, generation));

        tracing::info!(url = %self.config.url, role = self.config.role.as_str(), "Support session connected");
        Ok(())
    }

    /// Drop the link and forget the current conversation
    pub fn disconnect(&self) {
        let mut state = self.state();
        if let Some(conversation_id) = state.current_conversation.take() {
            if let Some(tx) = &state.outbound {
                let _ = tx.send(ClientEvent::Leave { conversation_id });
            }
        }
        state.outbound = None;
        state.pending = None;
        // The reader of the old link must not report this as a disconnect
        state.generation += 1;

        tracing::info!("Support session disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.state()
            .outbound
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    pub fn current_conversation(&self) -> Option<ConversationId> {
        self.state().current_conversation
    }

    fn emit(&self, event: ClientEvent) -> ClientResult<()> {
        let state = self.state();
        let tx = state.outbound.as_ref().ok_or(ClientError::NotConnected)?;
        tx.send(event).map_err(|_| ClientError::NotConnected)
    }

    /// Join a conversation room; customers pass the access token from creation
    pub fn join_conversation(
        &self,
        conversation_id: ConversationId,
        access_token: Option<String>,
    ) -> ClientResult<()> {
        self.emit(ClientEvent::Join {
            conversation_id,
            access_token,
        })?;
        self.state().current_conversation = Some(conversation_id);
        tracing::debug!(conversation_id = %conversation_id, "Joined conversation");
        Ok(())
    }

    pub fn leave_conversation(&self, conversation_id: ConversationId) -> ClientResult<()> {
        self.emit(ClientEvent::Leave { conversation_id })?;
        let mut state = self.state();
        if state.current_conversation == Some(conversation_id) {
            state.current_conversation = None;
        }
        Ok(())
    }

    /// Send a message, returning the correlation id echoed on `message:new`
    pub fn send_message(
        &self,
        conversation_id: ConversationId,
        content: &str,
        sender: MessageSender,
        sender_name: Option<String>,
    ) -> ClientResult<String> {
        let client_message_id = uuid::Uuid::new_v4().to_string();
        self.emit(ClientEvent::Send {
            conversation_id,
            content: content.to_string(),
            sender: sender.as_wire().to_string(),
            sender_name,
            client_message_id: Some(client_message_id.clone()),
        })?;
        Ok(client_message_id)
    }

    pub fn send_typing(&self, conversation_id: ConversationId, is_typing: bool) -> ClientResult<()> {
        self.emit(ClientEvent::Typing {
            conversation_id,
            is_typing,
        })
    }

    pub fn assign_conversation(&self, conversation_id: ConversationId, staff_id: &str) -> ClientResult<()> {
        self.emit(ClientEvent::Assign {
            conversation_id,
            staff_id: staff_id.to_string(),
        })
    }

    pub fn close_conversation(&self, conversation_id: ConversationId) -> ClientResult<()> {
        self.emit(ClientEvent::Close { conversation_id })
    }

    /// Register a listener for one kind of session event
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&SessionEvent) -> ListenerResult + Send + Sync + 'static,
    {
        self.listeners.on(kind, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.listeners.off(id)
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Mark the link of `generation` as gone; false if a newer link replaced it
    fn link_lost(&self, generation: u64) -> bool {
        let mut state = self.state();
        if state.generation != generation {
            return false;
        }
        state.outbound = None;
        true
    }
}

async fn read_events(
    client: Weak<SupportClient>,
    mut inbound: mpsc::UnboundedReceiver<ServerEvent>,
    generation: u64,
) {
    while let Some(event) = inbound.recv().await {
        let Some(client) = client.upgrade() else {
            return;
        };
        client.listeners.emit(&SessionEvent::Server(event));
    }

    if let Some(client) = client.upgrade() {
        if client.link_lost(generation) {
            tracing::warn!("Support session lost its connection");
            client.listeners.emit(&SessionEvent::Disconnected {
                reason: "transport closed".to_string(),
            });
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

    /// Transport backed by in-process channels
    struct MockTransport {
        connects: AtomicUsize,
        delay: Duration,
        fail: bool,
        server: Mutex<Option<(UnboundedReceiver<ClientEvent>, UnboundedSender<ServerEvent>)>>,
    }

    impl MockTransport {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                connects: AtomicUsize::new(0),
                delay,
                fail: false,
                server: Mutex::new(None),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                connects: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail: true,
                server: Mutex::new(None),
            })
        }

        fn server_end(&self) -> (UnboundedReceiver<ClientEvent>, UnboundedSender<ServerEvent>) {
            self.server.lock().unwrap().take().unwrap()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn connect(&self) -> ClientResult<Link> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(ClientError::Transport("refused".into()));
            }
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            *self.server.lock().unwrap() = Some((out_rx, in_tx));
            Ok(Link::new(out_tx, in_rx))
        }
    }

    fn config(timeout: Duration) -> ClientConfig {
        ClientConfig {
            connect_timeout: timeout,
            ..ClientConfig::default()
        }
    }

    #[tokio::test]
    async fn test_concurrent_connects_share_one_attempt() {
        let transport = MockTransport::new(Duration::from_millis(50));
        let client = SupportClient::with_transport(config(Duration::from_secs(1)), transport.clone());

        let (a, b) = tokio::join!(client.connect(), client.connect());
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);

        // Already connected: no new dial
        client.connect().await.unwrap();
        assert_eq!(transport.connects.load(Ordering::SeqCst), 1);
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_connect_times_out() {
        let transport = MockTransport::new(Duration::from_secs(5));
        let client = SupportClient::with_transport(config(Duration::from_millis(20)), transport);

        assert_eq!(client.connect().await, Err(ClientError::Timeout));
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_failed_connect_can_be_retried() {
        let transport = MockTransport::failing();
        let client = SupportClient::with_transport(config(Duration::from_secs(1)), transport.clone());

        assert!(matches!(client.connect().await, Err(ClientError::Transport(_))));
        assert!(client.connect().await.is_err());
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let client = SupportClient::with_transport(
            config(Duration::from_secs(1)),
            MockTransport::new(Duration::ZERO),
        );
        let id = ConversationId::new();

        assert_eq!(client.join_conversation(id, None), Err(ClientError::NotConnected));
        assert_eq!(
            client.send_message(id, "Hi", MessageSender::Customer, None),
            Err(ClientError::NotConnected)
        );
        assert_eq!(client.send_typing(id, true), Err(ClientError::NotConnected));
        assert_eq!(client.assign_conversation(id, "staff-1"), Err(ClientError::NotConnected));
        assert_eq!(client.close_conversation(id), Err(ClientError::NotConnected));
    }

    #[tokio::test]
    async fn test_wrappers_emit_events() {
        let transport = MockTransport::new(Duration::ZERO);
        let client = SupportClient::with_transport(config(Duration::from_secs(1)), transport.clone());
        client.connect().await.unwrap();
        let (mut from_client, _to_client) = transport.server_end();
        let id = ConversationId::new();

        client.join_conversation(id, Some("token".into())).unwrap();
        assert_eq!(client.current_conversation(), Some(id));
        let client_message_id = client
            .send_message(id, "Hello", MessageSender::Customer, Some("Lan".into()))
            .unwrap();

        assert!(matches!(from_client.recv().await, Some(ClientEvent::Join { .. })));
        match from_client.recv().await {
            Some(ClientEvent::Send {
                sender,
                client_message_id: Some(sent_id),
                ..
            }) => {
                assert_eq!(sender, "customer");
                assert_eq!(sent_id, client_message_id);
            }
            other => panic!("unexpected event {other:?}"),
        }

        client.leave_conversation(id).unwrap();
        assert_eq!(client.current_conversation(), None);
    }

    #[tokio::test]
    async fn test_server_events_reach_listeners() {
        let transport = MockTransport::new(Duration::ZERO);
        let client = SupportClient::with_transport(config(Duration::from_secs(1)), transport.clone());
        client.connect().await.unwrap();
        let (_from_client, to_client) = transport.server_end();

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        client.on(EventKind::Closed, move |event| {
            seen_tx.send(event.clone()).map_err(|e| e.to_string().into())
        });

        let conversation_id = ConversationId::new();
        to_client.send(ServerEvent::Closed { conversation_id }).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, SessionEvent::Server(ServerEvent::Closed { conversation_id }));
    }

    #[tokio::test]
    async fn test_lost_link_reports_disconnected() {
        let transport = MockTransport::new(Duration::ZERO);
        let client = SupportClient::with_transport(config(Duration::from_secs(1)), transport.clone());
        client.connect().await.unwrap();

        let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();
        client.on(EventKind::Disconnected, move |_| {
            notify_tx.send(()).map_err(|e| e.to_string().into())
        });

        // Server side goes away
        drop(transport.server_end());

        tokio::time::timeout(Duration::from_secs(1), notify_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(!client.is_connected());

        // A fresh connect dials again
        client.connect().await.unwrap();
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disconnect_during_connect_wins() {
        let transport = MockTransport::new(Duration::from_millis(50));
        let client = SupportClient::with_transport(config(Duration::from_secs(1)), transport.clone());

        let connecting = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.connect().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        client.disconnect();

        assert_eq!(connecting.await.unwrap(), Err(ClientError::NotConnected));
        assert!(!client.is_connected());

        // The discarded link was closed from the client side
        let (mut from_client, _to_client) = transport.server_end();
        assert!(from_client.recv().await.is_none());

        // A later connect dials again and sticks
        client.connect().await.unwrap();
        assert!(client.is_connected());
        assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_explicit_disconnect_is_silent() {
        let transport = MockTransport::new(Duration::ZERO);
        let client = SupportClient::with_transport(config(Duration::from_secs(1)), transport.clone());
        client.connect().await.unwrap();
        let id = ConversationId::new();
        client.join_conversation(id, None).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = Arc::clone(&calls);
            client.on(EventKind::Disconnected, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        client.disconnect();
        drop(transport.server_end());
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!client.is_connected());
        assert_eq!(client.current_conversation(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
