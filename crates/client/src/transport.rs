//! Socket transport
//!
//! A transport opens one duplex [`Link`] to the relay. Reconnection with a
//! bounded number of attempts is the transport's job: when the socket drops
//! mid-session it is re-dialed behind the same link, and the link only ends
//! once every attempt failed. Rooms are not re-joined on a new socket.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_retry::{strategy::FixedInterval, Retry};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use salonchat_shared::{ClientEvent, ServerEvent};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An established connection
///
/// Dropping `outbound` closes the socket. `inbound` yields `None` once the
/// socket has closed for good.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<ClientEvent>,
    pub inbound: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Link {
    /// Create a link from raw channel halves
    pub fn new(
        outbound: mpsc::UnboundedSender<ClientEvent>,
        inbound: mpsc::UnboundedReceiver<ServerEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self) -> ClientResult<Link>;
}

/// WebSocket transport speaking JSON text frames
pub struct WsTransport {
    config: ClientConfig,
}

impl WsTransport {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

/// Dial `endpoint`, trying `attempts` times with `delay` between tries
async fn dial(endpoint: &str, attempts: usize, delay: Duration) -> ClientResult<Socket> {
    let strategy = FixedInterval::new(delay).take(attempts.saturating_sub(1));

    let (socket, _response) = Retry::spawn(strategy, move || async move {
        connect_async(endpoint).await.map_err(|e| {
            warn!(error = %e, "Support socket connect attempt failed");
            e
        })
    })
    .await
    .map_err(|e| ClientError::Transport(e.to_string()))?;

    Ok(socket)
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self) -> ClientResult<Link> {
        let endpoint = self.config.endpoint()?.to_string();
        let socket = dial(
            &endpoint,
            self.config.reconnection_attempts,
            self.config.reconnection_delay,
        )
        .await?;

        debug!(url = %self.config.url, "Support socket connected");

        let (out_tx, out_rx) = mpsc::unbounded_channel::<ClientEvent>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<ServerEvent>();

        tokio::spawn(supervise(self.config.clone(), endpoint, socket, out_rx, in_tx));

        Ok(Link::new(out_tx, in_rx))
    }
}

/// Why [`pump`] stopped
enum LinkEnd {
    /// The session dropped its side of the link
    Released,
    /// The socket went away underneath us
    Dropped,
}

/// Own the socket for the lifetime of a link, re-dialing after drops
async fn supervise(
    config: ClientConfig,
    endpoint: String,
    mut socket: Socket,
    mut out_rx: mpsc::UnboundedReceiver<ClientEvent>,
    in_tx: mpsc::UnboundedSender<ServerEvent>,
) {
    loop {
        match pump(&mut socket, &mut out_rx, &in_tx).await {
            LinkEnd::Released => {
                let _ = socket.close(None).await;
                return;
            }
            LinkEnd::Dropped => {
                warn!(url = %config.url, "Support socket dropped, reconnecting");
                tokio::time::sleep(config.reconnection_delay).await;

                match dial(&endpoint, config.reconnection_attempts, config.reconnection_delay).await {
                    Ok(fresh) => {
                        info!(url = %config.url, "Support socket reconnected");
                        socket = fresh;
                    }
                    Err(e) => {
                        warn!(
                            url = %config.url,
                            attempts = config.reconnection_attempts,
                            error = %e,
                            "Support socket reconnection gave up"
                        );
                        // Dropping `in_tx` ends the link
                        return;
                    }
                }
            }
        }
    }
}

/// Shuttle frames between one socket and the link channels
async fn pump(
    socket: &mut Socket,
    out_rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
    in_tx: &mpsc::UnboundedSender<ServerEvent>,
) -> LinkEnd {
    loop {
        tokio::select! {
            outgoing = out_rx.recv() => match outgoing {
                Some(event) => match serde_json::to_string(&event) {
                    Ok(json) => {
                        if socket.send(WsMessage::Text(json)).await.is_err() {
                            return LinkEnd::Dropped;
                        }
                    }
                    Err(e) => {
                        error!(error = ?e, "Failed to serialize client event");
                    }
                },
                None => return LinkEnd::Released,
            },
            incoming = socket.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => {
                        if in_tx.send(event).is_err() {
                            return LinkEnd::Released;
                        }
                    }
                    Err(e) => {
                        warn!(error = ?e, "Failed to parse server event");
                    }
                },
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(?frame, "Support socket closed by server");
                    return LinkEnd::Dropped;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "Support socket read failed");
                    return LinkEnd::Dropped;
                }
                None => return LinkEnd::Dropped,
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use salonchat_shared::ConversationId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    fn config(addr: std::net::SocketAddr, attempts: usize) -> ClientConfig {
        ClientConfig {
            url: format!("ws://{addr}/ws"),
            reconnection_attempts: attempts,
            reconnection_delay: Duration::from_millis(10),
            ..ClientConfig::default()
        }
    }

    async fn recv(inbound: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Option<ServerEvent> {
        tokio::time::timeout(Duration::from_secs(5), inbound.recv())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_configured_attempts() {
        // Accepts TCP and hangs up before the WebSocket handshake
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        {
            let accepted = Arc::clone(&accepted);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    accepted.fetch_add(1, Ordering::SeqCst);
                    drop(stream);
                }
            });
        }

        let result = WsTransport::new(config(addr, 3)).connect().await;

        assert!(matches!(result, Err(ClientError::Transport(_))));
        assert_eq!(accepted.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_link_survives_a_dropped_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ids = [ConversationId::new(), ConversationId::new()];

        // Each socket delivers one event and then vanishes without a close
        // handshake; after two sockets the listener is gone.
        tokio::spawn(async move {
            for conversation_id in ids {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let event = serde_json::to_string(&ServerEvent::Closed { conversation_id }).unwrap();
                ws.send(WsMessage::Text(event)).await.unwrap();
            }
        });

        let Link {
            outbound: _outbound,
            mut inbound,
        } = WsTransport::new(config(addr, 2)).connect().await.unwrap();

        for conversation_id in ids {
            assert_eq!(recv(&mut inbound).await, Some(ServerEvent::Closed { conversation_id }));
        }

        // Reconnection is refused: the link ends once attempts run out
        assert_eq!(recv(&mut inbound).await, None);
    }

    #[tokio::test]
    async fn test_released_link_closes_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let mut frames = Vec::new();
            while let Some(Ok(frame)) = ws.next().await {
                frames.push(frame);
            }
            frames
        });

        let link = WsTransport::new(config(addr, 1)).connect().await.unwrap();
        let conversation_id = ConversationId::new();
        link.outbound.send(ClientEvent::Leave { conversation_id }).unwrap();
        drop(link);

        let frames = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        match frames.first() {
            Some(WsMessage::Text(text)) => {
                let event: ClientEvent = serde_json::from_str(text).unwrap();
                assert_eq!(event, ClientEvent::Leave { conversation_id });
            }
            other => panic!("unexpected frame {other:?}"),
        }
        assert!(matches!(frames.last(), Some(WsMessage::Close(_))));
    }
}
