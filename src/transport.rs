//! Transports carry raw text between a [`Session`](crate::session::Session)
//! and whatever sits at the relay endpoint.
//!
//! A transport is opened fire-and-forget: [`Transport::open`] returns
//! immediately with a pair of channels and does its work on its own task.
//! Lifecycle and data arrive on `events` in delivery order; text pushed into
//! `outbound` is written to the wire as-is.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, warn};

/// Something the transport observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Data(String),
    Failed(String),
    Closed,
}

/// The session's side of an opened transport.
#[derive(Debug)]
pub struct TransportHandle {
    pub outbound: mpsc::UnboundedSender<String>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

pub trait Transport: Send + Sync {
    /// Issue a connect request to `endpoint`. Must not block.
    fn open(&self, endpoint: &Uri) -> TransportHandle;
}

// ---------------------------------------------------------------------------
// WebSocket transport
// ---------------------------------------------------------------------------

/// Production transport: one tokio-tungstenite client connection per open.
#[derive(Debug, Default, Clone)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, endpoint: &Uri) -> TransportHandle {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_websocket(endpoint.clone(), outbound_rx, events_tx));
        TransportHandle {
            outbound: outbound_tx,
            events: events_rx,
        }
    }
}

async fn run_websocket(
    endpoint: Uri,
    mut outbound: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let ws = match tokio_tungstenite::connect_async(endpoint.clone()).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            let _ = events.send(TransportEvent::Failed(e.to_string()));
            return;
        }
    };
    debug!(%endpoint, "websocket open");
    let _ = events.send(TransportEvent::Opened);

    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            frame = stream.next() => {
                let event = match frame {
                    Some(Ok(WsMessage::Text(text))) => TransportEvent::Data(text),
                    Some(Ok(WsMessage::Binary(bytes))) => {
                        TransportEvent::Data(String::from_utf8_lossy(&bytes).into_owned())
                    }
                    Some(Ok(WsMessage::Close(_))) | None => TransportEvent::Closed,
                    Some(Ok(_)) => continue, // ping / pong
                    Some(Err(e)) => TransportEvent::Failed(e.to_string()),
                };
                let done = matches!(event, TransportEvent::Closed | TransportEvent::Failed(_));
                if events.send(event).is_err() || done {
                    break;
                }
            }
            text = outbound.recv() => {
                match text {
                    Some(text) => {
                        if let Err(e) = sink.send(WsMessage::Text(text)).await {
                            warn!(%endpoint, error = %e, "websocket write failed");
                            let _ = events.send(TransportEvent::Failed(e.to_string()));
                            break;
                        }
                    }
                    // Session went away.
                    None => {
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// In-process transport
// ---------------------------------------------------------------------------

/// Transport whose far end lives in the same process.
///
/// Every `open` hands a [`RemoteEnd`] to whoever holds the receiver returned
/// by [`ChannelTransport::new`]; the remote end decides when the connection
/// opens, what data arrives and whether it fails. Used to drive sessions
/// deterministically and to embed the client without a network.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    remotes: mpsc::UnboundedSender<RemoteEnd>,
    opens: Arc<AtomicUsize>,
}

impl ChannelTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                remotes: tx,
                opens: Arc::new(AtomicUsize::new(0)),
            },
            rx,
        )
    }

    /// Number of connect requests issued so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl Transport for ChannelTransport {
    fn open(&self, endpoint: &Uri) -> TransportHandle {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let _ = self.remotes.send(RemoteEnd {
            endpoint: endpoint.clone(),
            events: events_tx,
            sent: outbound_rx,
        });
        TransportHandle {
            outbound: outbound_tx,
            events: events_rx,
        }
    }
}

/// The far side of a [`ChannelTransport`] connection.
#[derive(Debug)]
pub struct RemoteEnd {
    endpoint: Uri,
    events: mpsc::UnboundedSender<TransportEvent>,
    sent: mpsc::UnboundedReceiver<String>,
}

impl RemoteEnd {
    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    pub fn open(&self) {
        let _ = self.events.send(TransportEvent::Opened);
    }

    pub fn deliver(&self, text: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Data(text.into()));
    }

    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Failed(reason.into()));
    }

    pub fn close(&self) {
        let _ = self.events.send(TransportEvent::Closed);
    }

    /// Wait for the next text the session wrote.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.sent.recv().await
    }

    /// Text the session wrote that has not been read yet, without waiting.
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(text) = self.sent.try_recv() {
            out.push(text);
        }
        out
    }
}
