//! # Connection Manager
//!
//! A [`Session`] owns the single transport connection of a mounted view.
//!
//! ## Responsibility
//! - Issue at most one connect request per session (`connect` is idempotent).
//! - Turn transport events into [`TranscriptLine`]s, in delivery order, for
//!   exactly one subscriber.
//! - Gate `send` on the `Open` state.
//!
//! ## State machine
//! ```text
//! Unconnected --connect--> Connecting --opened--> Open --data--> Open
//!                               |                  |
//!                               +-----failed-------+--> Errored (terminal)
//!                                                  +--closed--> Closed (terminal)
//! ```
//!
//! Events are applied by one pump task per session, so the state and the
//! emitted lines always reflect the order the transport delivered them.
//! Errors are reported to the [`ErrorSink`] exactly once, before the state
//! settles into `Errored`. Nothing is retried.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::http::Uri;
use tracing::{debug, info, warn};

use crate::error::{MuninnError, Result};
use crate::transcript::{TranscriptLine, CONNECTED_NOTICE};
use crate::transport::{Transport, TransportEvent};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Unconnected,
    Connecting,
    Open,
    Errored,
    Closed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Errored | SessionState::Closed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Unconnected => "unconnected",
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Errored => "errored",
            SessionState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

/// Outcome of applying one transport event to a state.
#[derive(Debug, PartialEq, Eq)]
pub struct Step {
    pub next: SessionState,
    pub line: Option<TranscriptLine>,
    /// Reason to report as a [`MuninnError::ConnectFailure`].
    pub failure: Option<String>,
}

/// Pure transition function of the session state machine.
pub fn step(state: SessionState, event: TransportEvent) -> Step {
    use SessionState::*;

    let stay = |state| Step {
        next: state,
        line: None,
        failure: None,
    };

    match (state, event) {
        (Connecting, TransportEvent::Opened) => Step {
            next: Open,
            line: Some(TranscriptLine::system(CONNECTED_NOTICE)),
            failure: None,
        },
        (Open, TransportEvent::Data(text)) => Step {
            next: Open,
            line: Some(TranscriptLine::inbound(text)),
            failure: None,
        },
        (Connecting | Open, TransportEvent::Failed(reason)) => Step {
            next: Errored,
            line: None,
            failure: Some(reason),
        },
        (Connecting, TransportEvent::Closed) => Step {
            next: Errored,
            line: None,
            failure: Some("closed before open".into()),
        },
        (Open, TransportEvent::Closed) => stay(Closed),
        (state, event) => {
            debug!(%state, ?event, "dropping transport event");
            stay(state)
        }
    }
}

// ---------------------------------------------------------------------------
// Observability sink
// ---------------------------------------------------------------------------

/// Where transport errors are reported.
pub trait ErrorSink: Send + Sync {
    fn report(&self, endpoint: &Uri, error: &MuninnError);
}

/// Reports through `tracing` at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, endpoint: &Uri, error: &MuninnError) {
        warn!(%endpoint, %error, "session transport error");
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    endpoint: Uri,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn ErrorSink>,
    state_tx: Option<watch::Sender<SessionState>>,
    state_rx: watch::Receiver<SessionState>,
    lines_tx: Option<mpsc::UnboundedSender<TranscriptLine>>,
    lines_rx: Option<mpsc::UnboundedReceiver<TranscriptLine>>,
    /// Present once connected; never replaced.
    outbound: Option<mpsc::UnboundedSender<String>>,
    pump: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(endpoint: Uri, transport: Arc<dyn Transport>, sink: Arc<dyn ErrorSink>) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::Unconnected);
        let (lines_tx, lines_rx) = mpsc::unbounded_channel();
        Self {
            endpoint,
            transport,
            sink,
            state_tx: Some(state_tx),
            state_rx,
            lines_tx: Some(lines_tx),
            lines_rx: Some(lines_rx),
            outbound: None,
            pump: None,
        }
    }

    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Hand out the single observer channel.
    ///
    /// Lines produced before subscription are buffered in order.
    pub fn subscribe(&mut self) -> Result<mpsc::UnboundedReceiver<TranscriptLine>> {
        self.lines_rx.take().ok_or(MuninnError::AlreadySubscribed)
    }

    /// Issue the connect request. Returns `false` without doing anything if
    /// this session already holds a transport handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&mut self) -> bool {
        if self.outbound.is_some() {
            debug!(endpoint = %self.endpoint, "connect ignored; session already holds a transport");
            return false;
        }
        let (Some(state_tx), Some(lines_tx)) = (self.state_tx.take(), self.lines_tx.take()) else {
            return false;
        };

        info!(endpoint = %self.endpoint, "connecting");
        state_tx.send_replace(SessionState::Connecting);
        let handle = self.transport.open(&self.endpoint);
        self.outbound = Some(handle.outbound);
        self.pump = Some(tokio::spawn(pump(
            self.endpoint.clone(),
            handle.events,
            state_tx,
            lines_tx,
            Arc::clone(&self.sink),
        )));
        true
    }

    /// Write `text` to the transport verbatim. Only valid while `Open`.
    ///
    /// If the transport task has already exited, this returns `ConnectFailure`
    /// while [`Session::state`] may still read `Open`; the state turns
    /// `Errored` once the pump applies the transport's failure event.
    pub fn send(&self, text: &str) -> Result<()> {
        let state = self.state();
        if state != SessionState::Open {
            debug!(%state, "send rejected");
            return Err(MuninnError::SendWhileNotOpen { state });
        }
        let outbound = self
            .outbound
            .as_ref()
            .ok_or(MuninnError::SendWhileNotOpen { state })?;
        outbound
            .send(text.to_string())
            .map_err(|_| MuninnError::ConnectFailure("transport task has exited".into()))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

async fn pump(
    endpoint: Uri,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    state: watch::Sender<SessionState>,
    lines: mpsc::UnboundedSender<TranscriptLine>,
    sink: Arc<dyn ErrorSink>,
) {
    while let Some(event) = events.recv().await {
        let current = *state.borrow();
        let Step {
            next,
            line,
            failure,
        } = step(current, event);

        if let Some(reason) = failure {
            sink.report(&endpoint, &MuninnError::ConnectFailure(reason));
        }
        if next != current {
            info!(%endpoint, from = %current, to = %next, "session state");
            state.send_replace(next);
        }
        if let Some(line) = line {
            // Subscriber gone means the view was torn down; keep the state
            // machine honest anyway.
            let _ = lines.send(line);
        }
        if next.is_terminal() {
            return;
        }
    }

    // Transport task ended without a final event.
    let current = *state.borrow();
    let next = match current {
        SessionState::Open => SessionState::Closed,
        _ => {
            sink.report(
                &endpoint,
                &MuninnError::ConnectFailure("transport ended before open".into()),
            );
            SessionState::Errored
        }
    };
    info!(%endpoint, from = %current, to = %next, "session state");
    state.send_replace(next);
}
