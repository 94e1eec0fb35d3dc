//! # Transcript & Input Controller
//!
//! [`Console`] is the controller object of one mounted view. It lazily owns
//! the view's [`Session`], owns the [`Transcript`] and the input buffer, and
//! bridges the two directions:
//!
//! - session lines → [`Console::on_event`] → transcript → [`Renderer::refresh`]
//! - input buffer → [`Console::on_submit`] → `Session::send` → buffer cleared
//!
//! The owning view calls [`Console::start`] and [`Console::stop`] once each;
//! `start` is idempotent so a view that re-runs its setup never opens a second
//! connection.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::http::Uri;
use tracing::debug;

use crate::error::{MuninnError, Result};
use crate::session::{ErrorSink, Session, SessionState};
use crate::transcript::{Transcript, TranscriptLine};
use crate::transport::Transport;

/// Presentation side of the console: told to redraw after every append.
pub trait Renderer: Send {
    fn refresh(&mut self, transcript: &Transcript);
}

/// Renderer that draws nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn refresh(&mut self, _transcript: &Transcript) {}
}

pub struct Console {
    endpoint: Uri,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn ErrorSink>,
    renderer: Box<dyn Renderer>,
    session: Option<Session>,
    lines: Option<mpsc::UnboundedReceiver<TranscriptLine>>,
    transcript: Transcript,
    input: String,
}

impl Console {
    pub fn new(
        endpoint: Uri,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn ErrorSink>,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        Self {
            endpoint,
            transport,
            sink,
            renderer,
            session: None,
            lines: None,
            transcript: Transcript::new(),
            input: String::new(),
        }
    }

    /// Mount hook: create the session, subscribe to it and connect.
    ///
    /// Returns `Ok(false)` if this console already has a session.
    pub fn start(&mut self) -> Result<bool> {
        if self.session.is_some() {
            debug!(endpoint = %self.endpoint, "start ignored; session exists");
            return Ok(false);
        }
        let mut session = Session::new(
            self.endpoint.clone(),
            Arc::clone(&self.transport),
            Arc::clone(&self.sink),
        );
        self.lines = Some(session.subscribe()?);
        session.connect();
        self.session = Some(session);
        Ok(true)
    }

    /// Unmount hook: stop consuming session lines.
    ///
    /// The session itself stays held so a later `start` remains a no-op.
    pub fn stop(&mut self) {
        self.lines = None;
    }

    pub fn session_state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(Session::state)
            .unwrap_or(SessionState::Unconnected)
    }

    /// Append a line and refresh the display.
    pub fn on_event(&mut self, line: TranscriptLine) {
        self.transcript.append(line);
        self.renderer.refresh(&self.transcript);
    }

    /// Forward the input buffer verbatim, then clear it.
    ///
    /// Exactly one send per call. The buffer is cleared after the send
    /// returns, whether or not it succeeded.
    pub fn on_submit(&mut self) -> Result<()> {
        let result = match &self.session {
            Some(session) => session.send(&self.input),
            None => Err(MuninnError::SendWhileNotOpen {
                state: SessionState::Unconnected,
            }),
        };
        self.input.clear();
        result
    }

    /// Wait for the next line from the session.
    ///
    /// `None` once the session can produce no more lines or the console was
    /// stopped.
    pub async fn next_event(&mut self) -> Option<TranscriptLine> {
        match self.lines.as_mut() {
            Some(lines) => lines.recv().await,
            None => None,
        }
    }

    /// Apply every line that has already arrived, without waiting.
    pub fn pump_pending(&mut self) -> usize {
        let mut pending = Vec::new();
        if let Some(lines) = self.lines.as_mut() {
            while let Ok(line) = lines.try_recv() {
                pending.push(line);
            }
        }
        let count = pending.len();
        for line in pending {
            self.on_event(line);
        }
        count
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut String {
        &mut self.input
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// The transcript as one block of text, for display.
    pub fn rendered(&self) -> String {
        self.transcript.render()
    }
}
