//! Muninn: a terminal client for text-based multi-user worlds and the
//! WebSocket gateway it connects through.
//!
//! The session relay is the core:
//! - [`session::Session`] owns the one connection of a view and turns
//!   transport events into ordered [`transcript::TranscriptLine`]s.
//! - [`console::Console`] appends those lines to the transcript and turns
//!   the input buffer into outbound sends.
//!
//! [`gateway`] is the server side that bridges WebSocket clients to raw TCP
//! worlds; [`terminal`] mounts a console on stdin/stdout.

pub mod cli;
pub mod config;
pub mod console;
pub mod endpoint;
pub mod error;
pub mod gateway;
pub mod session;
pub mod terminal;
pub mod transcript;
pub mod transport;

pub use console::{Console, NullRenderer, Renderer};
pub use error::{MuninnError, Result};
pub use session::{ErrorSink, Session, SessionState, TracingSink};
pub use transcript::{Origin, Transcript, TranscriptLine, CONNECTED_NOTICE};
pub use transport::{ChannelTransport, RemoteEnd, Transport, TransportEvent, WebSocketTransport};
