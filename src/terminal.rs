//! Terminal front-end: the view that mounts a [`Console`] on stdin/stdout.

use std::io::Write;
use std::sync::Arc;

use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::warn;

use crate::config::Config;
use crate::console::{Console, Renderer};
use crate::endpoint::derive_endpoint;
use crate::error::Result;
use crate::session::{SessionState, TracingSink};
use crate::transcript::{Origin, Transcript};
use crate::transport::WebSocketTransport;

/// Prints each line once, as it is appended. Server text is written
/// verbatim; system notices are highlighted.
pub struct TerminalRenderer<W: Write + Send> {
    out: W,
    printed: usize,
}

impl<W: Write + Send> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out, printed: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Renderer for TerminalRenderer<W> {
    fn refresh(&mut self, transcript: &Transcript) {
        for line in &transcript.lines()[self.printed..] {
            let result = match line.origin() {
                Origin::System => writeln!(self.out, "{}", line.text().bright_green()),
                Origin::Inbound => writeln!(self.out, "{}", line.text()),
            };
            if let Err(e) = result {
                warn!(error = %e, "stdout write failed");
            }
        }
        self.printed = transcript.len();
        let _ = self.out.flush();
    }
}

/// Hand one typed line to the console, unless the session cannot take it.
///
/// Returns whether the line was submitted.
pub fn submit_line(console: &mut Console, text: String) -> bool {
    let state = console.session_state();
    if state != SessionState::Open {
        eprintln!("{}", format!("  not connected ({state}); input dropped").yellow());
        return false;
    }
    *console.input_mut() = text;
    if let Err(e) = console.on_submit() {
        warn!(error = %e, "submit failed");
    }
    true
}

/// Connect to `world` (or the gateway's default upstream) and run until
/// stdin closes, the session ends, or Ctrl-C.
pub async fn run(config: &Config, world: Option<&str>) -> Result<()> {
    let endpoint = derive_endpoint(&config.client.origin, &config.relay_path_for(world))?;
    eprintln!("{}", format!("  Connecting to {endpoint}").bright_blue());
    eprintln!("{}", "  Type a command and press Enter. Ctrl-D to quit.".bright_blue());

    let mut console = Console::new(
        endpoint,
        Arc::new(WebSocketTransport::new()),
        Arc::new(TracingSink),
        Box::new(TerminalRenderer::new(std::io::stdout())),
    );
    console.start()?;

    let mut input = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    loop {
        tokio::select! {
            line = console.next_event() => match line {
                Some(line) => console.on_event(line),
                None => {
                    let state = console.session_state();
                    eprintln!("{}", format!("  session ended ({state})").yellow());
                    break;
                }
            },
            typed = input.next() => match typed {
                Some(Ok(text)) => {
                    submit_line(&mut console, text);
                }
                Some(Err(e)) => {
                    console.stop();
                    return Err(e.into());
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    console.stop();
    Ok(())
}
