//! The append-only scrollback shown to the user.

use serde::Serialize;

/// Text of the notice emitted when the session opens.
pub const CONNECTED_NOTICE: &str = "Connected!";

/// Where a transcript line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Generated by the client itself (connection notices).
    System,
    /// Received from the server, verbatim.
    Inbound,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::System => write!(f, "system"),
            Origin::Inbound => write!(f, "inbound"),
        }
    }
}

/// One immutable unit of display text.
///
/// `sequence` is assigned by [`Transcript::append`]; lines produced by the
/// session carry `0` until they are appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptLine {
    text: String,
    origin: Origin,
    sequence: u64,
}

impl TranscriptLine {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: Origin::System,
            sequence: 0,
        }
    }

    pub fn inbound(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: Origin::Inbound,
            sequence: 0,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Ordered, unbounded sequence of lines received since mount.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    lines: Vec<TranscriptLine>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line, stamping it with the next sequence number.
    ///
    /// No deduplication and no size cap.
    pub fn append(&mut self, mut line: TranscriptLine) -> &TranscriptLine {
        line.sequence = self.lines.len() as u64;
        self.lines.push(line);
        &self.lines[self.lines.len() - 1]
    }

    pub fn lines(&self) -> &[TranscriptLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line texts in append order.
    pub fn texts(&self) -> Vec<&str> {
        self.lines.iter().map(|l| l.text()).collect()
    }

    /// The transcript as one block: line texts joined with `\n`.
    pub fn render(&self) -> String {
        self.texts().join("\n")
    }
}
