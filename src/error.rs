//! Crate-level error type.

use crate::session::SessionState;

/// Every failure the relay, the console and the gateway can surface.
#[derive(Debug, thiserror::Error)]
pub enum MuninnError {
    /// The transport reported an error before or after opening.
    #[error("connection failed: {0}")]
    ConnectFailure(String),

    /// `send` was called while the session was not open. Nothing was written.
    #[error("cannot send while session is {state}")]
    SendWhileNotOpen { state: SessionState },

    /// The session only supports a single observer.
    #[error("session already has a subscriber")]
    AlreadySubscribed,

    /// The page origin could not be turned into a relay endpoint.
    #[error("invalid origin: {0}")]
    InvalidOrigin(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

pub type Result<T> = std::result::Result<T, MuninnError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_while_not_open_names_state() {
        let err = MuninnError::SendWhileNotOpen {
            state: SessionState::Connecting,
        };
        assert_eq!(err.to_string(), "cannot send while session is connecting");
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: MuninnError = io.into();
        assert!(matches!(err, MuninnError::Io(_)));
        assert_eq!(err.to_string(), "gone");
    }

    #[test]
    fn test_connect_failure_display() {
        let err = MuninnError::ConnectFailure("refused".into());
        assert_eq!(err.to_string(), "connection failed: refused");
    }
}
