//! Relay endpoint derivation.
//!
//! The client never hard-codes the gateway address. It takes the origin it
//! was served from (or the configured one for the terminal front-end), swaps
//! the scheme for its WebSocket counterpart and replaces the path with the
//! relay route. Host and port are preserved; query and fragment are dropped.

use tokio_tungstenite::tungstenite::http::Uri;

use crate::error::{MuninnError, Result};

/// Route the gateway serves WebSocket relays on.
pub const DEFAULT_RELAY_PATH: &str = "/api/connect";

/// Map an origin scheme to the connection-capable scheme.
fn websocket_scheme(scheme: &str) -> Option<&'static str> {
    match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => Some("ws"),
        "https" | "wss" => Some("wss"),
        _ => None,
    }
}

/// Derive the WebSocket endpoint for `relay_path` at `origin`.
///
/// ```
/// let uri = muninn::endpoint::derive_endpoint("https://play.example.org:8443/worlds", "/api/connect").unwrap();
/// assert_eq!(uri.to_string(), "wss://play.example.org:8443/api/connect");
/// ```
pub fn derive_endpoint(origin: &str, relay_path: &str) -> Result<Uri> {
    if !relay_path.starts_with('/') {
        return Err(MuninnError::InvalidOrigin(format!(
            "relay path must start with '/': {relay_path}"
        )));
    }

    let uri: Uri = origin
        .trim()
        .parse()
        .map_err(|e| MuninnError::InvalidOrigin(format!("{origin}: {e}")))?;

    let scheme = uri
        .scheme_str()
        .ok_or_else(|| MuninnError::InvalidOrigin(format!("{origin}: missing scheme")))?;
    let ws_scheme = websocket_scheme(scheme)
        .ok_or_else(|| MuninnError::InvalidOrigin(format!("{origin}: unsupported scheme {scheme}")))?;
    let authority = uri
        .authority()
        .ok_or_else(|| MuninnError::InvalidOrigin(format!("{origin}: missing host")))?;

    Uri::builder()
        .scheme(ws_scheme)
        .authority(authority.as_str())
        .path_and_query(relay_path)
        .build()
        .map_err(|e| MuninnError::InvalidOrigin(format!("{origin}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("http://localhost:3000", "ws://localhost:3000/api/connect")]
    #[case("http://localhost:3000/", "ws://localhost:3000/api/connect")]
    #[case("https://muninn.example.com", "wss://muninn.example.com/api/connect")]
    #[case("https://muninn.example.com:8443/index.html", "wss://muninn.example.com:8443/api/connect")]
    #[case("ws://127.0.0.1:3001/whatever", "ws://127.0.0.1:3001/api/connect")]
    #[case("wss://relay.example.net", "wss://relay.example.net/api/connect")]
    #[case("HTTP://localhost:3000", "ws://localhost:3000/api/connect")]
    fn test_derive_endpoint_swaps_scheme_and_path(#[case] origin: &str, #[case] expected: &str) {
        let uri = derive_endpoint(origin, DEFAULT_RELAY_PATH).unwrap();
        assert_eq!(uri.to_string(), expected);
    }

    #[test]
    fn test_derive_endpoint_drops_query() {
        let uri = derive_endpoint("http://localhost:3000/play?world=tapestries", DEFAULT_RELAY_PATH).unwrap();
        assert_eq!(uri.query(), None);
        assert_eq!(uri.path(), "/api/connect");
    }

    #[test]
    fn test_derive_endpoint_preserves_port() {
        let uri = derive_endpoint("http://10.0.0.7:9999", DEFAULT_RELAY_PATH).unwrap();
        assert_eq!(uri.port_u16(), Some(9999));
        assert_eq!(uri.host(), Some("10.0.0.7"));
    }

    #[test]
    fn test_derive_endpoint_custom_relay_path() {
        let uri = derive_endpoint("http://localhost:3000", "/api/connect/mud.example.org:4201").unwrap();
        assert_eq!(uri.to_string(), "ws://localhost:3000/api/connect/mud.example.org:4201");
    }

    #[rstest]
    #[case("ftp://localhost:3000")]
    #[case("/relative/path")]
    #[case("")]
    fn test_derive_endpoint_rejects_bad_origin(#[case] origin: &str) {
        let err = derive_endpoint(origin, DEFAULT_RELAY_PATH).unwrap_err();
        assert!(matches!(err, MuninnError::InvalidOrigin(_)));
    }

    #[test]
    fn test_derive_endpoint_rejects_relative_relay_path() {
        let err = derive_endpoint("http://localhost:3000", "api/connect").unwrap_err();
        assert!(matches!(err, MuninnError::InvalidOrigin(_)));
    }
}
