//! Gateway relay server.
//!
//! Routes:
//! - `GET /`: embedded single-page client
//! - `GET /api/ping`: `{"ping":"pong"}`
//! - `GET /api/connect/<address>` (WebSocket upgrade): dial `<address>` over
//!   TCP and relay text both ways; `/api/connect` alone dials the configured
//!   default upstream
//!
//! Upstream bytes are split into lines; each line (terminator and telnet
//! command sequences removed) becomes one text message. Each text message from
//! the client is written upstream followed by `\n`.

use std::sync::Arc;
use std::time::Duration;

use colored::*;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::endpoint::DEFAULT_RELAY_PATH;
use crate::error::{MuninnError, Result};

/// Largest request head we are willing to buffer.
const MAX_HEAD_BYTES: usize = 8192;
const MAX_HEADERS: usize = 64;
/// How long a client has to deliver a complete request head, counting from
/// accept. Idle and slow clients are both dropped when it runs out.
const HEAD_TIMEOUT: Duration = Duration::from_secs(1);
const PEEK_BACKOFF: Duration = Duration::from_millis(20);

/// Embedded browser client: transcript block plus a single input line.
pub const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Muninn</title>
<style>
*{margin:0;padding:0;box-sizing:border-box}
body{background:#fff;font-family:system-ui,sans-serif;height:100vh;display:flex;flex-direction:column;padding:16px;gap:8px}
#transcript{flex:1;overflow-y:auto;padding:16px;border:1px solid #000;border-radius:6px;background:#000;color:#fff;font-family:monospace;white-space:pre-wrap;word-wrap:break-word}
form{display:flex;gap:8px}
#input{flex:1;padding:4px 8px;border:1px solid #000;border-radius:6px;font-family:monospace}
button{padding:4px 16px;border:1px solid #000;border-radius:6px;background:#fff;cursor:pointer}
button:disabled{color:#999;cursor:not-allowed}
</style>
</head>
<body>
<div id="transcript"></div>
<form id="form">
  <input id="input" type="text" placeholder="Type in text, hit Send" autocomplete="off">
  <button id="send" type="submit" disabled>Send</button>
</form>
<script>
const transcript = [];
const view = document.getElementById('transcript');
const input = document.getElementById('input');
const send = document.getElementById('send');
function append(text){
  transcript.push(text);
  view.textContent = transcript.join("\n");
  view.scrollTop = view.scrollHeight;
}
let ws = null;
function start(){
  if (ws) return;
  const url = new URL(window.location.href);
  url.protocol = url.protocol === 'https:' ? 'wss:' : 'ws:';
  const world = url.searchParams.get('world');
  url.pathname = '/api/connect' + (world ? '/' + encodeURIComponent(world) : '');
  url.search = '';
  url.hash = '';
  ws = new WebSocket(url);
  ws.addEventListener('error', (event) => { console.log(event); send.disabled = true; });
  ws.addEventListener('open', () => { append('Connected!'); send.disabled = false; });
  ws.addEventListener('message', (event) => append(event.data));
  ws.addEventListener('close', () => { send.disabled = true; });
}
document.getElementById('form').addEventListener('submit', (event) => {
  event.preventDefault();
  if (!ws || ws.readyState !== WebSocket.OPEN) return;
  ws.send(input.value);
  input.value = '';
});
start();
</script>
</body>
</html>"##;

/// Simple percent-decoding for path segments.
pub fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or("");
            if let Ok(byte) = u8::from_str_radix(hex, 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Index,
    Ping,
    /// Relay request; `None` when the path names no address.
    Connect(Option<String>),
    NotFound,
}

pub fn route(path: &str) -> Route {
    let path = path.split(['?', '#']).next().unwrap_or("");
    match path {
        "/" | "/index.html" => Route::Index,
        "/api/ping" => Route::Ping,
        p if p == DEFAULT_RELAY_PATH || p == "/api/connect/" => Route::Connect(None),
        p => match p.strip_prefix("/api/connect/") {
            Some(address) if !address.contains('/') => Route::Connect(Some(url_decode(address))),
            _ => Route::NotFound,
        },
    }
}

/// Method, path and upgrade intent of an HTTP request head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub websocket: bool,
    /// Length of the head in bytes, terminator included.
    pub len: usize,
}

/// Parse a complete request head. `Ok(None)` means more bytes are needed.
pub fn parse_head(buf: &[u8]) -> Result<Option<RequestHead>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    let len = match req.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => {
            return Err(MuninnError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("bad request head: {e}"),
            )))
        }
    };
    let websocket = req.headers.iter().any(|h| {
        h.name.eq_ignore_ascii_case("upgrade")
            && std::str::from_utf8(h.value)
                .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
                .unwrap_or(false)
    });
    Ok(Some(RequestHead {
        method: req.method.unwrap_or("").to_string(),
        path: req.path.unwrap_or("/").to_string(),
        websocket,
        len,
    }))
}

fn http_response(status: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len(),
    )
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Shared per-server settings handed to every connection.
#[derive(Debug, Clone, Default)]
pub struct GatewayState {
    pub default_upstream: Option<String>,
}

/// Bind `http.address` and serve forever.
pub async fn serve(config: &Config) -> Result<()> {
    let listener = TcpListener::bind(&config.http.address).await?;
    let local = listener.local_addr()?;
    eprintln!("{}", format!("  Muninn gateway listening on http://{local}").bright_green());
    match &config.gateway.default_upstream {
        Some(upstream) => eprintln!("{}", format!("  Default upstream: {upstream}").bright_blue()),
        None => eprintln!("{}", "  No default upstream; clients must name a world.".bright_blue()),
    }
    info!(http.address = %local, "started");

    let state = Arc::new(GatewayState {
        default_upstream: config.gateway.default_upstream.clone(),
    });
    serve_listener(listener, state).await
}

/// Accept loop over an already-bound listener.
pub async fn serve_listener(listener: TcpListener, state: Arc<GatewayState>) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = Arc::clone(&state);
        let conn_id = Uuid::new_v4();
        let span = tracing::info_span!("conn", id = %conn_id, %peer);
        tokio::spawn(
            async move {
                if let Err(e) = handle_connection(stream, state).await {
                    warn!(error = %e, "connection error");
                }
            }
            .instrument(span),
        );
    }
}

async fn peek_head(stream: &TcpStream) -> Result<Option<RequestHead>> {
    match tokio::time::timeout(HEAD_TIMEOUT, peek_until_complete(stream)).await {
        Ok(head) => head,
        Err(_) => {
            debug!("request head timed out");
            Ok(None)
        }
    }
}

async fn peek_until_complete(stream: &TcpStream) -> Result<Option<RequestHead>> {
    let mut buf = vec![0u8; MAX_HEAD_BYTES];
    loop {
        let n = stream.peek(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        if let Some(head) = parse_head(&buf[..n])? {
            return Ok(Some(head));
        }
        if n == buf.len() {
            return Err(MuninnError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "request head too large",
            )));
        }
        tokio::time::sleep(PEEK_BACKOFF).await;
    }
}

async fn handle_connection(mut stream: TcpStream, state: Arc<GatewayState>) -> Result<()> {
    let Some(head) = peek_head(&stream).await? else {
        return Ok(());
    };
    debug!(method = %head.method, path = %head.path, websocket = head.websocket, "request");

    let route = route(&head.path);
    if let Route::Connect(address) = &route {
        if head.websocket {
            let address = address.clone().or_else(|| state.default_upstream.clone());
            return connect(stream, head, address).await;
        }
    }

    // Plain HTTP: consume the head so the client sees our reply, not a reset.
    let mut consumed = vec![0u8; head.len];
    stream.read_exact(&mut consumed).await?;

    let response = match route {
        Route::Index => http_response("200 OK", "text/html; charset=utf-8", INDEX_HTML),
        Route::Ping => {
            let body = serde_json::json!({"ping": "pong"}).to_string();
            http_response("200 OK", "application/json", &body)
        }
        Route::Connect(_) => http_response(
            "400 Bad Request",
            "text/plain; charset=utf-8",
            "expected websocket upgrade\n",
        ),
        Route::NotFound => http_response("404 Not Found", "text/plain; charset=utf-8", "not found\n"),
    };
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

async fn connect(mut stream: TcpStream, head: RequestHead, address: Option<String>) -> Result<()> {
    let Some(address) = address else {
        warn!(path = %head.path, "no address and no default upstream");
        return bad_gateway(&mut stream, &head).await;
    };

    let upstream = match TcpStream::connect(&address).await {
        Ok(upstream) => upstream,
        Err(e) => {
            warn!(%address, error = %e, "error connecting to address");
            return bad_gateway(&mut stream, &head).await;
        }
    };

    let ws = tokio_tungstenite::accept_async(stream).await?;
    info!(%address, "relay open");
    relay(ws, upstream).await;
    info!(%address, "relay closed");
    Ok(())
}

async fn bad_gateway(stream: &mut TcpStream, head: &RequestHead) -> Result<()> {
    let mut consumed = vec![0u8; head.len];
    stream.read_exact(&mut consumed).await?;
    let response = http_response(
        "502 Bad Gateway",
        "text/plain; charset=utf-8",
        "error connecting to address\n",
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

const IAC: u8 = 255;
const SE: u8 = 240;
const SB: u8 = 250;
const WILL: u8 = 251;
const DONT: u8 = 254;

const UPSTREAM_READ_BYTES: usize = 4096;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum TelnetState {
    #[default]
    Data,
    Iac,
    /// After `WILL`/`WONT`/`DO`/`DONT`; the next byte is the option.
    Option,
    Sub,
    SubIac,
}

/// Streaming telnet command filter.
///
/// State is kept between [`TelnetFilter::feed`] calls, so a command split
/// across reads, or a subnegotiation payload containing `\n`, is removed
/// whole. `IAC IAC` is an escaped 255 and is kept as a single byte. Option
/// negotiation and subnegotiation (`SB ... IAC SE`) are dropped without
/// being answered.
#[derive(Debug, Default)]
pub struct TelnetFilter {
    state: TelnetState,
}

impl TelnetFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the text bytes of `bytes` to `out`.
    pub fn feed(&mut self, bytes: &[u8], out: &mut Vec<u8>) {
        for &b in bytes {
            self.state = match (self.state, b) {
                (TelnetState::Data, IAC) => TelnetState::Iac,
                (TelnetState::Data, _) => {
                    out.push(b);
                    TelnetState::Data
                }
                (TelnetState::Iac, IAC) => {
                    out.push(IAC);
                    TelnetState::Data
                }
                (TelnetState::Iac, SB) => TelnetState::Sub,
                (TelnetState::Iac, cmd) if (WILL..=DONT).contains(&cmd) => TelnetState::Option,
                (TelnetState::Iac, _) | (TelnetState::Option, _) => TelnetState::Data,
                (TelnetState::Sub, IAC) => TelnetState::SubIac,
                (TelnetState::Sub, _) => TelnetState::Sub,
                (TelnetState::SubIac, SE) => TelnetState::Data,
                (TelnetState::SubIac, _) => TelnetState::Sub,
            };
        }
    }
}

/// Remove telnet command sequences from a complete chunk of upstream bytes.
pub fn strip_telnet(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    TelnetFilter::new().feed(bytes, &mut out);
    out
}

/// Turn one filtered upstream line into message text: terminator removed,
/// invalid UTF-8 replaced.
pub fn upstream_line_to_text(raw: &[u8]) -> String {
    let mut line = raw;
    if let Some(rest) = line.strip_suffix(b"\n") {
        line = rest;
    }
    if let Some(rest) = line.strip_suffix(b"\r") {
        line = rest;
    }
    String::from_utf8_lossy(line).into_owned()
}

/// Upstream byte stream to message texts. Telnet commands are removed
/// before the stream is split on `\n`.
#[derive(Debug, Default)]
pub struct UpstreamDecoder {
    telnet: TelnetFilter,
    pending: Vec<u8>,
}

impl UpstreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.telnet.feed(bytes, &mut self.pending);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(upstream_line_to_text(&raw));
        }
        lines
    }

    /// Unterminated text left when the upstream ends.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(upstream_line_to_text(&raw))
    }
}

/// Pump text between a WebSocket client and an upstream byte stream until
/// either side ends.
pub async fn relay<S, U>(ws: WebSocketStream<S>, upstream: U)
where
    S: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let (mut up_read, mut up_write) = tokio::io::split(upstream);
    let (mut ws_sink, mut ws_stream) = ws.split();

    let downstream = async {
        let mut decoder = UpstreamDecoder::new();
        let mut buf = vec![0u8; UPSTREAM_READ_BYTES];
        'read: loop {
            let lines = match up_read.read(&mut buf).await {
                Ok(0) => {
                    if let Some(text) = decoder.finish() {
                        debug!(bytes = %text, "sent");
                        let _ = ws_sink.send(WsMessage::Text(text)).await;
                    }
                    break;
                }
                Ok(n) => decoder.push(&buf[..n]),
                Err(e) => {
                    warn!(error = %e, "read upstream");
                    break;
                }
            };
            for text in lines {
                debug!(bytes = %text, "sent");
                if ws_sink.send(WsMessage::Text(text)).await.is_err() {
                    break 'read;
                }
            }
        }
        let _ = ws_sink.close().await;
    };

    let upstream_writer = async {
        while let Some(frame) = ws_stream.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => {
                    debug!(bytes = %text, "received message");
                    let mut line = text.into_bytes();
                    line.push(b'\n');
                    if let Err(e) = up_write.write_all(&line).await {
                        warn!(error = %e, "write upstream");
                        break;
                    }
                }
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "read downstream");
                    break;
                }
            }
        }
        let _ = up_write.shutdown().await;
    };

    tokio::select! {
        _ = downstream => {}
        _ = upstream_writer => {}
    }
}
