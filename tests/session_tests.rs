//! Tests for the session relay driven through the in-process transport:
//! connection lifecycle, transcript order, submission passthrough and state
//! gating.

use std::sync::{Arc, Mutex};

use muninn::transport::ChannelTransport;
use muninn::{
    Console, ErrorSink, MuninnError, NullRenderer, Origin, RemoteEnd, SessionState,
};
use proptest::prelude::*;
use rstest::rstest;
use tokio_tungstenite::tungstenite::http::Uri;

#[derive(Default)]
struct RecordingSink(Mutex<Vec<String>>);

impl ErrorSink for RecordingSink {
    fn report(&self, _endpoint: &Uri, error: &MuninnError) {
        self.0.lock().unwrap().push(error.to_string());
    }
}

impl RecordingSink {
    fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

struct Mounted {
    console: Console,
    remote: RemoteEnd,
    transport: ChannelTransport,
    sink: Arc<RecordingSink>,
}

/// Mount a view: build the console and start it.
async fn mount() -> Mounted {
    let (transport, mut remotes) = ChannelTransport::new();
    let sink = Arc::new(RecordingSink::default());
    let mut console = Console::new(
        "ws://localhost:3001/api/connect".parse().unwrap(),
        Arc::new(transport.clone()),
        sink.clone(),
        Box::new(NullRenderer),
    );
    console.start().unwrap();
    let remote = remotes.recv().await.unwrap();
    Mounted {
        console,
        remote,
        transport,
        sink,
    }
}

/// Mount and let the transport open.
async fn mount_open() -> Mounted {
    let mut m = mount().await;
    m.remote.open();
    let line = m.console.next_event().await.unwrap();
    m.console.on_event(line);
    m
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_scenario_a_open_shows_connected() {
    let m = mount_open().await;
    assert_eq!(m.console.transcript().texts(), vec!["Connected!"]);
    assert_eq!(m.console.session_state(), SessionState::Open);
}

#[tokio::test]
async fn test_scenario_b_inbound_follows_connected() {
    let mut m = mount_open().await;
    m.remote.deliver("Welcome to the realm.");
    let line = m.console.next_event().await.unwrap();
    m.console.on_event(line);
    assert_eq!(
        m.console.transcript().texts(),
        vec!["Connected!", "Welcome to the realm."]
    );
    assert_eq!(m.console.rendered(), "Connected!\nWelcome to the realm.");
}

#[tokio::test]
async fn test_scenario_c_submit_sends_once_and_clears() {
    let mut m = mount_open().await;
    m.console.input_mut().push_str("look");
    m.console.on_submit().unwrap();
    assert_eq!(m.console.input(), "");
    assert_eq!(m.remote.next_sent().await.as_deref(), Some("look"));
    assert!(m.remote.drain_sent().is_empty());
}

#[tokio::test]
async fn test_scenario_d_error_before_open() {
    let mut m = mount().await;
    m.remote.fail("connection refused");
    assert!(m.console.next_event().await.is_none());
    assert!(m.console.transcript().is_empty());
    assert_eq!(m.sink.count(), 1);
    assert_eq!(m.console.session_state(), SessionState::Errored);
}

#[tokio::test]
async fn test_scenario_e_empty_submission_forwarded() {
    let mut m = mount_open().await;
    m.console.on_submit().unwrap();
    assert_eq!(m.remote.next_sent().await.as_deref(), Some(""));
    assert_eq!(m.console.input(), "");
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_p1_repeated_start_opens_one_connection() {
    let mut m = mount().await;
    for _ in 0..10 {
        assert!(!m.console.start().unwrap());
    }
    assert_eq!(m.transport.open_count(), 1);
}

#[rstest]
#[case("")]
#[case("   ")]
#[case("say hello\nsay goodbye")]
#[case("\t")]
#[tokio::test]
async fn test_p3_submit_always_clears_input(#[case] text: &str) {
    let mut m = mount_open().await;
    m.console.input_mut().push_str(text);
    m.console.on_submit().unwrap();
    assert_eq!(m.console.input(), "");
    assert_eq!(m.remote.next_sent().await.as_deref(), Some(text));
}

#[tokio::test]
async fn test_p5_send_while_connecting_writes_nothing() {
    let mut m = mount().await;
    m.console.input_mut().push_str("look");
    let err = m.console.on_submit().unwrap_err();
    assert!(matches!(
        err,
        MuninnError::SendWhileNotOpen {
            state: SessionState::Connecting
        }
    ));
    assert_eq!(m.console.input(), "");
    assert!(m.console.transcript().is_empty());
    assert!(m.remote.drain_sent().is_empty());
}

#[tokio::test]
async fn test_p5_send_after_error_writes_nothing() {
    let mut m = mount_open().await;
    m.remote.fail("reset by peer");
    assert!(m.console.next_event().await.is_none());
    assert_eq!(m.sink.count(), 1);

    m.console.input_mut().push_str("look");
    assert!(m.console.on_submit().is_err());
    assert!(m.remote.drain_sent().is_empty());
    assert_eq!(m.console.transcript().texts(), vec!["Connected!"]);
}

#[tokio::test]
async fn test_remote_close_ends_stream_without_report() {
    let mut m = mount_open().await;
    m.remote.deliver("Goodbye.");
    m.remote.close();
    while let Some(line) = m.console.next_event().await {
        m.console.on_event(line);
    }
    assert_eq!(m.console.transcript().texts(), vec!["Connected!", "Goodbye."]);
    assert_eq!(m.console.session_state(), SessionState::Closed);
    assert_eq!(m.sink.count(), 0);
}

#[tokio::test]
async fn test_pump_pending_applies_buffered_lines() {
    let mut m = mount().await;
    m.remote.open();
    m.remote.deliver("one");
    m.remote.deliver("two");
    m.remote.close();
    while m.console.session_state() != SessionState::Closed {
        tokio::task::yield_now().await;
    }
    assert_eq!(m.console.pump_pending(), 3);
    assert_eq!(m.console.transcript().texts(), vec!["Connected!", "one", "two"]);
    let seqs: Vec<u64> = m.console.transcript().lines().iter().map(|l| l.sequence()).collect();
    assert_eq!(seqs, vec![0, 1, 2]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_p2_transcript_matches_arrival_order(events in proptest::collection::vec(any::<String>(), 0..20)) {
        let texts = tokio_test::block_on(async {
            let mut m = mount_open().await;
            for e in &events {
                m.remote.deliver(e.clone());
            }
            for _ in 0..events.len() {
                let line = m.console.next_event().await.unwrap();
                m.console.on_event(line);
            }
            m.console.input_mut().push_str("look");
            m.console.on_submit().unwrap();
            m.console
                .transcript()
                .lines()
                .iter()
                .map(|l| (l.origin(), l.text().to_string()))
                .collect::<Vec<_>>()
        });
        let mut expected = vec![(Origin::System, "Connected!".to_string())];
        expected.extend(events.iter().map(|e| (Origin::Inbound, e.clone())));
        prop_assert_eq!(texts, expected);
    }

    #[test]
    fn test_p4_submission_is_verbatim(text in any::<String>()) {
        let sent = tokio_test::block_on(async {
            let mut m = mount_open().await;
            *m.console.input_mut() = text.clone();
            m.console.on_submit().unwrap();
            let first = m.remote.next_sent().await;
            (first, m.remote.drain_sent(), m.console.input().to_string())
        });
        prop_assert_eq!(sent.0, Some(text));
        prop_assert!(sent.1.is_empty());
        prop_assert_eq!(sent.2, "");
    }
}
