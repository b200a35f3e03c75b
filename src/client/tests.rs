use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures_util::stream;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

use super::decoder::{EventDecoder, RawEvent};
use super::policy::ReconnectPolicy;
use super::reconnector::Reconnector;
use crate::broker::engine::{EngineOptions, Registry};
use crate::broker::producer::SnapshotProducer;
use crate::broker::topic::TopicKey;
use crate::broker::variant::Variants;
use crate::transport::sse::{AppState, serve};
use crate::utils::error::{ClientError, ProducerError};

struct CountingProducer(Mutex<u64>);

#[async_trait]
impl SnapshotProducer for CountingProducer {
    async fn fetch(&self, _topic: &TopicKey) -> Result<Value, ProducerError> {
        let mut n = self.0.lock().unwrap();
        *n += 1;
        Ok(json!({ "fetch": *n }))
    }
}

async fn serve_on(listener: TcpListener) -> Registry {
    let registry = Registry::new(
        Arc::new(CountingProducer(Mutex::new(0))),
        Variants::internal_external(["internal"]),
        EngineOptions {
            poll_interval: Duration::from_secs(60),
            ..EngineOptions::default()
        },
    );
    let state = AppState::new(registry.clone(), Duration::from_secs(30), 16);
    tokio::spawn(serve(listener, state, std::future::pending()));
    registry
}

async fn start() -> (String, Registry) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (format!("http://{addr}"), serve_on(listener).await)
}

/// Reconnector forwarding every event into a channel.
fn recording(url: &str, policy: ReconnectPolicy) -> (Reconnector, mpsc::UnboundedReceiver<(String, Value)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let reconnector = Reconnector::new(url, policy)
        .unwrap()
        .on_any(move |name, data| {
            let _ = tx.send((name.to_string(), data.clone()));
        });
    (reconnector, rx)
}

async fn next_named(rx: &mut mpsc::UnboundedReceiver<(String, Value)>, name: &str) -> Value {
    loop {
        let (event, data) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("reconnector stopped");
        if event == name {
            return data;
        }
    }
}

#[test]
fn test_fixed_policy_never_grows() {
    let policy = ReconnectPolicy::fixed(Duration::from_secs(5));
    for attempt in [0, 1, 5, 100] {
        assert_eq!(policy.delay(attempt), Duration::from_secs(5));
    }
}

#[test]
fn test_backoff_doubles_up_to_the_cap() {
    let policy = ReconnectPolicy::new(Duration::from_secs(5), Duration::from_secs(60), 2.0, 0.0);
    assert_eq!(policy.delay(0), Duration::from_secs(5));
    assert_eq!(policy.delay(1), Duration::from_secs(10));
    assert_eq!(policy.delay(3), Duration::from_secs(40));
    assert_eq!(policy.delay(4), Duration::from_secs(60));
    assert_eq!(policy.delay(u32::MAX), Duration::from_secs(60));
}

#[test]
fn test_jitter_stays_within_bounds() {
    let policy = ReconnectPolicy::new(Duration::from_secs(10), Duration::from_secs(10), 1.0, 0.2);
    for _ in 0..200 {
        let delay = policy.delay(0);
        assert!(delay >= Duration::from_secs(8), "{delay:?}");
        assert!(delay <= Duration::from_secs(12), "{delay:?}");
    }
}

#[test]
fn test_policy_sanitizes_inputs() {
    let policy = ReconnectPolicy::new(Duration::from_secs(5), Duration::from_secs(1), 0.5, f64::NAN);
    assert_eq!(policy.max(), Duration::from_secs(5));
    assert_eq!(policy.delay(3), Duration::from_secs(5));
}

#[test]
fn test_jitter_near_the_duration_limit_saturates() {
    let huge = Duration::from_secs(u64::MAX);
    let policy = ReconnectPolicy::new(Duration::from_secs(5), huge, 2.0, 0.5);
    for attempt in [70, 1000, u32::MAX] {
        assert!(policy.delay(attempt) <= huge);
    }
}

#[test]
fn test_decoder_handles_split_chunks() {
    let mut decoder = EventDecoder::new();
    assert!(decoder.push(b"event: upd").unwrap().is_empty());
    assert!(decoder.push(b"ate\ndata: {\"a\":").unwrap().is_empty());
    let events = decoder.push(b"1}\n\nevent: heartbeat\ndata: {}\n\n").unwrap();
    assert_eq!(
        events,
        vec![
            RawEvent { name: "update".into(), data: "{\"a\":1}".into() },
            RawEvent { name: "heartbeat".into(), data: "{}".into() },
        ]
    );
}

#[test]
fn test_decoder_skips_comments_and_joins_data_lines() {
    let mut decoder = EventDecoder::new();
    let events = decoder.push(b": keep-alive\r\n\r\ndata: first\r\ndata: second\r\nid: 7\r\n\r\nevent: empty\n\n").unwrap();
    assert_eq!(
        events,
        vec![RawEvent { name: "message".into(), data: "first\nsecond".into() }]
    );
}

#[test]
fn test_decoder_keeps_multibyte_characters_across_chunks() {
    let mut decoder = EventDecoder::new();
    let bytes = "data: \u{00e9}t\u{00e9}\n\n".as_bytes();
    // split inside the two-byte sequence
    assert!(decoder.push(&bytes[..7]).unwrap().is_empty());
    let events = decoder.push(&bytes[7..]).unwrap();
    assert_eq!(events[0].data, "\u{00e9}t\u{00e9}");
}

#[test]
fn test_decoder_keeps_partial_character_after_invalid_bytes() {
    let mut decoder = EventDecoder::new();
    let mut chunk = b"data: a\xffb".to_vec();
    chunk.push(0xc3);
    assert!(decoder.push(&chunk).unwrap().is_empty());
    let events = decoder.push(b"\xa9\n\n").unwrap();
    assert_eq!(events[0].data, "a\u{fffd}b\u{00e9}");
}

#[test]
fn test_decoder_refuses_unbounded_lines() {
    let mut decoder = EventDecoder::with_limit(64);
    assert!(decoder.push(b"data: short\n").unwrap().is_empty());
    let err = decoder.push(&[b'x'; 100]).unwrap_err();
    assert!(matches!(err, ClientError::EventTooLarge(64)));

    // many small data lines of one event count too
    let mut decoder = EventDecoder::with_limit(64);
    for _ in 0..5 {
        decoder.push(b"data: 0123456789\n").unwrap();
    }
    assert!(decoder.push(b"data: 0123456789\n").is_err());
    assert_eq!(EventDecoder::new().push(b"data: x\n\n").unwrap().len(), 1);
}

#[test]
fn test_topic_url_carries_handshake() {
    let reconnector = Reconnector::for_topic(
        "http://localhost:8080/stream",
        &TopicKey::project("P1", true),
        "al ice",
        "external",
        ReconnectPolicy::default(),
    )
    .unwrap();
    assert_eq!(
        reconnector.url().as_str(),
        "http://localhost:8080/stream?project=P1&display_mode=true&username=al+ice&variant=external"
    );

    let all = Reconnector::for_topic(
        "http://localhost:8080/stream",
        &TopicKey::all(false),
        "bob",
        "internal",
        ReconnectPolicy::default(),
    )
    .unwrap();
    assert!(!all.url().as_str().contains("project="));
    assert!(matches!(
        Reconnector::new("not a url", ReconnectPolicy::default()),
        Err(ClientError::InvalidUrl(_))
    ));
}

#[tokio::test]
async fn test_named_handlers_receive_parsed_payloads() {
    let (base, _registry) = start().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let reconnector = Reconnector::new(
        &format!("{base}/stream?username=a&variant=internal"),
        ReconnectPolicy::fixed(Duration::from_millis(50)),
    )
    .unwrap()
    .on("update", move |data| {
        let _ = tx.send(data.clone());
    });
    let (flag, enabled) = watch::channel(true);
    let task = tokio::spawn(async move { reconnector.run(enabled).await });

    let update = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update, json!({ "fetch": 1 }));

    flag.send(false).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("run did not stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_reconnects_after_the_server_drops_the_stream() {
    let (base, registry) = start().await;
    let (reconnector, mut rx) = recording(
        &format!("{base}/stream?project=P1&username=a&variant=external"),
        ReconnectPolicy::fixed(Duration::from_millis(50)),
    );
    let (_flag, enabled) = watch::channel(true);
    tokio::spawn(async move { reconnector.run(enabled).await });

    let first = next_named(&mut rx, "connected").await;
    assert_eq!(next_named(&mut rx, "update").await, json!({ "fetch": 1 }));

    registry.shutdown();
    let second = next_named(&mut rx, "connected").await;
    assert_ne!(first["subscriberId"], second["subscriberId"]);
    // the topic was re-created, so it polled again
    assert_eq!(next_named(&mut rx, "update").await, json!({ "fetch": 2 }));
    assert_eq!(registry.subscriber_count(&TopicKey::project("P1", false)), 1);
}

#[tokio::test]
async fn test_keeps_retrying_until_the_server_appears() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (reconnector, mut rx) = recording(
        &format!("http://{addr}/stream?username=a&variant=internal"),
        ReconnectPolicy::fixed(Duration::from_millis(50)),
    );
    let (_flag, enabled) = watch::channel(true);
    tokio::spawn(async move { reconnector.run(enabled).await });

    tokio::time::sleep(Duration::from_millis(300)).await;
    let listener = TcpListener::bind(addr).await.unwrap();
    serve_on(listener).await;

    next_named(&mut rx, "connected").await;
}

#[tokio::test]
async fn test_rejected_handshake_is_not_retried() {
    let (base, registry) = start().await;
    let reconnector = Reconnector::new(
        &format!("{base}/stream?variant=internal"),
        ReconnectPolicy::fixed(Duration::from_millis(10)),
    )
    .unwrap();
    let (_flag, enabled) = watch::channel(true);

    let result = tokio::time::timeout(Duration::from_secs(5), reconnector.run(enabled))
        .await
        .unwrap();
    match result {
        Err(ClientError::Rejected { status, body }) => {
            assert_eq!(status, 400);
            assert!(body.contains("username"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(registry.topic_count(), 0);
}

#[tokio::test]
async fn test_disabled_flag_means_no_connection() {
    let (base, registry) = start().await;
    let (reconnector, mut rx) = recording(
        &format!("{base}/stream?username=a&variant=internal"),
        ReconnectPolicy::default(),
    );
    let (_flag, enabled) = watch::channel(false);

    reconnector.run(enabled).await.unwrap();
    assert!(rx.try_recv().is_err());
    assert_eq!(registry.topic_count(), 0);
}

#[tokio::test]
async fn test_only_one_connection_at_a_time() {
    let (base, registry) = start().await;
    let (reconnector, mut rx) = recording(
        &format!("{base}/stream?username=a&variant=internal"),
        ReconnectPolicy::fixed(Duration::from_millis(20)),
    );
    let (_flag, enabled) = watch::channel(true);
    tokio::spawn(async move { reconnector.run(enabled).await });

    for _ in 0..3 {
        next_named(&mut rx, "connected").await;
        assert!(registry.subscriber_count(&TopicKey::all(false)) <= 1);
        registry.shutdown();
    }
    next_named(&mut rx, "connected").await;
    assert_eq!(registry.stats().values().sum::<usize>(), 1);
}

/// First request gets 429, later ones a one-event stream.
async fn busy_then_ready(State(hits): State<Arc<AtomicUsize>>) -> Response {
    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }
    let connected = Event::default().event("connected").data(r#"{"subscriberId":"s"}"#);
    Sse::new(stream::iter([Ok::<_, Infallible>(connected)])).into_response()
}

#[tokio::test]
async fn test_throttled_handshake_is_retried() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/stream", get(busy_then_ready))
        .with_state(hits.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });

    let (reconnector, mut rx) = recording(
        &format!("http://{addr}/stream"),
        ReconnectPolicy::fixed(Duration::from_millis(10)),
    );
    let (flag, enabled) = watch::channel(true);
    let task = tokio::spawn(async move { reconnector.run(enabled).await });

    next_named(&mut rx, "connected").await;
    assert!(hits.load(Ordering::SeqCst) >= 2);

    flag.send(false).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
