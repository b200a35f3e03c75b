//! SSE endpoint
//!
//! Each accepted connection owns a bounded channel. The registry writes into
//! it without blocking (a full channel counts as a failed write and drops
//! the subscriber); the response body drains it, interleaving heartbeats.
//! When the client goes away the body is dropped and its guard removes the
//! subscriber. When the registry drops the subscriber the channel closes and
//! the body ends.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::{self, Stream};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broker::engine::Registry;
use crate::broker::message::StreamEvent;
use crate::broker::subscriber::{Subscriber, SubscriberId};
use crate::broker::topic::TopicKey;
use crate::transport::message::ConnectParams;
use crate::utils::error::TransportError;

/// Shared state of the HTTP handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Registry,
    pub heartbeat: Duration,
    pub sink_capacity: usize,
}

impl AppState {
    pub fn new(registry: Registry, heartbeat: Duration, sink_capacity: usize) -> Self {
        Self {
            registry,
            heartbeat,
            // room for `connected` plus a cached payload
            sink_capacity: sink_capacity.max(2),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/stream", get(stream))
        .route("/stats", get(stats))
        .route("/health", get(health))
        .with_state(state)
}

/// Serves until `shutdown` resolves. The registry is shut down first so that
/// open streams end and the graceful shutdown can complete.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = state.registry.clone();
    if let Ok(addr) = listener.local_addr() {
        info!("event stream listening on http://{addr}/stream");
    }
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move {
            shutdown.await;
            registry.shutdown();
        })
        .await
}

impl IntoResponse for TransportError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": self.to_string() })),
        )
            .into_response()
    }
}

async fn stream(
    State(state): State<AppState>,
    query: Result<Query<ConnectParams>, QueryRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, TransportError> {
    let Query(params) = query.map_err(|e| TransportError::InvalidParameter {
        name: "query",
        reason: e.body_text(),
    })?;
    let handshake = params.validate(state.registry.variants()).inspect_err(|e| {
        warn!("stream handshake rejected: {e}");
    })?;

    let id: SubscriberId = Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel(state.sink_capacity);
    // cannot fail: the channel is fresh and has room
    let _ = tx.try_send(StreamEvent::connected(&id, &handshake.topic.to_string()));

    let subscriber = Subscriber::new(id.clone(), Arc::new(tx), handshake.username, handshake.variant);
    state.registry.add_subscriber(handshake.topic.clone(), subscriber)?;

    let connection = Connection {
        events: rx,
        heartbeat: heartbeat(state.heartbeat),
        _guard: SubscriptionGuard {
            registry: state.registry.clone(),
            topic: handshake.topic,
            id,
        },
    };
    Ok(Sse::new(event_stream(connection)))
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.stats())
}

async fn health() -> &'static str {
    "ok"
}

fn heartbeat(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

struct Connection {
    events: mpsc::Receiver<StreamEvent>,
    heartbeat: Interval,
    _guard: SubscriptionGuard,
}

/// Removes the subscriber when the response body is dropped.
struct SubscriptionGuard {
    registry: Registry,
    topic: TopicKey,
    id: SubscriberId,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        debug!(topic = %self.topic, subscriber = %self.id, "stream closed");
        self.registry.remove_subscriber(&self.topic, &self.id);
    }
}

fn event_stream(connection: Connection) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(connection, |mut conn| async move {
        let event = tokio::select! {
            biased;
            event = conn.events.recv() => event?,
            _ = conn.heartbeat.tick() => StreamEvent::heartbeat(chrono::Utc::now().timestamp_millis()),
        };
        Some((Ok(to_sse(&event)), conn))
    })
}

fn to_sse(event: &StreamEvent) -> Event {
    Event::default()
        .event(&event.name)
        .data(event.data.to_string())
}
