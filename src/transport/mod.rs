//! The `transport` module serves the event stream over HTTP.
//!
//! `GET /stream` validates the handshake query, registers a subscriber with
//! the registry and answers with a Server-Sent Events body carrying the
//! `connected` acknowledgement, periodic heartbeats and whatever the engine
//! broadcasts. `GET /stats` exposes subscriber counts per topic.

pub mod message;
pub mod sse;

pub use message::{ConnectParams, Handshake};
pub use sse::{AppState, build_router, serve};
