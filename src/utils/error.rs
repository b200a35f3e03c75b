//! Error types used across `pollcast`.
//!
//! Each area owns one enum. None of them is fatal to the hosting process:
//! producer and sink failures are recovered inside the engine, handshake
//! failures become HTTP 400 responses and client errors feed the reconnect
//! loop.

use thiserror::Error;

/// Errors returned by the subscription registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown view variant '{0}'")]
    UnknownVariant(String),
}

/// Failure of a single snapshot fetch.
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("no snapshot available for {0}")]
    NotFound(String),

    #[error("snapshot source I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot producer panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),
}

/// A write to a subscriber's transport sink did not go through.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    #[error("subscriber stream is closed")]
    Closed,

    #[error("subscriber stream is full")]
    Full,
}

/// Rejection of a streaming handshake. No subscriber is registered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("missing required parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Errors surfaced by the reconnecting stream client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid stream url: {0}")]
    InvalidUrl(String),

    #[error("server rejected the stream handshake ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected response status {0}")]
    Status(u16),

    #[error("event exceeds {0} bytes without a terminating blank line")]
    EventTooLarge(usize),

    #[error("stream ended")]
    Ended,
}
