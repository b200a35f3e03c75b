//! # Pollcast
//!
//! `pollcast` turns periodically polled snapshots into a live event stream.
//! Clients subscribe to a topic over Server-Sent Events; the server polls one
//! snapshot per topic, detects changes by content hash, and pushes each
//! subscriber the view variant it asked for.
//!
//! ## Core Modules
//!
//! - `broker`: subscription registry, per-topic pollers, change detection,
//!   view variants and broadcasting.
//! - `client`: the reconnecting stream consumer.
//! - `config`: loading and merging server and client configuration.
//! - `source`: the file-backed snapshot producer used by the binary.
//! - `transport`: the SSE endpoint and its handshake.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod source;
pub mod transport;
pub mod utils;
