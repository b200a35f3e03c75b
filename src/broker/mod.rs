//! The broadcast engine.
//!
//! Turns a slow, poll-only snapshot producer into live pushes for many
//! subscribers. Subscribers are grouped into topics; each topic is polled by
//! one task while it has subscribers, every variant of the snapshot is hashed
//! and only variants whose content changed are sent.

pub mod broadcast;
pub mod engine;
pub mod hash;
pub mod message;
pub mod poller;
pub mod producer;
pub mod subscriber;
pub mod topic;
pub mod variant;

pub use engine::{EngineOptions, Registry, TickReport};
pub use message::StreamEvent;
pub use producer::SnapshotProducer;
pub use subscriber::{EventSink, Subscriber, SubscriberId};
pub use topic::TopicKey;
pub use variant::{VariantTag, Variants, ViewFilter};
