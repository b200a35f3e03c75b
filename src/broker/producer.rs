//! The upstream data source contract.

use async_trait::async_trait;
use serde_json::Value;

use crate::broker::topic::TopicKey;
use crate::utils::error::ProducerError;

/// Supplies the full current snapshot for a topic.
///
/// Calls may be slow. The engine never runs two fetches for the same topic at
/// once, but fetches for different topics run concurrently. Implementations
/// must be safe to call repeatedly with the same key.
#[async_trait]
pub trait SnapshotProducer: Send + Sync + 'static {
    async fn fetch(&self, topic: &TopicKey) -> Result<Value, ProducerError>;
}
