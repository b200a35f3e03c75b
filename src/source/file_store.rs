use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::broker::producer::SnapshotProducer;
use crate::broker::topic::TopicKey;
use crate::utils::error::ProducerError;

/// Reads `<data_dir>/<scope>.json`, where scope is the project id or `all`.
///
/// The document is wrapped with the topic it was read for:
///
/// ```json
/// { "topic": "P1:false", "project": "P1", "displayMode": false, "data": { ... } }
/// ```
#[derive(Debug, Clone)]
pub struct FileSnapshotProducer {
    data_dir: PathBuf,
    latency: Option<Duration>,
}

impl FileSnapshotProducer {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            latency: None,
        }
    }

    /// Sleeps this long before every read, to imitate an expensive query.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = (!latency.is_zero()).then_some(latency);
        self
    }

    fn path_for(&self, topic: &TopicKey) -> Result<PathBuf, ProducerError> {
        let scope = topic.scope();
        if !TopicKey::is_valid_project_id(scope) {
            return Err(ProducerError::Failed(format!("refusing to read scope '{scope}'")));
        }
        Ok(self.data_dir.join(format!("{scope}.json")))
    }
}

#[async_trait]
impl SnapshotProducer for FileSnapshotProducer {
    async fn fetch(&self, topic: &TopicKey) -> Result<Value, ProducerError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let path = self.path_for(topic)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProducerError::NotFound(topic.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        debug!(topic = %topic, path = %path.display(), bytes = bytes.len(), "snapshot read");

        let data: Value = serde_json::from_slice(&bytes)?;
        Ok(json!({
            "topic": topic.to_string(),
            "project": topic.project,
            "displayMode": topic.display_mode,
            "data": data,
        }))
    }
}
