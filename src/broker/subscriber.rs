//! Subscriber representation
//!
//! A `Subscriber` is one streaming connection attached to a topic. The
//! registry writes events through its `EventSink`; any failed write is
//! treated as a disconnect and the subscriber is dropped.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::broker::message::StreamEvent;
use crate::broker::variant::VariantTag;
use crate::utils::error::SinkError;

pub type SubscriberId = String;

/// Write handle to a subscriber's transport.
///
/// Implementations must not block: a slow subscriber has to fail fast
/// instead of stalling delivery to the rest of its topic.
pub trait EventSink: Send + Sync + 'static {
    fn deliver(&self, event: &StreamEvent) -> Result<(), SinkError>;
}

impl EventSink for mpsc::Sender<StreamEvent> {
    fn deliver(&self, event: &StreamEvent) -> Result<(), SinkError> {
        self.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

impl EventSink for mpsc::UnboundedSender<StreamEvent> {
    fn deliver(&self, event: &StreamEvent) -> Result<(), SinkError> {
        self.send(event.clone()).map_err(|_| SinkError::Closed)
    }
}

#[derive(Clone)]
pub struct Subscriber {
    pub id: SubscriberId,
    pub sink: Arc<dyn EventSink>,
    /// Diagnostic only.
    pub display_name: String,
    pub variant: VariantTag,
}

impl Subscriber {
    pub fn new(
        id: impl Into<SubscriberId>,
        sink: Arc<dyn EventSink>,
        display_name: impl Into<String>,
        variant: VariantTag,
    ) -> Self {
        Self {
            id: id.into(),
            sink,
            display_name: display_name.into(),
            variant,
        }
    }

    pub fn send(&self, event: &StreamEvent) -> Result<(), SinkError> {
        self.sink.deliver(event)
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("variant", &self.variant)
            .finish()
    }
}
