//! Fail-safe delivery of one event to many subscribers.
//!
//! Every subscriber is written independently. A failed write never affects
//! the others; the failing ids are handed back so the registry can drop them.

use tracing::warn;

use crate::broker::message::StreamEvent;
use crate::broker::subscriber::{Subscriber, SubscriberId};

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: Vec<SubscriberId>,
}

impl Delivery {
    pub fn merge(&mut self, other: Delivery) {
        self.delivered += other.delivered;
        self.failed.extend(other.failed);
    }
}

/// Writes `event` to a single subscriber, logging a failure.
pub fn send(subscriber: &Subscriber, event: &StreamEvent) -> bool {
    match subscriber.send(event) {
        Ok(()) => true,
        Err(e) => {
            warn!(
                subscriber = %subscriber.id,
                name = %subscriber.display_name,
                event = %event.name,
                "write failed, dropping subscriber: {e}"
            );
            false
        }
    }
}

pub fn broadcast<'a>(
    subscribers: impl IntoIterator<Item = &'a Subscriber>,
    event: &StreamEvent,
) -> Delivery {
    let mut delivery = Delivery::default();
    for subscriber in subscribers {
        if send(subscriber, event) {
            delivery.delivered += 1;
        } else {
            delivery.failed.push(subscriber.id.clone());
        }
    }
    delivery
}
