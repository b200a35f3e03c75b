//! Subscription registry
//!
//! The `Registry` owns every live topic: its subscribers, its poller and the
//! last payload/hash seen per variant. It is the only place topic state is
//! mutated.
//!
//! Concurrency notes:
//! - Topics live in a `DashMap`, so different topics never contend on one
//!   lock. All mutation of a topic happens under its map entry guard, which
//!   serializes subscriber add/remove against the snapshot-applying half of a
//!   poll tick. No guard is held across an `.await`.
//! - A topic has a poller iff it has subscribers: the poller is started by
//!   the first `add_subscriber` and aborted (by dropping the topic state) when
//!   the last subscriber is removed.
//! - The producer call itself runs outside the guard, so a slow producer
//!   never blocks joins or leaves. Subscribers that join while a fetch is in
//!   flight are still considered by that tick.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::broker::broadcast::{self, Delivery};
use crate::broker::hash::ContentHash;
use crate::broker::message::StreamEvent;
use crate::broker::poller;
use crate::broker::producer::SnapshotProducer;
use crate::broker::subscriber::{Subscriber, SubscriberId};
use crate::broker::topic::{TopicKey, TopicState};
use crate::broker::variant::{VariantTag, Variants};
use crate::utils::error::{EngineError, ProducerError};

/// Tunables of the engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub poll_interval: Duration,
    pub data_event: String,
    pub error_event: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            data_event: "update".to_string(),
            error_event: "error".to_string(),
        }
    }
}

/// What a single tick did, for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Variants whose content changed and were pushed.
    pub broadcast: Vec<VariantTag>,
    /// Variants whose hash matched the cached one.
    pub unchanged: Vec<VariantTag>,
    /// The producer failed; an error event went out instead.
    pub failed: bool,
    pub delivered: usize,
    /// Subscribers removed because a write to them failed.
    pub dropped: Vec<SubscriberId>,
}

pub(crate) struct Inner {
    topics: DashMap<TopicKey, TopicState>,
    producer: Arc<dyn SnapshotProducer>,
    variants: Variants,
    options: EngineOptions,
    epochs: AtomicU64,
}

/// Cheap to clone; all clones share the same topics.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    pub fn new(producer: Arc<dyn SnapshotProducer>, variants: Variants, options: EngineOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: DashMap::new(),
                producer,
                variants,
                options,
                epochs: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn upgrade(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn variants(&self) -> &Variants {
        &self.inner.variants
    }

    /// Adds `subscriber` to `key`, creating the topic and starting its poller
    /// when it is the first one.
    ///
    /// If a payload is already cached for the subscriber's variant it is
    /// written right away. That write is best-effort: a failure is logged and
    /// otherwise ignored.
    pub fn add_subscriber(&self, key: TopicKey, subscriber: Subscriber) -> Result<(), EngineError> {
        if !self.inner.variants.contains(&subscriber.variant) {
            return Err(EngineError::UnknownVariant(subscriber.variant.to_string()));
        }

        let mut entry = self.inner.topics.entry(key.clone()).or_insert_with(|| {
            let epoch = self.inner.epochs.fetch_add(1, Ordering::Relaxed);
            info!(topic = %key, "topic created");
            TopicState::new(key.clone(), epoch)
        });
        let state = &mut *entry;

        if let Some(payload) = state.last_payload.get(&subscriber.variant) {
            let event = StreamEvent::new(&self.inner.options.data_event, payload.clone());
            if let Err(e) = subscriber.send(&event) {
                debug!(topic = %key, subscriber = %subscriber.id, "cached payload not delivered: {e}");
            }
        }

        info!(
            topic = %key,
            subscriber = %subscriber.id,
            name = %subscriber.display_name,
            variant = %subscriber.variant,
            "subscriber joined"
        );
        if let Some(old) = state.subscribers.insert(subscriber.id.clone(), subscriber) {
            warn!(topic = %key, subscriber = %old.id, "replaced subscriber with the same id");
        }

        if state.poller.is_none() {
            state.poller = Some(poller::spawn(
                Arc::downgrade(&self.inner),
                key.clone(),
                state.epoch,
                self.inner.options.poll_interval,
            ));
        }
        Ok(())
    }

    /// Removes a subscriber. Deletes the topic, stopping its poller, when it
    /// was the last one. Unknown topics and ids are a no-op; returns whether
    /// anything was removed.
    pub fn remove_subscriber(&self, key: &TopicKey, id: &SubscriberId) -> bool {
        let now_empty = match self.inner.topics.get_mut(key) {
            None => return false,
            Some(mut state) => {
                let Some(removed) = state.subscribers.remove(id) else {
                    return false;
                };
                info!(topic = %key, subscriber = %removed.id, name = %removed.display_name, "subscriber left");
                // ticks only refresh variants someone watches
                if !state.subscribers.values().any(|s| s.variant == removed.variant) {
                    state.last_payload.remove(&removed.variant);
                    state.last_hash.remove(&removed.variant);
                }
                state.subscribers.is_empty()
            }
        };

        if now_empty {
            // re-checked under the entry lock: someone may have joined meanwhile
            if let Some((_, state)) = self.inner.topics.remove_if(key, |_, s| s.subscribers.is_empty()) {
                drop(state);
                info!(topic = %key, "last subscriber left, topic closed");
            }
        }
        true
    }

    /// Subscriber count per topic, keyed by the topic's string form.
    pub fn stats(&self) -> BTreeMap<String, usize> {
        self.inner
            .topics
            .iter()
            .map(|entry| (entry.key().to_string(), entry.subscribers.len()))
            .collect()
    }

    pub fn topic_count(&self) -> usize {
        self.inner.topics.len()
    }

    pub fn subscriber_count(&self, key: &TopicKey) -> usize {
        self.inner.topics.get(key).map_or(0, |s| s.subscribers.len())
    }

    pub fn is_polling(&self, key: &TopicKey) -> bool {
        self.inner.topics.get(key).is_some_and(|s| s.is_polling())
    }

    /// Drops every topic and stops every poller.
    pub fn shutdown(&self) {
        let topics = self.inner.topics.len();
        self.inner.topics.clear();
        info!(topics, "registry shut down");
    }

    pub(crate) fn producer(&self) -> Arc<dyn SnapshotProducer> {
        self.inner.producer.clone()
    }

    /// Current parameters of the topic, if it still is the same incarnation.
    pub(crate) fn params_for(&self, key: &TopicKey, epoch: u64) -> Option<TopicKey> {
        self.inner
            .topics
            .get(key)
            .filter(|s| s.epoch == epoch)
            .map(|s| s.params.clone())
    }

    /// Applies one fetch outcome to a topic. Returns `None` when the topic is
    /// gone or was re-created since the fetch started.
    ///
    /// Views are derived and hashed before the topic entry is locked; the lock
    /// only covers comparing, caching and writing to sinks.
    pub(crate) fn apply_snapshot(
        &self,
        key: &TopicKey,
        epoch: u64,
        outcome: Result<Value, ProducerError>,
    ) -> Option<TickReport> {
        let mut report = TickReport::default();
        let mut delivery = Delivery::default();

        let snapshot = match outcome {
            Ok(snapshot) => snapshot,
            Err(err) => {
                let state = self.inner.topics.get(key).filter(|s| s.epoch == epoch)?;
                warn!(topic = %key, "snapshot fetch failed: {err}");
                report.failed = true;
                let event = StreamEvent::error(&self.inner.options.error_event, err.to_string());
                delivery.merge(broadcast::broadcast(state.subscribers.values(), &event));
                drop(state);
                return Some(self.finish(key, report, delivery));
            }
        };

        let tags = self.watched_variants(key, epoch)?;
        let mut views: HashMap<VariantTag, Option<(Value, ContentHash)>> = tags
            .into_iter()
            .map(|tag| {
                let view = self.view(key, &tag, &snapshot);
                (tag, view)
            })
            .collect();

        {
            let mut guard = self.inner.topics.get_mut(key).filter(|s| s.epoch == epoch)?;
            let state = &mut *guard;

            let tags: BTreeSet<VariantTag> =
                state.subscribers.values().map(|s| s.variant.clone()).collect();
            for tag in tags {
                // a subscriber with a new variant joined while views were derived
                let view = match views.remove(&tag) {
                    Some(view) => view,
                    None => self.view(key, &tag, &snapshot),
                };
                let Some((payload, hash)) = view else {
                    continue;
                };

                let changed = state.last_hash.get(&tag) != Some(&hash);
                state.last_hash.insert(tag.clone(), hash);
                state.last_payload.insert(tag.clone(), payload.clone());

                if !changed {
                    debug!(topic = %key, variant = %tag, %hash, "unchanged, skipping");
                    report.unchanged.push(tag);
                    continue;
                }

                let event = StreamEvent::new(&self.inner.options.data_event, payload);
                let audience = state.subscribers.values().filter(|s| s.variant == tag);
                delivery.merge(broadcast::broadcast(audience, &event));
                report.broadcast.push(tag);
            }
        }

        Some(self.finish(key, report, delivery))
    }

    /// Distinct variants of the topic's current subscribers.
    fn watched_variants(&self, key: &TopicKey, epoch: u64) -> Option<BTreeSet<VariantTag>> {
        self.inner
            .topics
            .get(key)
            .filter(|s| s.epoch == epoch)
            .map(|s| s.subscribers.values().map(|s| s.variant.clone()).collect())
    }

    fn view(&self, key: &TopicKey, tag: &VariantTag, snapshot: &Value) -> Option<(Value, ContentHash)> {
        let Some(payload) = self.inner.variants.apply(tag, snapshot) else {
            warn!(topic = %key, variant = %tag, "no filter registered");
            return None;
        };
        match ContentHash::of(&payload) {
            Ok(hash) => Some((payload, hash)),
            Err(e) => {
                warn!(topic = %key, variant = %tag, "payload not serializable: {e}");
                None
            }
        }
    }

    /// Drops the subscribers whose write failed. Runs without any topic lock
    /// held.
    fn finish(&self, key: &TopicKey, mut report: TickReport, delivery: Delivery) -> TickReport {
        for id in &delivery.failed {
            self.remove_subscriber(key, id);
        }
        report.delivered = delivery.delivered;
        report.dropped = delivery.failed;
        report
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("topics", &self.inner.topics.len())
            .field("variants", &self.inner.variants)
            .field("options", &self.inner.options)
            .finish()
    }
}
