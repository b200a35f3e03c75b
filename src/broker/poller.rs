//! Topic poller
//!
//! One tokio task per live topic. The first tick fires immediately, later
//! ticks follow the configured interval. A tick reads the topic's parameters,
//! calls the snapshot producer once and hands the outcome back to the
//! registry. The task is aborted when its `PollerHandle` is dropped, which
//! happens when the registry deletes the topic.
//!
//! Panics in the producer are caught and reported as a failed fetch; panics
//! while applying a snapshot are caught and logged. Neither stops the loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Weak;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error};

use crate::broker::engine::{Inner, Registry};
use crate::broker::topic::TopicKey;
use crate::utils::error::ProducerError;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

pub(crate) struct PollerHandle {
    task: JoinHandle<()>,
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for PollerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollerHandle")
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

pub(crate) fn spawn(registry: Weak<Inner>, key: TopicKey, epoch: u64, every: Duration) -> PollerHandle {
    PollerHandle {
        task: tokio::spawn(run(registry, key, epoch, every.max(MIN_INTERVAL))),
    }
}

async fn run(weak: Weak<Inner>, key: TopicKey, epoch: u64, every: Duration) {
    let mut ticker = time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks: u64 = 0;

    loop {
        ticker.tick().await;

        let Some(registry) = Registry::upgrade(&weak) else {
            break;
        };
        let Some(params) = registry.params_for(&key, epoch) else {
            break;
        };
        let producer = registry.producer();
        drop(registry);

        ticks += 1;
        let outcome = match AssertUnwindSafe(producer.fetch(&params))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(topic = %key, "snapshot producer panicked: {message}");
                Err(ProducerError::Panicked(message))
            }
        };

        let Some(registry) = Registry::upgrade(&weak) else {
            break;
        };
        let applied = std::panic::catch_unwind(AssertUnwindSafe(|| {
            registry.apply_snapshot(&key, epoch, outcome)
        }));
        match applied {
            Ok(Some(report)) => debug!(
                topic = %key,
                tick = ticks,
                broadcast = ?report.broadcast,
                unchanged = ?report.unchanged,
                delivered = report.delivered,
                dropped = report.dropped.len(),
                "tick complete"
            ),
            // topic was torn down (or re-created) while we were fetching
            Ok(None) => break,
            Err(panic) => error!(
                topic = %key,
                tick = ticks,
                "applying snapshot panicked: {}",
                panic_message(panic.as_ref())
            ),
        }
    }

    debug!(topic = %key, ticks, "poller stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
