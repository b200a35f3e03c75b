//! Topic keys and per-topic state.
//!
//! A topic is derived from the filtering parameters of a stream request. Two
//! requests with the same parameters share one `TopicState`, and with it one
//! poll cycle. Callers must go through the registry to touch a `TopicState`.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

use crate::broker::hash::ContentHash;
use crate::broker::poller::PollerHandle;
use crate::broker::subscriber::{Subscriber, SubscriberId};
use crate::broker::variant::VariantTag;

/// Defining parameters of a topic.
///
/// The string form (`Display`) is `<project|all>:<display_mode>`, e.g.
/// `P1:false` or `all:true`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicKey {
    pub project: Option<String>,
    pub display_mode: bool,
}

impl TopicKey {
    pub fn new(project: Option<String>, display_mode: bool) -> Self {
        Self {
            project,
            display_mode,
        }
    }

    /// Topic covering every project.
    pub fn all(display_mode: bool) -> Self {
        Self::new(None, display_mode)
    }

    pub fn project(id: impl Into<String>, display_mode: bool) -> Self {
        Self::new(Some(id.into()), display_mode)
    }

    /// Project ids double as file names and key segments: 1 to 64 characters
    /// from `[A-Za-z0-9_.-]`, not starting with a dot.
    pub fn is_valid_project_id(id: &str) -> bool {
        !id.is_empty()
            && id.len() <= 64
            && !id.starts_with('.')
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }

    /// `project` id, or `"all"` when unscoped.
    pub fn scope(&self) -> &str {
        self.project.as_deref().unwrap_or("all")
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope(), self.display_mode)
    }
}

/// Everything the registry tracks for one live topic.
///
/// `poller` is `Some` exactly while `subscribers` is non-empty; the registry
/// deletes the whole state (stopping the poller) when the last subscriber
/// leaves.
#[derive(Debug)]
pub struct TopicState {
    pub params: TopicKey,
    pub subscribers: HashMap<SubscriberId, Subscriber>,
    pub last_payload: HashMap<VariantTag, Value>,
    pub last_hash: HashMap<VariantTag, ContentHash>,
    pub(crate) poller: Option<PollerHandle>,
    /// Distinguishes this incarnation of the topic from an earlier one with
    /// the same key, so a stale poller cannot write into a re-created topic.
    pub(crate) epoch: u64,
}

impl TopicState {
    pub(crate) fn new(params: TopicKey, epoch: u64) -> Self {
        Self {
            params,
            subscribers: HashMap::new(),
            last_payload: HashMap::new(),
            last_hash: HashMap::new(),
            poller: None,
            epoch,
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_some()
    }
}
