//! Visibility variants of a snapshot.
//!
//! Every subscriber carries a `VariantTag` that picks the filtered view of
//! the topic's snapshot it receives. Tags form an open set: each one is
//! registered in `Variants` together with the `ViewFilter` that derives it.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

pub const INTERNAL: &str = "internal";
pub const EXTERNAL: &str = "external";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantTag(String);

impl VariantTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VariantTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl fmt::Display for VariantTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives a restricted view of a snapshot. Must be pure and cheap.
pub trait ViewFilter: Send + Sync + 'static {
    fn filter(&self, snapshot: &Value) -> Value;
}

impl<F> ViewFilter for F
where
    F: Fn(&Value) -> Value + Send + Sync + 'static,
{
    fn filter(&self, snapshot: &Value) -> Value {
        self(snapshot)
    }
}

/// Passes the snapshot through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl ViewFilter for Identity {
    fn filter(&self, snapshot: &Value) -> Value {
        snapshot.clone()
    }
}

/// Removes the named object fields at every depth.
#[derive(Debug, Clone, Default)]
pub struct RedactFields {
    fields: HashSet<String>,
}

impl RedactFields {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    fn redact(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .filter(|(k, _)| !self.fields.contains(k.as_str()))
                    .map(|(k, v)| (k.clone(), self.redact(v)))
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact(v)).collect()),
            other => other.clone(),
        }
    }
}

impl ViewFilter for RedactFields {
    fn filter(&self, snapshot: &Value) -> Value {
        self.redact(snapshot)
    }
}

/// The set of known variant tags and the filter registered for each.
#[derive(Clone, Default)]
pub struct Variants {
    filters: HashMap<VariantTag, Arc<dyn ViewFilter>>,
}

impl Variants {
    pub fn new() -> Self {
        Self::default()
    }

    /// `internal` sees everything, `external` loses `hidden_fields`.
    pub fn internal_external<I, S>(hidden_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new()
            .register(INTERNAL, Identity)
            .register(EXTERNAL, RedactFields::new(hidden_fields))
    }

    /// Registers (or replaces) the filter for `tag`.
    pub fn register(mut self, tag: impl Into<VariantTag>, filter: impl ViewFilter) -> Self {
        self.filters.insert(tag.into(), Arc::new(filter));
        self
    }

    pub fn contains(&self, tag: &VariantTag) -> bool {
        self.filters.contains_key(tag)
    }

    /// Derives the payload for `tag`, or `None` when the tag is unknown.
    pub fn apply(&self, tag: &VariantTag, snapshot: &Value) -> Option<Value> {
        self.filters.get(tag).map(|f| f.filter(snapshot))
    }

    pub fn tags(&self) -> impl Iterator<Item = &VariantTag> {
        self.filters.keys()
    }
}

impl fmt::Debug for Variants {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.filters.keys()).finish()
    }
}
