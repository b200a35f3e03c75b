//! The `source` module provides the snapshot producer used by the `pollcast`
//! binary: one JSON document per topic scope, read from a data directory.
//!
//! Embedding applications usually bring their own `SnapshotProducer`; this one
//! is enough to run the server against files that some other process keeps
//! up to date.

pub mod file_store;

pub use file_store::FileSnapshotProducer;
