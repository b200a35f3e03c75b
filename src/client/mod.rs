//! The `client` module is the consuming side of the event stream.
//!
//! `Reconnector` opens the stream, dispatches named events to registered
//! handlers and, whenever the transport fails, tears the connection down and
//! opens a new one after a backoff delay, for as long as its feature flag
//! stays on.

pub mod decoder;
pub mod policy;
pub mod reconnector;

pub use decoder::{EventDecoder, RawEvent};
pub use policy::ReconnectPolicy;
pub use reconnector::Reconnector;

#[cfg(test)]
mod tests;
