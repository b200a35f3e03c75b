//! The `utils` module provides the pieces shared by every other area of
//! `pollcast`: the error types and the logging bootstrap.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests;
