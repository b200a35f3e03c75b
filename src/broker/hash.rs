//! Change detection for snapshot payloads.
//!
//! A payload is hashed over its compact `serde_json` serialization. Object key
//! order is preserved (`preserve_order`), so two payloads hash equal only if
//! their content, types and key order match. blake3 is used for speed; the
//! engine needs deduplication here, not collision resistance.

use std::fmt;

use serde_json::Value;

/// A 256-bit content hash (blake3 output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(payload: &Value) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(payload)?;
        Ok(Self(*blake3::hash(&bytes).as_bytes()))
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // first 16 hex chars are plenty for logs
        write!(f, "{}", &self.to_hex()[..16])
    }
}
