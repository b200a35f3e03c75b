//! Incremental decoder for `text/event-stream` bodies.
//!
//! Bytes arrive in arbitrary chunks; complete events are produced once their
//! terminating blank line has been seen. Comment lines (`:`) are ignored,
//! multiple `data:` lines are joined with `\n`, and an event without an
//! `event:` field is named `message`.

use crate::utils::error::ClientError;

/// Upper bound on the bytes buffered for one event.
pub const MAX_EVENT_BYTES: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub name: String,
    pub data: String,
}

#[derive(Debug)]
pub struct EventDecoder {
    buffer: String,
    pending: Vec<u8>,
    name: Option<String>,
    data: Vec<String>,
    data_len: usize,
    limit: usize,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::with_limit(MAX_EVENT_BYTES)
    }
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: String::new(),
            pending: Vec::new(),
            name: None,
            data: Vec::new(),
            data_len: 0,
            limit,
        }
    }

    /// Feeds a chunk of the body and returns every event it completed.
    ///
    /// Fails once a single event (its unterminated line included) grows past
    /// the decoder's limit; the connection should be dropped then.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<RawEvent>, ClientError> {
        self.pending.extend_from_slice(chunk);
        let complete = complete_prefix(&self.pending);
        let text = String::from_utf8_lossy(&self.pending[..complete]).into_owned();
        self.pending.drain(..complete);
        self.buffer.push_str(&text);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.line(line) {
                events.push(event);
            }
        }

        if self.data_len + self.buffer.len() + self.pending.len() > self.limit {
            return Err(ClientError::EventTooLarge(self.limit));
        }
        Ok(events)
    }

    fn line(&mut self, line: &str) -> Option<RawEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.name = Some(value.to_string()),
            "data" => {
                self.data_len += value.len() + 1;
                self.data.push(value.to_string());
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<RawEvent> {
        let name = self.name.take();
        if self.data.is_empty() {
            return None;
        }
        self.data_len = 0;
        let data = std::mem::take(&mut self.data).join("\n");
        Some(RawEvent {
            name: name.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// Length of the longest prefix that ends on a character boundary. Invalid
/// bytes count as complete (they decode to U+FFFD); a truncated sequence at
/// the very end does not.
fn complete_prefix(bytes: &[u8]) -> usize {
    let mut complete = 0;
    loop {
        match std::str::from_utf8(&bytes[complete..]) {
            Ok(rest) => return complete + rest.len(),
            Err(e) => match e.error_len() {
                Some(invalid) => complete += e.valid_up_to() + invalid,
                None => return complete + e.valid_up_to(),
            },
        }
    }
}
