//! Incremental SSE framing for the chat stream.
//!
//! Bytes arrive in arbitrary chunks: a chunk may end inside a UTF-8
//! sequence, a line or an event delimiter. [`SseFramer`] keeps whatever is
//! incomplete and only hands out the `data:` payloads of fully delimited
//! events.

use serde_json::Value;
use thiserror::Error;

pub const DATA_PREFIX: &str = "data:";
pub const DONE_SENTINEL: &str = "[DONE]";
pub const EVENT_DELIMITER: &str = "\n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Token(String),
    Done,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("event payload has no token")]
    MissingToken,
}

/// Interprets one `data:` payload.
///
/// Empty payloads and `[DONE]` are [`StreamEvent::Done`]; callers treat them
/// as no-ops rather than as the end of the transport.
pub fn parse_payload(payload: &str) -> Result<StreamEvent, ParseError> {
    let payload = payload.trim();
    if payload.is_empty() || payload == DONE_SENTINEL {
        return Ok(StreamEvent::Done);
    }

    let value: Value = serde_json::from_str(payload)?;
    match value.get("token").and_then(Value::as_str) {
        Some(token) => Ok(StreamEvent::Token(token.to_string())),
        None => Err(ParseError::MissingToken),
    }
}

#[derive(Debug, Default)]
pub struct SseFramer {
    undecoded: Vec<u8>,
    buffer: String,
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one transport chunk and returns the payloads of every event it
    /// completed, in stream order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.decode(chunk);
        self.drain_events()
    }

    /// Text received after the last complete event.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    fn decode(&mut self, chunk: &[u8]) {
        self.undecoded.extend_from_slice(chunk);

        let mut start = 0;
        while start < self.undecoded.len() {
            match std::str::from_utf8(&self.undecoded[start..]) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    start = self.undecoded.len();
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&self.undecoded[start..valid_end]));
                    start = valid_end;
                    match e.error_len() {
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            start += len;
                        }
                        // truncated sequence, wait for the rest
                        None => break,
                    }
                }
            }
        }

        self.undecoded.drain(..start);
    }

    fn drain_events(&mut self) -> Vec<String> {
        let mut payloads = Vec::new();

        while let Some(end) = self.buffer.find(EVENT_DELIMITER) {
            let event: String = self.buffer.drain(..end + EVENT_DELIMITER.len()).collect();
            for line in event[..end].split('\n') {
                if let Some(data) = line.strip_prefix(DATA_PREFIX) {
                    payloads.push(data.trim().to_string());
                }
            }
        }

        payloads
    }
}
