use tracing::warn;

use crate::domain::errors::TransportError;
use crate::domain::value_objects::DetectionEvent;

/// Longest accepted line of the event stream
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Incremental decoder for newline-delimited JSON detection events.
///
/// Chunks may split lines anywhere; blank and malformed lines are skipped.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
    skipped: u64,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines dropped as malformed so far
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<DetectionEvent>, TransportError> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = self.decode_line(&line[..line.len() - 1]) {
                events.push(event);
            }
        }

        if self.buffer.len() > MAX_LINE_BYTES {
            return Err(TransportError::LineTooLong(MAX_LINE_BYTES));
        }
        Ok(events)
    }

    /// Decode what is left once the body ended without a final newline
    pub fn finish(&mut self) -> Option<DetectionEvent> {
        let rest = std::mem::take(&mut self.buffer);
        self.decode_line(&rest)
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<DetectionEvent> {
        let line = trim_ascii(line);
        if line.is_empty() {
            return None;
        }

        match serde_json::from_slice::<DetectionEvent>(line) {
            Ok(event) => Some(event),
            Err(e) => {
                self.skipped += 1;
                warn!(error = %e, bytes = line.len(), "Skipping malformed detection event");
                None
            }
        }
    }
}

fn trim_ascii(mut bytes: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = bytes {
        if first.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = bytes {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}
