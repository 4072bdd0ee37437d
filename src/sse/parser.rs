//! `text/event-stream` line parser
//!
//! Works on raw bytes: event payloads are opaque and are only decoded by
//! ingestion, so a malformed payload never breaks the stream itself.

use bytes::{Bytes, BytesMut};
use std::fmt;

/// Default cap on one event's accumulated `data`
pub const DEFAULT_MAX_EVENT_BYTES: usize = 1024 * 1024;

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: Bytes,
}

/// An event whose data grew past the parser's limit
///
/// The rest of that event is skipped up to the next blank line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OversizedEvent {
    pub limit: usize,
}

impl fmt::Display for OversizedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event exceeds size limit of {} bytes", self.limit)
    }
}

impl std::error::Error for OversizedEvent {}

/// Incremental parser fed one line at a time
///
/// `data:` lines accumulate (joined with `\n`), a blank line dispatches the
/// event. Comment lines and unknown fields are ignored, and an event with
/// no data is dropped.
#[derive(Debug)]
pub struct EventParser {
    data: BytesMut,
    has_data: bool,
    event: Option<String>,
    id: Option<String>,
    max_event_bytes: usize,
    skipping: bool,
}

impl Default for EventParser {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_EVENT_BYTES)
    }
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_event_bytes: usize) -> Self {
        EventParser {
            data: BytesMut::new(),
            has_data: false,
            event: None,
            id: None,
            max_event_bytes,
            skipping: false,
        }
    }

    pub fn max_event_bytes(&self) -> usize {
        self.max_event_bytes
    }

    /// Last event id seen on this stream
    pub fn last_event_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Feed one line (with or without its line terminator)
    ///
    /// Returns `Err` once for an event whose data exceeds the limit.
    pub fn feed_line(&mut self, line: &[u8]) -> Result<Option<Event>, OversizedEvent> {
        let line = trim_line_end(line);

        if line.is_empty() {
            return Ok(self.dispatch());
        }
        if line[0] == b':' {
            return Ok(None);
        }

        let (field, value) = match line.iter().position(|&b| b == b':') {
            Some(colon) => {
                let value = &line[colon + 1..];
                (&line[..colon], value.strip_prefix(b" ").unwrap_or(value))
            }
            None => (line, &[][..]),
        };

        match field {
            b"data" => return self.push_data(value),
            b"event" => self.event = Some(String::from_utf8_lossy(value).into_owned()),
            // An id containing NUL is ignored
            b"id" if !value.contains(&0) => {
                self.id = Some(String::from_utf8_lossy(value).into_owned())
            }
            _ => {}
        }
        Ok(None)
    }

    /// Drop the event being read; its remaining lines are ignored
    ///
    /// Used when a single line is too long to buffer.
    pub fn skip_event(&mut self) -> OversizedEvent {
        self.clear_event();
        self.skipping = true;
        OversizedEvent {
            limit: self.max_event_bytes,
        }
    }

    /// Drop any partially-read event (after a reconnect)
    pub fn reset(&mut self) {
        self.clear_event();
        self.skipping = false;
    }

    fn push_data(&mut self, value: &[u8]) -> Result<Option<Event>, OversizedEvent> {
        if self.skipping {
            return Ok(None);
        }

        let separator = usize::from(self.has_data);
        if self.data.len() + separator + value.len() > self.max_event_bytes {
            return Err(self.skip_event());
        }

        if self.has_data {
            self.data.extend_from_slice(b"\n");
        }
        self.data.extend_from_slice(value);
        self.has_data = true;
        Ok(None)
    }

    fn dispatch(&mut self) -> Option<Event> {
        if self.skipping || !self.has_data {
            self.skipping = false;
            self.clear_event();
            return None;
        }

        let data = self.data.split().freeze();
        self.has_data = false;

        Some(Event {
            event: self.event.take(),
            id: self.id.clone(),
            data,
        })
    }

    fn clear_event(&mut self) {
        self.data.clear();
        self.has_data = false;
        self.event = None;
    }
}

fn trim_line_end(mut line: &[u8]) -> &[u8] {
    while let [rest @ .., b'\n' | b'\r'] = line {
        line = rest;
    }
    line
}
