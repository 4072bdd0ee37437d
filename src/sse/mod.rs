//! Server-sent events transport
//!
//! Delivers raw event payloads from the upstream score feed to the
//! ingestion pipeline.

mod client;
mod parser;

pub use client::{SseClient, SseError};
pub use parser::{Event, EventParser, OversizedEvent, DEFAULT_MAX_EVENT_BYTES};
