//! Scoreboard - an indexed in-memory store for streamed exam scores
//!
//! Scoreboard is designed with strong cohesion and loose coupling principles:
//! - `store` is a generic multi-indexed record store with snapshot reads
//! - `scores` defines the score table and the read-side aggregations
//! - `ingest` and `sse` feed the store from an upstream event stream
//! - `web` exposes the aggregations over HTTP

pub mod config;
pub mod ingest;
pub mod scores;
pub mod sse;
pub mod store;
pub mod web;

/// Re-export commonly used types
pub use config::Config;
pub use ingest::{ErrorPolicy, IngestStats, Ingestor};
pub use scores::{Score, ScoreQueries, ScoreStore};
pub use store::{IndexedStore, KeyValue, Record, StoreError};
