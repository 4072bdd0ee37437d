//! Ingestion pipeline
//!
//! Consumes raw event payloads from a channel, decodes each into a `Score`
//! and upserts it. This is the store's only long-lived writer; run exactly
//! one `Ingestor` per event subscription.

use crate::scores::{DecodeError, Score, ScoreStore};
use crate::store::StoreError;
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What to do with an event that cannot be decoded or stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Log the event and keep ingesting
    #[default]
    Skip,
    /// Stop ingesting and return the error
    Stop,
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(ErrorPolicy::Skip),
            "stop" => Ok(ErrorPolicy::Stop),
            other => Err(format!("unknown ingest error policy '{}' (expected skip or stop)", other)),
        }
    }
}

/// Counters for one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub received: u64,
    pub stored: u64,
    pub skipped: u64,
}

/// A single event that failed
#[derive(Debug)]
pub enum IngestError {
    Decode(DecodeError),
    Store(StoreError),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Decode(e) => write!(f, "failed to decode event: {}", e),
            IngestError::Store(e) => write!(f, "failed to store event: {}", e),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Decode(e) => Some(e),
            IngestError::Store(e) => Some(e),
        }
    }
}

/// Ingestion ended because an event failed under `ErrorPolicy::Stop`
#[derive(Debug)]
pub struct IngestAborted {
    pub stats: IngestStats,
    pub error: IngestError,
}

impl fmt::Display for IngestAborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ingestion stopped after {} events: {}", self.stats.received, self.error)
    }
}

impl std::error::Error for IngestAborted {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

pub struct Ingestor {
    store: Arc<ScoreStore>,
    policy: ErrorPolicy,
}

impl Ingestor {
    pub fn new(store: Arc<ScoreStore>, policy: ErrorPolicy) -> Self {
        Ingestor { store, policy }
    }

    /// Decode and store one payload
    pub fn handle(&self, payload: &[u8]) -> Result<Score, IngestError> {
        let score = Score::from_json(payload).map_err(IngestError::Decode)?;
        self.store
            .upsert(score.clone())
            .map_err(IngestError::Store)?;
        Ok(score)
    }

    /// Run until the channel closes or `shutdown` is cancelled
    ///
    /// A write in progress always completes before shutdown is observed.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<Bytes>,
        shutdown: CancellationToken,
    ) -> Result<IngestStats, IngestAborted> {
        info!(policy = ?self.policy, "Ingestion starting");
        let mut stats = IngestStats::default();

        loop {
            let payload = tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Ingestion received shutdown signal");
                    break;
                }

                next = events.recv() => match next {
                    Some(payload) => payload,
                    None => {
                        info!("Event channel closed");
                        break;
                    }
                },
            };

            stats.received += 1;
            match self.handle(&payload) {
                Ok(score) => {
                    stats.stored += 1;
                    debug!(exam = score.exam, student = %score.student_id, score = score.score, "stored score");
                }
                Err(e) => match self.policy {
                    ErrorPolicy::Skip => {
                        stats.skipped += 1;
                        warn!(
                            "Skipping event: {} (payload: {})",
                            e,
                            String::from_utf8_lossy(&payload)
                        );
                    }
                    ErrorPolicy::Stop => {
                        error!("Stopping ingestion: {}", e);
                        return Err(IngestAborted { stats, error: e });
                    }
                },
            }
        }

        info!(
            received = stats.received,
            stored = stats.stored,
            skipped = stats.skipped,
            "Ingestion stopped"
        );
        Ok(stats)
    }
}
