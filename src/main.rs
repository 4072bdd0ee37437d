use anyhow::Context;
use scoreboard::ingest::IngestAborted;
use scoreboard::{config::Config, scores, sse::SseClient, web, IngestStats, Ingestor, ScoreQueries};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Initialize logging (INFO unless RUST_LOG says otherwise)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    info!("Scoreboard starting...");

    let config = Config::from_env()?;

    // The process cannot serve anything without a store
    let store = Arc::new(scores::new_score_store().context("unable to initialize database")?);

    let shutdown = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::channel(config.ingest_buffer);

    // Single subscription, single writer
    let client =
        SseClient::new(&config.sse_url, &config.stream)?.with_max_event_bytes(config.max_event_bytes);
    client
        .spawn(events_tx, shutdown.clone())
        .context("failed to start event stream thread")?;

    let ingestor = Ingestor::new(Arc::clone(&store), config.error_policy);
    let mut ingest_handle = tokio::spawn(ingestor.run(events_rx, shutdown.clone()));

    let web_shutdown = shutdown.clone();
    let queries = ScoreQueries::new(store);
    let addr = config.listen_addr.clone();
    let mut web_handle = tokio::spawn(async move {
        web::run_web_server(&addr, queries, web_shutdown).await
    });

    // Wait for Ctrl-C or for either task to stop on its own
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
        res = &mut web_handle => {
            shutdown.cancel();
            res.context("web server task failed")??;
            error!("Web server stopped");
        }
        res = &mut ingest_handle => {
            shutdown.cancel();
            let web_result = web_handle.await.context("web server task failed");
            if let Err(e) = web_result.and_then(|res| res) {
                error!("Web server stopped with an error: {:#}", e);
            }
            finish_ingestion(res)?;
            return Ok(());
        }
    }

    shutdown.cancel();

    finish_ingestion(ingest_handle.await)?;
    if !web_handle.is_finished() {
        web_handle.await.context("web server task failed")??;
    }

    info!("Scoreboard stopped");
    Ok(())
}

/// An aborted ingestion is fatal: the process must exit non-zero
fn finish_ingestion(
    res: Result<Result<IngestStats, IngestAborted>, JoinError>,
) -> anyhow::Result<IngestStats> {
    let stats = res.context("ingestion task failed")??;
    info!(?stats, "Ingestion finished");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scoreboard::ingest::IngestError;
    use scoreboard::scores::{DecodeError, ValidationError};

    #[test]
    fn test_aborted_ingestion_is_an_error() {
        let aborted = IngestAborted {
            stats: IngestStats {
                received: 3,
                stored: 2,
                skipped: 0,
            },
            error: IngestError::Decode(DecodeError::Invalid(ValidationError::InvalidScore)),
        };

        let err = finish_ingestion(Ok(Err(aborted))).unwrap_err();
        assert!(format!("{:#}", err).contains("invalid score"));
    }

    #[test]
    fn test_finished_ingestion_is_ok() {
        let stats = IngestStats {
            received: 1,
            stored: 1,
            skipped: 0,
        };
        assert_eq!(finish_ingestion(Ok(Ok(stats))).unwrap(), stats);
    }
}
