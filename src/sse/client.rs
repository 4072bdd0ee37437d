//! Event-stream subscription client
//!
//! Runs on its own OS thread: `ureq` is blocking, and a read parked on an
//! idle stream must not hold a runtime worker. Each event's `data` is
//! forwarded into the ingestion channel.

use super::parser::{EventParser, DEFAULT_MAX_EVENT_BYTES};
use bytes::Bytes;
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
// Idle streams are re-established after this long without a line
const READ_TIMEOUT: Duration = Duration::from_secs(60);
// Room for the field name and line terminator around a maximal data value
const LINE_OVERHEAD: usize = 64;

#[derive(Debug)]
pub enum SseError {
    InvalidUrl(url::ParseError),
    Status(u16),
    Transport(String),
    Io(std::io::Error),
}

impl fmt::Display for SseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SseError::InvalidUrl(e) => write!(f, "invalid event stream url: {}", e),
            SseError::Status(code) => write!(f, "event stream returned HTTP {}", code),
            SseError::Transport(msg) => write!(f, "event stream request failed: {}", msg),
            SseError::Io(e) => write!(f, "event stream read failed: {}", e),
        }
    }
}

impl std::error::Error for SseError {}

/// Why a single connection ended
#[derive(Debug, PartialEq, Eq)]
enum StreamEnd {
    /// Server closed the stream; reconnect
    Eof,
    /// Shutdown requested or nobody is consuming events; stop for good
    Stopped,
}

pub struct SseClient {
    url: Url,
    agent: ureq::Agent,
    max_event_bytes: usize,
}

impl SseClient {
    /// Build a client for `base`, subscribing to the named stream
    pub fn new(base: &str, stream: &str) -> Result<Self, SseError> {
        let mut url = Url::parse(base).map_err(SseError::InvalidUrl)?;
        if !stream.is_empty() {
            url.query_pairs_mut().append_pair("stream", stream);
        }

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build();

        Ok(SseClient {
            url,
            agent,
            max_event_bytes: DEFAULT_MAX_EVENT_BYTES,
        })
    }

    /// Cap on one event's data; larger events are logged and skipped
    pub fn with_max_event_bytes(mut self, max_event_bytes: usize) -> Self {
        self.max_event_bytes = max_event_bytes;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Start the subscription thread
    ///
    /// The thread reconnects with exponential backoff until `shutdown` is
    /// cancelled or the receiving end of `events` is dropped.
    pub fn spawn(
        self,
        events: mpsc::Sender<Bytes>,
        shutdown: CancellationToken,
    ) -> std::io::Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("sse-client".to_string())
            .spawn(move || self.run(events, shutdown))
    }

    fn run(&self, events: mpsc::Sender<Bytes>, shutdown: CancellationToken) {
        info!("Subscribing to event stream at {}", self.url);
        let mut backoff = INITIAL_BACKOFF;
        // Outlives single connections so the last event id survives a reconnect
        let mut parser = EventParser::with_limit(self.max_event_bytes);

        while !shutdown.is_cancelled() {
            match self.stream_once(&mut parser, &events, &shutdown, &mut backoff) {
                Ok(StreamEnd::Stopped) => break,
                Ok(StreamEnd::Eof) => warn!("Event stream closed by server, reconnecting"),
                Err(e) => error!("{}", e),
            }

            if !sleep_unless_cancelled(backoff, &shutdown) {
                break;
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }

        info!("Event stream subscription stopped");
    }

    fn request(&self, last_event_id: Option<&str>) -> ureq::Request {
        let request = self
            .agent
            .get(self.url.as_str())
            .set("Accept", "text/event-stream")
            .set("Cache-Control", "no-cache");
        match last_event_id {
            Some(id) => request.set("Last-Event-ID", id),
            None => request,
        }
    }

    fn stream_once(
        &self,
        parser: &mut EventParser,
        events: &mpsc::Sender<Bytes>,
        shutdown: &CancellationToken,
        backoff: &mut Duration,
    ) -> Result<StreamEnd, SseError> {
        let response = match self.request(parser.last_event_id()).call() {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, _)) => return Err(SseError::Status(code)),
            Err(ureq::Error::Transport(err)) => return Err(SseError::Transport(err.to_string())),
        };

        info!(last_event_id = ?parser.last_event_id(), "Connected to event stream");
        *backoff = INITIAL_BACKOFF;
        parser.reset();

        let reader = BufReader::new(response.into_reader());
        forward_events(reader, parser, events, shutdown)
    }
}

/// Parse an event stream and forward every event's data
///
/// Lines are read as raw bytes and never buffered past the parser's event
/// limit, so neither bad encoding nor a runaway line can end the stream.
fn forward_events<R: BufRead>(
    mut reader: R,
    parser: &mut EventParser,
    events: &mpsc::Sender<Bytes>,
    shutdown: &CancellationToken,
) -> Result<StreamEnd, SseError> {
    let max_line = (parser.max_event_bytes() + LINE_OVERHEAD) as u64;
    let mut line = Vec::new();

    loop {
        if shutdown.is_cancelled() {
            return Ok(StreamEnd::Stopped);
        }

        line.clear();
        let read = (&mut reader)
            .take(max_line)
            .read_until(b'\n', &mut line)
            .map_err(SseError::Io)?;
        if read == 0 {
            return Ok(StreamEnd::Eof);
        }

        if read as u64 == max_line && line.last() != Some(&b'\n') {
            warn!("{}, skipping", parser.skip_event());
            if !skip_line(&mut reader).map_err(SseError::Io)? {
                return Ok(StreamEnd::Eof);
            }
            continue;
        }

        match parser.feed_line(&line) {
            Ok(Some(event)) => {
                debug!(event = ?event.event, bytes = event.data.len(), "received event");
                if events.blocking_send(event.data).is_err() {
                    return Ok(StreamEnd::Stopped);
                }
            }
            Ok(None) => {}
            Err(oversized) => warn!("{}, skipping", oversized),
        }
    }
}

/// Discard input up to and including the next newline; false on EOF
fn skip_line<R: BufRead>(reader: &mut R) -> std::io::Result<bool> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(false);
        }
        match buf.iter().position(|&b| b == b'\n') {
            Some(end) => {
                reader.consume(end + 1);
                return Ok(true);
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

/// Sleep in short slices; false if shutdown was requested meanwhile
fn sleep_unless_cancelled(total: Duration, shutdown: &CancellationToken) -> bool {
    let step = Duration::from_millis(100);
    let mut waited = Duration::ZERO;
    while waited < total {
        if shutdown.is_cancelled() {
            return false;
        }
        thread::sleep(step);
        waited += step;
    }
    !shutdown.is_cancelled()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn forward(input: &[u8], limit: usize) -> (Result<StreamEnd, SseError>, Vec<Bytes>) {
        let (tx, mut rx) = mpsc::channel(8);
        let mut parser = EventParser::with_limit(limit);
        let end = forward_events(Cursor::new(input), &mut parser, &tx, &CancellationToken::new());

        let mut received = Vec::new();
        while let Ok(data) = rx.try_recv() {
            received.push(data);
        }
        (end, received)
    }

    #[test]
    fn test_url_gets_stream_param() {
        let client = SseClient::new("https://scores.example.com/scores", "messages").unwrap();
        assert_eq!(client.url().as_str(), "https://scores.example.com/scores?stream=messages");
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(SseClient::new("not a url", "messages"), Err(SseError::InvalidUrl(_))));
    }

    #[test]
    fn test_request_resumes_from_last_event_id() {
        let client = SseClient::new("https://scores.example.com/scores", "messages").unwrap();
        assert_eq!(client.request(None).header("Last-Event-ID"), None);
        assert_eq!(client.request(Some("42")).header("Last-Event-ID"), Some("42"));
        assert_eq!(client.request(None).header("Accept"), Some("text/event-stream"));
    }

    #[test]
    fn test_forward_events_until_eof() {
        let input = b"event: score\ndata: {\"exam\":1}\n\n: ping\n\ndata: {\"exam\":2}\n\n";

        let (end, received) = forward(input, DEFAULT_MAX_EVENT_BYTES);
        assert_eq!(end.unwrap(), StreamEnd::Eof);
        assert_eq!(
            received,
            vec![
                Bytes::from_static(b"{\"exam\":1}"),
                Bytes::from_static(b"{\"exam\":2}"),
            ]
        );
    }

    #[test]
    fn test_invalid_utf8_payload_does_not_drop_stream() {
        let input = b"data: {\"exam\":1,\"studentid\":\"a\xff\",\"score\":0.5}\n\n\
                      data: {\"exam\":2,\"studentid\":\"b\",\"score\":0.5}\n\n";

        let (end, received) = forward(input, DEFAULT_MAX_EVENT_BYTES);
        assert_eq!(end.unwrap(), StreamEnd::Eof);
        assert_eq!(received.len(), 2);
        assert_eq!(received[0], Bytes::from_static(b"{\"exam\":1,\"studentid\":\"a\xff\",\"score\":0.5}"));
        assert_eq!(received[1], Bytes::from_static(b"{\"exam\":2,\"studentid\":\"b\",\"score\":0.5}"));
    }

    #[test]
    fn test_oversized_events_are_skipped() {
        let long_line = format!("data: {}\n\ndata: ok\n\n", "x".repeat(500));
        let (end, received) = forward(long_line.as_bytes(), 16);
        assert_eq!(end.unwrap(), StreamEnd::Eof);
        assert_eq!(received, vec![Bytes::from_static(b"ok")]);

        let (end, received) = forward(b"data: 0123456789\ndata: 0123456789\n\ndata: ok\n\n", 16);
        assert_eq!(end.unwrap(), StreamEnd::Eof);
        assert_eq!(received, vec![Bytes::from_static(b"ok")]);
    }

    #[test]
    fn test_unterminated_long_line_ends_at_eof() {
        let input = "x".repeat(1000);
        let (end, received) = forward(input.as_bytes(), 16);
        assert_eq!(end.unwrap(), StreamEnd::Eof);
        assert!(received.is_empty());
    }

    #[test]
    fn test_forward_events_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(8);
        drop(rx);

        let mut parser = EventParser::new();
        let end = forward_events(Cursor::new("data: x\n\n"), &mut parser, &tx, &CancellationToken::new()).unwrap();
        assert_eq!(end, StreamEnd::Stopped);
    }

    #[test]
    fn test_forward_events_honours_shutdown() {
        let (tx, _rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let mut parser = EventParser::new();
        let end = forward_events(Cursor::new("data: x\n\n"), &mut parser, &tx, &shutdown).unwrap();
        assert_eq!(end, StreamEnd::Stopped);
        assert!(!sleep_unless_cancelled(Duration::from_secs(5), &shutdown));
    }
}
