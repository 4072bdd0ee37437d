//! Process configuration from environment variables

use crate::ingest::ErrorPolicy;
use crate::sse::DEFAULT_MAX_EVENT_BYTES;
use anyhow::{anyhow, bail, Context};

pub const ENV_URL: &str = "SSE_SERVER_URL";
pub const ENV_PORT: &str = "APPLICATION_PORT";
pub const ENV_STREAM: &str = "SSE_STREAM";
pub const ENV_ERROR_POLICY: &str = "INGEST_ERROR_POLICY";
pub const ENV_BUFFER: &str = "INGEST_BUFFER";
pub const ENV_MAX_EVENT_BYTES: &str = "SSE_MAX_EVENT_BYTES";

const DEFAULT_STREAM: &str = "messages";
const DEFAULT_BUFFER: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Upstream event stream
    pub sse_url: String,

    /// Stream name passed as the `stream` query parameter
    pub stream: String,

    /// HTTP listen address (`host:port`)
    pub listen_addr: String,

    pub error_policy: ErrorPolicy,

    /// Capacity of the channel between the stream client and ingestion
    pub ingest_buffer: usize,

    /// Largest event payload accepted from the stream
    pub max_event_bytes: usize,
}

impl Config {
    /// Read the configuration from the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup` (key -> value)
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> anyhow::Result<String> {
            match lookup(key) {
                Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
                _ => bail!("Environment mismatch. Missing required: {}", key),
            }
        };

        let sse_url = required(ENV_URL)?;
        let listen_addr = listen_addr(&required(ENV_PORT)?)?;

        let stream = lookup(ENV_STREAM).unwrap_or_else(|| DEFAULT_STREAM.to_string());

        let error_policy = match lookup(ENV_ERROR_POLICY) {
            Some(value) => value.parse().map_err(|e: String| anyhow!(e))?,
            None => ErrorPolicy::default(),
        };

        let positive = |key: &str, default: usize| -> anyhow::Result<usize> {
            let value = match lookup(key) {
                Some(value) => value
                    .trim()
                    .parse::<usize>()
                    .with_context(|| format!("{} must be a positive integer", key))?,
                None => default,
            };
            if value == 0 {
                bail!("{} must be a positive integer", key);
            }
            Ok(value)
        };

        let ingest_buffer = positive(ENV_BUFFER, DEFAULT_BUFFER)?;
        let max_event_bytes = positive(ENV_MAX_EVENT_BYTES, DEFAULT_MAX_EVENT_BYTES)?;

        Ok(Config {
            sse_url,
            stream,
            listen_addr,
            error_policy,
            ingest_buffer,
            max_event_bytes,
        })
    }
}

/// Accept `8080`, `:8080` or `host:port`
fn listen_addr(port: &str) -> anyhow::Result<String> {
    if let Some(bare) = port.strip_prefix(':') {
        return listen_addr(bare);
    }
    if port.parse::<u16>().is_ok() {
        return Ok(format!("0.0.0.0:{}", port));
    }
    match port.rsplit_once(':') {
        Some((host, p)) if !host.is_empty() && p.parse::<u16>().is_ok() => Ok(port.to_string()),
        _ => bail!("invalid {}: '{}'", ENV_PORT, port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[
            (ENV_URL, "http://localhost:9000/scores"),
            (ENV_PORT, ":8080"),
        ]))
        .unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.stream, "messages");
        assert_eq!(config.error_policy, ErrorPolicy::Skip);
        assert_eq!(config.ingest_buffer, 1024);
        assert_eq!(config.max_event_bytes, DEFAULT_MAX_EVENT_BYTES);
    }

    #[test]
    fn test_missing_required() {
        let err = Config::from_lookup(lookup(&[(ENV_PORT, "8080")])).unwrap_err();
        assert!(err.to_string().contains(ENV_URL));

        let err = Config::from_lookup(lookup(&[(ENV_URL, "http://x"), (ENV_PORT, " ")])).unwrap_err();
        assert!(err.to_string().contains(ENV_PORT));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            (ENV_URL, "http://x"),
            (ENV_PORT, "127.0.0.1:3000"),
            (ENV_STREAM, "scores"),
            (ENV_ERROR_POLICY, "stop"),
            (ENV_BUFFER, "16"),
            (ENV_MAX_EVENT_BYTES, "4096"),
        ]))
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.stream, "scores");
        assert_eq!(config.error_policy, ErrorPolicy::Stop);
        assert_eq!(config.ingest_buffer, 16);
        assert_eq!(config.max_event_bytes, 4096);
    }

    #[test]
    fn test_invalid_values() {
        let base = [(ENV_URL, "http://x"), (ENV_PORT, "8080")];

        for extra in [(ENV_ERROR_POLICY, "explode"), (ENV_BUFFER, "0"), (ENV_BUFFER, "lots"), (ENV_MAX_EVENT_BYTES, "0")] {
            let mut pairs = base.to_vec();
            pairs.push(extra);
            assert!(Config::from_lookup(lookup(&pairs)).is_err(), "{:?}", extra);
        }

        assert!(listen_addr("port").is_err());
        assert!(listen_addr("host:99999").is_err());
    }
}
