use anyhow::Context;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct CoreConfig {
    /// Directory holding `toast.db`.
    pub storage_path: PathBuf,
    /// Base URL of the document API. `None` runs against an in-process store.
    pub remote_url: Option<String>,
    pub http_timeout: Duration,
    pub feed_poll: Duration,
    pub connectivity_poll: Duration,
}

impl CoreConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let storage_path = env::var("TOAST_STORAGE_PATH")
            .map(PathBuf::from)
            .context("TOAST_STORAGE_PATH must point at a writable directory")?;
        Ok(Self {
            storage_path,
            remote_url: env::var("TOAST_REMOTE_URL").ok().filter(|s| !s.trim().is_empty()),
            http_timeout: Duration::from_secs(parse_or("TOAST_HTTP_TIMEOUT_SECS", 30)),
            feed_poll: Duration::from_millis(parse_or("TOAST_FEED_POLL_MS", 2000)),
            connectivity_poll: Duration::from_millis(parse_or("TOAST_CONNECTIVITY_POLL_MS", 1000)),
        })
    }

    pub fn with_storage_path(path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: path.into(),
            remote_url: None,
            http_timeout: Duration::from_secs(30),
            feed_poll: Duration::from_millis(2000),
            connectivity_poll: Duration::from_millis(1000),
        }
    }
}

fn parse_or(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
