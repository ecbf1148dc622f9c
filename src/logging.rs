//! Log sink handed to the core, plus the `env_logger` bootstrap.

use std::env;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const DEFAULT_FILTER: &str = "info";
const STATUS_LINE_TTL: Duration = Duration::from_secs(4);

/// Severity levels understood by the log sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Notice,
    Warning,
    Error,
    HttpError,
    UrlError,
    /// Reserved for the UI layer. The core never emits it.
    FatalError,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Level::Notice => "Notice",
            Level::Warning => "Warning",
            Level::Error => "Error",
            Level::HttpError => "HTTP Error",
            Level::UrlError => "URL Error",
            Level::FatalError => "Fatal Error",
        };
        f.write_str(label)
    }
}

pub trait LogSink: Send + Sync {
    fn log(&self, msg: &str, level: Level, status: Option<&str>);
}

/// Last status-line message, cleared once it is older than a few seconds.
#[derive(Debug, Clone, Default)]
pub struct StatusLine {
    inner: Arc<Mutex<Option<(String, Instant)>>>,
}

impl StatusLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&self, msg: &str) {
        if let Ok(mut slot) = self.inner.lock() {
            *slot = Some((msg.to_string(), Instant::now()));
        }
    }

    pub fn current(&self) -> Option<String> {
        self.current_at(Instant::now())
    }

    fn current_at(&self, now: Instant) -> Option<String> {
        let mut slot = self.inner.lock().ok()?;
        match slot.as_ref() {
            Some((_, shown)) if now.saturating_duration_since(*shown) >= STATUS_LINE_TTL => {
                *slot = None;
                None
            }
            Some((msg, _)) => Some(msg.clone()),
            None => None,
        }
    }
}

/// Forwards sink messages to the `log` facade and mirrors status text.
#[derive(Debug, Clone, Default)]
pub struct LogBridge {
    status: StatusLine,
}

impl LogBridge {
    pub fn new(status: StatusLine) -> Self {
        Self { status }
    }

    pub fn status_line(&self) -> &StatusLine {
        &self.status
    }
}

impl LogSink for LogBridge {
    fn log(&self, msg: &str, level: Level, status: Option<&str>) {
        match level {
            Level::Notice => log::info!("[{level}]: {msg}"),
            Level::Warning => log::warn!("[{level}]: {msg}"),
            Level::FatalError => log::error!("[{level}]: An exception was thrown:\n{msg}"),
            Level::Error | Level::HttpError | Level::UrlError => log::error!("[{level}]: {msg}"),
        }
        if let Some(text) = status {
            self.status.show(text);
        }
    }
}

/// Install the global logger.
///
/// Filter precedence: `RUST_LOG`, then `RMSMS_LOG`, then `info`.
pub fn init() {
    let filter = filter_from_lookup(|key| env::var(key).ok());
    let _ = env_logger::Builder::new()
        .parse_filters(&filter)
        .format_timestamp_millis()
        .try_init();
}

fn filter_from_lookup<F>(mut lookup: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    ["RUST_LOG", "RMSMS_LOG"]
        .into_iter()
        .filter_map(|key| lookup(key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}
