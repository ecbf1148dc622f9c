//! The poll loop: fetch, decode, detect changes, publish to the cache.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::api::client::Fetch;
use crate::api::codec::{DecryptionKey, decode_all};
use crate::api::models::Message;
use crate::cache::SharedCache;
use crate::config::{NotificationConfig, SharedConfig};
use crate::logging::{Level, LogSink};
use crate::notify::Notifier;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(150);
const UPDATED_MSG: &str = "SMS data updated. New SMS received!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SettingsLocked,
    NoCredentials,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    FetchFailed,
    Unchanged,
    Updated { notified: bool },
}

/// True when a mailbox URL is configured.
pub fn check_creds(url: &str) -> bool {
    !url.trim().is_empty()
}

pub fn poll_interval(interval_ms: u64) -> Duration {
    Duration::from_millis(interval_ms).max(MIN_POLL_INTERVAL)
}

pub struct SyncEngine<F, N> {
    fetcher: F,
    notifier: N,
    config: SharedConfig,
    cache: SharedCache,
    sink: Arc<dyn LogSink>,
    raw: Vec<Message>,
    first_parse: bool,
    key: Option<(String, Option<DecryptionKey>)>,
}

impl<F: Fetch, N: Notifier> SyncEngine<F, N> {
    pub fn new(
        fetcher: F,
        notifier: N,
        config: SharedConfig,
        cache: SharedCache,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            fetcher,
            notifier,
            config,
            cache,
            sink,
            raw: Vec::new(),
            first_parse: true,
            key: None,
        }
    }

    pub fn cache(&self) -> SharedCache {
        self.cache.clone()
    }

    /// Last decoded message list, newest first.
    pub fn raw(&self) -> &[Message] {
        &self.raw
    }

    pub async fn tick(&mut self) -> TickOutcome {
        let Some(config) = self.config.try_snapshot() else {
            return TickOutcome::Skipped(SkipReason::SettingsLocked);
        };
        if !check_creds(&config.api.url) {
            return TickOutcome::Skipped(SkipReason::NoCredentials);
        }
        let key = self.decryption_key(config.api.key.as_deref());

        self.sink.log(
            "Connecting to remote API.",
            Level::Notice,
            Some("Connecting to remote API..."),
        );
        let lines = match self.fetcher.fetch(&config.api.endpoint()).await {
            Ok(lines) => {
                self.sink.log(
                    "Successfully connected to remote API.",
                    Level::Notice,
                    Some("Connected to remote API..."),
                );
                lines
            }
            Err(err) => {
                let status = err.status_line();
                self.sink
                    .log(&err.log_message(), err.level(), Some(status.as_str()));
                return TickOutcome::FetchFailed;
            }
        };

        let mut messages = decode_all(&lines, key.as_ref(), &*self.sink);
        messages.reverse();

        if messages.is_empty() || messages == self.raw {
            return TickOutcome::Unchanged;
        }
        self.raw = messages;
        self.sink.log(UPDATED_MSG, Level::Notice, Some(UPDATED_MSG));

        self.sync_cache(&config.notifications)
    }

    fn sync_cache(&mut self, settings: &NotificationConfig) -> TickOutcome {
        let changed = match self.cache.lock() {
            Ok(mut cache) => cache.replace_if_changed(&self.raw),
            Err(poisoned) => poisoned.into_inner().replace_if_changed(&self.raw),
        };
        if !changed {
            return TickOutcome::Unchanged;
        }
        if self.first_parse {
            self.first_parse = false;
            return TickOutcome::Updated { notified: false };
        }
        self.notifier.on_new_messages(settings);
        TickOutcome::Updated { notified: true }
    }

    /// Parsed key for the configured string; re-parsed only when it changes.
    fn decryption_key(&mut self, raw: Option<&str>) -> Option<DecryptionKey> {
        let raw = raw.filter(|k| !k.is_empty())?;
        if let Some((cached_raw, parsed)) = &self.key
            && cached_raw == raw
        {
            return parsed.clone();
        }
        let parsed = match DecryptionKey::from_config(raw) {
            Ok(key) => Some(key),
            Err(err) => {
                let msg = format!(
                    "Configured decryption key is unusable, \
                     encrypted lines will be skipped: {err}"
                );
                self.sink.log(&msg, Level::Warning, None);
                None
            }
        };
        self.key = Some((raw.to_string(), parsed.clone()));
        parsed
    }

    /// Tick until `shutdown` fires, sleeping the configured interval between
    /// ticks. The interval is re-read after every tick.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut period = poll_interval(self.config.snapshot().api.interval_ms);
        log::debug!("poll loop started, interval {period:?}");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = self.tick() => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }
            if let Some(config) = self.config.try_snapshot() {
                let wanted = poll_interval(config.api.interval_ms);
                if wanted != period {
                    log::debug!("poll interval changed {period:?} -> {wanted:?}");
                    period = wanted;
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(period) => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }
        log::debug!("poll loop stopped");
    }
}

/// Resolves once `true` is published. A dropped sender never resolves.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
