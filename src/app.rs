use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;

use crate::api::client::ApiClient;
use crate::cache::{MessageCache, SharedCache};
use crate::config::{Config, SharedConfig};
use crate::logging::{LogBridge, LogSink, StatusLine};
use crate::notify::LogNotifier;
use crate::storage::{ConfigStore, SaveTarget};
use crate::sync::SyncEngine;

const APP_NAME: &str = "rmSMS";

/// Everything the UI layer reads from or writes through.
pub struct AppState {
    store: ConfigStore,
    config: SharedConfig,
    cache: SharedCache,
    sink: Arc<LogBridge>,
}

impl AppState {
    /// Create the config file on first run, then load it (with recovery).
    pub async fn load(path: PathBuf) -> Self {
        let store = ConfigStore::new(path);
        let sink = Arc::new(LogBridge::new(StatusLine::new()));

        let loaded = {
            let store = store.clone();
            let sink = sink.clone();
            crate::utils::run_blocking(move || {
                store.ensure_exists(&Config::default(), &*sink);
                store.load(&*sink)
            })
            .await
        };

        Self {
            store,
            config: SharedConfig::new(loaded.unwrap_or_default()),
            cache: MessageCache::shared(),
            sink,
        }
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn cache(&self) -> SharedCache {
        self.cache.clone()
    }

    pub fn status_line(&self) -> &StatusLine {
        self.sink.status_line()
    }

    /// Persist the current configuration to the primary file.
    pub fn save(&self) {
        let snapshot = self.config.snapshot();
        let _ = self.store.save(&snapshot, SaveTarget::Primary, &*self.sink);
    }

    fn engine(&self) -> SyncEngine<ApiClient, LogNotifier> {
        let sink: Arc<dyn LogSink> = self.sink.clone();
        SyncEngine::new(
            ApiClient::new(),
            LogNotifier::new(),
            self.config.clone(),
            self.cache.clone(),
            sink,
        )
    }
}

/// Load config, poll until Ctrl-C, then flush config to disk.
pub async fn run(path: PathBuf) {
    log::info!("{0} {APP_NAME} - Log Init {0}", "=".repeat(5));
    let state = AppState::load(path).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                log::error!("unable to listen for shutdown signal: {e}");
                // Dropping the sender would read as a shutdown request.
                std::future::pending::<()>().await;
            }
        }
    });

    state.engine().run(shutdown_rx).await;

    state.save();
    log::info!("{0} {APP_NAME} - App Exit {0}", "=".repeat(5));
}
