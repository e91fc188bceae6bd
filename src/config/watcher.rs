//! Configuration file watcher for hot-reload support
//!
//! A changed console host or port forces a reconnect, a changed polling
//! section restarts the name poller. Invalid edits are logged and ignored.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::AppConfig;

/// Time allowed for an editor to finish writing before the file is re-read
const DEBOUNCE: Duration = Duration::from_millis(100);

/// Watches the config file and yields each new valid configuration
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<AppConfig>,
}

impl ConfigWatcher {
    /// Load the config file and start watching it
    pub async fn new(config_path: String) -> Result<(Self, Arc<AppConfig>)> {
        let initial_config = AppConfig::load(&config_path)
            .await
            .context("Failed to load initial config")?;
        let initial_config = Arc::new(initial_config);

        let (tx, rx) = mpsc::channel(10);
        let last = Arc::new(Mutex::new((*initial_config).clone()));
        let target = PathBuf::from(&config_path);
        let file_name = target.file_name().map(|n| n.to_os_string());

        // notify calls back on its own thread
        let runtime = tokio::runtime::Handle::current();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    error!("Config watch error: {}", e);
                    return;
                }
            };
            if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                return;
            }
            let touches_config = event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
            if !touches_config {
                return;
            }
            debug!("Config file event: {:?}", event.kind);

            let path = target.to_string_lossy().to_string();
            let tx = tx.clone();
            let last = last.clone();
            runtime.spawn(async move {
                tokio::time::sleep(DEBOUNCE).await;
                match AppConfig::load(&path).await {
                    Ok(config) => {
                        {
                            let mut last = last.lock();
                            if *last == config {
                                debug!("Config file touched but unchanged");
                                return;
                            }
                            *last = config.clone();
                        }
                        if tx.send(config).await.is_err() {
                            debug!("Config receiver dropped");
                        }
                    }
                    Err(e) => warn!("Failed to reload config (keeping old config): {:#}", e),
                }
            });
        })?;

        // Watch the directory so replace-on-save editors are seen too
        let watch_dir = match Path::new(&config_path).parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config directory: {}", watch_dir.display()))?;

        info!("Config file watcher started for: {}", config_path);

        Ok((
            Self {
                _watcher: watcher,
                rx,
            },
            initial_config,
        ))
    }

    /// Wait for the next changed config
    ///
    /// Returns None if the watcher has been closed
    pub async fn next_config(&mut self) -> Option<AppConfig> {
        self.rx.recv().await
    }
}
