//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ResilienceConfig;

/// Watches the configuration file and forwards every valid reload.
///
/// Invalid files are logged and dropped; the running configuration stays in effect.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ResilienceConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end of the reload stream.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ResilienceConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. Dropping the returned handle stops the watch.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx;
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if is_content_change(&event.kind) => reload(&path, &tx),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %self.path.display(), "Config watcher started");
        Ok(watcher)
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(_) | EventKind::Create(_))
}

fn reload(path: &Path, tx: &mpsc::UnboundedSender<ResilienceConfig>) {
    tracing::info!(path = %path.display(), "Config file change detected, reloading");
    match load_config(path) {
        Ok(config) => {
            if tx.send(config).is_err() {
                tracing::debug!("Config receiver gone, dropping reload");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to reload config, keeping current configuration")
        }
    }
}
