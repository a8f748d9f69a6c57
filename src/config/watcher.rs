//! Configuration file watcher for hot reload.
//!
//! The watcher only signals that the file changed. Reload hooks own parsing
//! and validation; an invalid file fails the reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::lifecycle::{Context, ReloadCoordinator};

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<()>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver that yields once per change event.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!(path = ?path, "Config file change detected");
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Run a reload for every change until `token` is cancelled.
///
/// A burst of events (editors often emit several per save) becomes one reload.
///
/// The returned watcher must be kept alive for as long as changes should be seen.
pub fn reload_on_change(
    path: &Path,
    coordinator: Arc<ReloadCoordinator>,
    token: CancellationToken,
) -> Result<(RecommendedWatcher, JoinHandle<()>), notify::Error> {
    let (watcher, mut updates) = ConfigWatcher::new(path);
    let watcher = watcher.run()?;

    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                update = updates.recv() => {
                    if update.is_none() {
                        break;
                    }
                    while updates.try_recv().is_ok() {}
                    let _ = coordinator.reload(&Context::background()).await;
                }
                _ = token.cancelled() => break,
            }
        }
    });

    Ok((watcher, task))
}
