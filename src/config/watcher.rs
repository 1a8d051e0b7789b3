//! Configuration file watcher for hot reload.
//!
//! # Design Decisions
//! - The notify callback only signals "something changed"; loading happens
//!   on a Tokio task so the notify thread never parses files
//! - A burst of events (editors write, truncate and rename) is coalesced
//!   into one reload once the file has been quiet for the debounce window
//! - A reload that yields the configuration already published is dropped

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

/// Quiet period required before a change is reloaded.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// A watcher that monitors the configuration file for changes.
///
/// Only configurations that parse, validate and differ from the last
/// published one are forwarded; a broken edit is logged and the running
/// configuration stays in place.
pub struct ConfigWatcher {
    path: PathBuf,
    debounce: Duration,
    current: Option<GatewayConfig>,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                debounce: DEFAULT_DEBOUNCE,
                current: None,
                update_tx,
            },
            update_rx,
        )
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// The configuration already running, so an unchanged save is not resent.
    pub fn with_initial(mut self, config: GatewayConfig) -> Self {
        self.current = Some(config);
        self
    }

    /// Start watching the file. Must be called from within a Tokio runtime;
    /// the returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let (change_tx, change_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    if change_tx.send(()).is_err() {
                        tracing::debug!("Reload task gone, ignoring file event");
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, debounce_ms = self.debounce.as_millis() as u64, "Config watcher started");
        tokio::spawn(reload_loop(
            self.path,
            self.debounce,
            self.current,
            change_rx,
            self.update_tx,
        ));
        Ok(watcher)
    }
}

async fn reload_loop(
    path: PathBuf,
    debounce: Duration,
    mut current: Option<GatewayConfig>,
    mut changes: mpsc::UnboundedReceiver<()>,
    updates: mpsc::UnboundedSender<GatewayConfig>,
) {
    while changes.recv().await.is_some() {
        let mut events = 1usize;
        while let Ok(Some(())) = tokio::time::timeout(debounce, changes.recv()).await {
            events += 1;
        }

        let config = match load_config(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(
                    path = ?path,
                    error = %e,
                    "Failed to reload config, keeping current configuration"
                );
                continue;
            }
        };

        if current.as_ref() == Some(&config) {
            tracing::debug!(path = ?path, events, "Config file unchanged, skipping reload");
            continue;
        }

        tracing::info!(
            path = ?path,
            events,
            routes = config.routes.len(),
            upstreams = config.upstreams.len(),
            "Config file changed, publishing reload"
        );
        current = Some(config.clone());
        if updates.send(config).is_err() {
            tracing::debug!("Config receiver dropped, stopping reload task");
            break;
        }
    }
}
