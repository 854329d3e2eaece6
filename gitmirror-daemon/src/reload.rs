//! Configuration hot reload.
//!
//! A change to the config file rebuilds the whole configuration from disk.
//! The new generation is only installed once every repository of the current
//! generation is idle, so no sync ever sees a mix of old and new settings.
//! Reloads are serialized by one async mutex that also carries the time of
//! the last install, which drives the debounce.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::Instant;

use gitmirror_core::{config, Config};

use crate::context::AppContext;
use crate::error::DaemonError;
use crate::timing::{DEBOUNCE_WINDOW, QUIESCE_LOG_INTERVAL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// Arrived within the debounce window of the previous reload.
    Debounced,
    /// The file could not be read or parsed; the old generation stays.
    Rejected,
    Installed { repos: usize, clones: usize },
}

pub struct ConfigCoordinator {
    ctx: Arc<AppContext>,
    last_reload: Mutex<Instant>,
    quiesce_interval: Duration,
}

impl ConfigCoordinator {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self::with_interval(ctx, QUIESCE_LOG_INTERVAL)
    }

    pub fn with_interval(ctx: Arc<AppContext>, quiesce_interval: Duration) -> Self {
        Self {
            ctx,
            last_reload: Mutex::new(Instant::now()),
            quiesce_interval,
        }
    }

    /// Handle one change notification for the config file.
    ///
    /// Debouncing compares arrival times, so a save made while an earlier
    /// reload waits for idle repos is still applied once that reload is done.
    pub async fn on_change(&self) -> ReloadOutcome {
        let arrived = Instant::now();
        let mut last_reload = self.last_reload.lock().await;
        if !should_reload_with_threshold(*last_reload, arrived, DEBOUNCE_WINDOW) {
            tracing::debug!("config change within debounce window, skipping");
            return ReloadOutcome::Debounced;
        }
        *last_reload = arrived;
        self.reload().await
    }

    async fn reload(&self) -> ReloadOutcome {
        let path = self.ctx.config_path();
        tracing::info!(path = %path.display(), "config file changed, reloading");
        let candidate = match config::load_at(path) {
            Ok(candidate) => Arc::new(candidate),
            Err(err) => {
                tracing::error!(error = %err, "config reload failed, keeping current configuration");
                return ReloadOutcome::Rejected;
            }
        };

        let current = self.ctx.config().await;
        self.ctx
            .status()
            .wait_idle(
                &current.repos.paths(),
                self.quiesce_interval,
                "waiting for all repo updates to finish before reloading config",
            )
            .await;

        let previous = self.ctx.install(candidate.clone()).await;
        self.ctx.dispatcher().set_concurrency(candidate.threads);
        if let Err(err) = self.ctx.log().set_level(candidate.logging.level) {
            tracing::warn!(error = %err, "failed to apply new log level");
        }
        warn_on_restart_only_changes(&previous, &candidate);

        let added: Vec<_> = candidate
            .repositories()
            .iter()
            .filter(|repo| previous.repos.find(&repo.path).is_none())
            .cloned()
            .collect();
        let clones = match self.ctx.clone_missing(&candidate, &added).await {
            Ok(clones) => clones,
            Err(err) => {
                tracing::error!(error = %err, "failed to queue clones for new repos");
                0
            }
        };

        tracing::info!(
            repos = candidate.repos.len(),
            threads = candidate.threads,
            level = %candidate.logging.level,
            "configuration reloaded",
        );
        ReloadOutcome::Installed {
            repos: candidate.repos.len(),
            clones,
        }
    }
}

fn should_reload_with_threshold(last_reload: Instant, now: Instant, threshold: Duration) -> bool {
    now.duration_since(last_reload) >= threshold
}

fn warn_on_restart_only_changes(previous: &Config, next: &Config) {
    if previous.bind_address() != next.bind_address() {
        tracing::warn!(
            current = %previous.bind_address(),
            configured = %next.bind_address(),
            "listen address changed; restart to apply",
        );
    }
    let (old, new) = (&previous.logging, &next.logging);
    if old.format != new.format || old.output != new.output || old.timestamp != new.timestamp {
        tracing::warn!("logging format or output changed; restart to apply");
    }
}

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

/// Watch the config file and feed changes to `coordinator` until shutdown.
pub async fn watch_task(
    coordinator: Arc<ConfigCoordinator>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let path = coordinator.ctx.config_path().to_path_buf();
    let Some(file_name) = path.file_name().map(OsString::from) else {
        tracing::warn!(path = %path.display(), "config path has no file name, not watching");
        return Ok(());
    };
    let dir = watch_dir(&path);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    // Editors replace the file by rename, so watch its directory.
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    tracing::debug!(dir = %dir.display(), "watching config directory");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }
                if !event.paths.iter().any(|p| p.file_name() == Some(file_name.as_os_str())) {
                    continue;
                }
                coordinator.on_change().await;
            }
        }
    }
    Ok(())
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}
