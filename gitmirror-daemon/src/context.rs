//! Shared application state handed to every daemon task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;

use gitmirror_core::{Config, RepositoryConfig};
use gitmirror_sync::{RetryPolicy, StatusTable, SyncJob};

use crate::dispatcher::DispatcherHandle;
use crate::error::DaemonError;
use crate::logging::LogHandle;

pub struct AppContext {
    config: RwLock<Arc<Config>>,
    config_path: PathBuf,
    status: StatusTable,
    dispatcher: DispatcherHandle,
    log: LogHandle,
}

impl AppContext {
    pub fn new(
        config: Arc<Config>,
        config_path: impl Into<PathBuf>,
        status: StatusTable,
        dispatcher: DispatcherHandle,
        log: LogHandle,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            config_path: config_path.into(),
            status,
            dispatcher,
            log,
        }
    }

    /// The configuration generation currently in effect.
    pub async fn config(&self) -> Arc<Config> {
        self.config.read().await.clone()
    }

    /// Swap in a new generation, returning the one it replaced.
    pub(crate) async fn install(&self, config: Arc<Config>) -> Arc<Config> {
        std::mem::replace(&mut *self.config.write().await, config)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn status(&self) -> &StatusTable {
        &self.status
    }

    pub fn dispatcher(&self) -> &DispatcherHandle {
        &self.dispatcher
    }

    pub fn log(&self) -> &LogHandle {
        &self.log
    }

    /// Queue a Clone for each of `repos` whose checkout directory is missing.
    ///
    /// Does nothing unless `config.initialise` is set. Returns the number of
    /// jobs queued.
    pub async fn clone_missing<'a>(
        &self,
        config: &Config,
        repos: impl IntoIterator<Item = &'a Arc<RepositoryConfig>>,
    ) -> Result<usize, DaemonError> {
        if !config.initialise {
            return Ok(0);
        }
        let retry = RetryPolicy::from_config(config);
        let mut queued = 0;
        for repo in repos {
            if repo.directory.exists() {
                continue;
            }
            tracing::info!(
                repo = %repo.name(),
                directory = %repo.directory.display(),
                "checkout missing, queueing clone",
            );
            self.dispatcher
                .submit(SyncJob::clone_of(repo.clone(), retry))
                .await?;
            queued += 1;
        }
        Ok(queued)
    }
}
