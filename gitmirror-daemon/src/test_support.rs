use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use gitmirror_core::config;
use gitmirror_sync::{StatusTable, SyncGuard};

use crate::context::AppContext;
use crate::dispatcher::{self, Dispatcher};
use crate::logging::LogHandle;

/// Write `yaml` as `config.yaml` under `dir` and build a context from it.
pub(crate) fn context_at(dir: &TempDir, yaml: &str) -> (Arc<AppContext>, Dispatcher) {
    let path = dir.path().join("config.yaml");
    fs::write(&path, yaml).expect("write config");
    let config = config::load_at(&path).expect("load config");
    let (handle, queue) = dispatcher::channel(config.threads);
    let ctx = AppContext::new(
        Arc::new(config),
        path,
        StatusTable::new(),
        handle,
        LogHandle::disabled(),
    );
    (Arc::new(ctx), queue)
}

pub(crate) fn hold_busy(ctx: &AppContext, path: &str) -> SyncGuard {
    ctx.status().try_acquire(path).expect("repo idle")
}
