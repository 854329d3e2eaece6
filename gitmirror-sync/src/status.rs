//! Per-repository busy flags.
//!
//! The table is keyed by routing path and lives for the whole process, so a
//! repository keeps its flag across configuration generations. Claiming a
//! flag is a single compare-and-swap; releasing happens in [`SyncGuard`]'s
//! `Drop`, which covers success, error and early return alike.
//!
//! Waiters park on a [`Notify`] and wake either on release or after the
//! progress interval, at which point they log and keep waiting. There is no
//! fairness among waiters for the same repository.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::timeout;

use gitmirror_core::registry::clean_path;

/// How often a blocked repository waiter logs that it is still waiting.
pub const WAIT_LOG_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Default)]
struct RepoStatus {
    busy: AtomicBool,
    released: Notify,
}

#[derive(Default)]
struct StatusInner {
    repos: Mutex<HashMap<String, Arc<RepoStatus>>>,
    /// Signalled whenever any repository goes idle.
    idle: Notify,
}

/// Shared busy-flag table. Cloning shares the same table.
#[derive(Clone, Default)]
pub struct StatusTable {
    inner: Arc<StatusInner>,
}

impl StatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, path: &str) -> Arc<RepoStatus> {
        let mut repos = self
            .inner
            .repos
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        repos.entry(clean_path(path).to_string()).or_default().clone()
    }

    /// Claim the repository if it is idle.
    pub fn try_acquire(&self, path: &str) -> Option<SyncGuard> {
        let status = self.entry(path);
        status
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncGuard {
                table: self.clone(),
                status,
                path: clean_path(path).to_string(),
            })
    }

    /// Wait until the repository is idle, then claim it.
    pub async fn acquire(&self, path: &str) -> SyncGuard {
        self.acquire_with_interval(path, WAIT_LOG_INTERVAL).await
    }

    pub async fn acquire_with_interval(&self, path: &str, interval: Duration) -> SyncGuard {
        let status = self.entry(path);
        loop {
            // Register interest before checking so a release in between is not lost.
            let released = status.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            if let Some(guard) = self.try_acquire(path) {
                return guard;
            }
            if timeout(interval, released).await.is_err() {
                tracing::warn!(path = %path, "repo is in the middle of an update, waiting");
            }
        }
    }

    pub fn is_busy(&self, path: &str) -> bool {
        let repos = self
            .inner
            .repos
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        repos
            .get(clean_path(path))
            .is_some_and(|s| s.busy.load(Ordering::Acquire))
    }

    /// The subset of `paths` currently busy, in input order.
    pub fn busy_among(&self, paths: &[String]) -> Vec<String> {
        paths.iter().filter(|p| self.is_busy(p)).cloned().collect()
    }

    /// Block until none of `paths` is busy, logging `reason` every `interval`.
    pub async fn wait_idle(&self, paths: &[String], interval: Duration, reason: &str) {
        loop {
            let idle = self.inner.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();

            let busy = self.busy_among(paths);
            if busy.is_empty() {
                return;
            }
            tracing::warn!(busy = ?busy, "{reason}");
            let _ = timeout(interval, idle).await;
        }
    }
}

/// Proof of exclusive access to one repository; releases on drop.
#[must_use = "the repository is released as soon as the guard is dropped"]
pub struct SyncGuard {
    table: StatusTable,
    status: Arc<RepoStatus>,
    path: String,
}

impl SyncGuard {
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        self.status.busy.store(false, Ordering::Release);
        self.status.released.notify_waiters();
        self.table.inner.idle.notify_waiters();
    }
}
