//! Bounded job queue feeding a concurrency-limited pool of sync tasks.
//!
//! Jobs are dispatched in FIFO order. Each dispatched job holds one semaphore
//! permit until it finishes; per-repository exclusion is left to the worker.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, mpsc, Semaphore};

use gitmirror_sync::{SyncJob, SyncOutcome, Syncable};

use crate::error::DaemonError;
use crate::timing::JOB_QUEUE_CAPACITY;

/// Submission side of the dispatcher. Cheap to clone.
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<SyncJob>,
    permits: Arc<Semaphore>,
    limit: Arc<Mutex<usize>>,
}

/// Consuming side; run it once with [`Dispatcher::run`].
pub struct Dispatcher {
    rx: mpsc::Receiver<SyncJob>,
    permits: Arc<Semaphore>,
}

/// Create a dispatcher allowing `limit` concurrent jobs (at least one).
pub fn channel(limit: usize) -> (DispatcherHandle, Dispatcher) {
    let limit = limit.max(1);
    let (tx, rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
    let permits = Arc::new(Semaphore::new(limit));
    (
        DispatcherHandle {
            tx,
            permits: permits.clone(),
            limit: Arc::new(Mutex::new(limit)),
        },
        Dispatcher { rx, permits },
    )
}

impl DispatcherHandle {
    /// Queue a job, waiting for room if the queue is full.
    pub async fn submit(&self, job: SyncJob) -> Result<(), DaemonError> {
        tracing::debug!(kind = %job.kind, repo = %job.repo.name(), "queueing job");
        self.tx
            .send(job)
            .await
            .map_err(|_| DaemonError::ChannelClosed("job queue"))
    }

    pub fn concurrency(&self) -> usize {
        *self.limit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change the concurrency limit without touching running jobs.
    ///
    /// Growth takes effect immediately. Shrinking retires permits as running
    /// jobs release them.
    pub fn set_concurrency(&self, limit: usize) {
        let limit = limit.max(1);
        let mut current = self.limit.lock().unwrap_or_else(PoisonError::into_inner);
        if limit == *current {
            return;
        }
        tracing::info!(from = *current, to = limit, "changing sync concurrency");

        if limit > *current {
            self.permits.add_permits(limit - *current);
        } else {
            let retire = (*current - limit) as u32;
            let permits = self.permits.clone();
            tokio::spawn(async move {
                if let Ok(retired) = permits.acquire_many_owned(retire).await {
                    retired.forget();
                }
            });
        }
        *current = limit;
    }
}

impl Dispatcher {
    /// Pull jobs until shutdown or until every handle is dropped.
    pub async fn run(
        mut self,
        target: Arc<dyn Syncable>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), DaemonError> {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    let abandoned = self.abandon_queued();
                    if abandoned > 0 {
                        tracing::warn!(abandoned, "shutting down with jobs still queued");
                    }
                    break;
                }
                job = self.rx.recv() => {
                    let Some(job) = job else { break };
                    let permit = self
                        .permits
                        .clone()
                        .acquire_owned()
                        .await
                        .map_err(|_| DaemonError::ChannelClosed("dispatcher semaphore"))?;
                    let target = target.clone();
                    tokio::spawn(async move {
                        let kind = job.kind;
                        let repo = job.repo.clone();
                        let outcome = job.execute(target.as_ref()).await;
                        log_outcome(repo.name(), kind, &outcome);
                        drop(permit);
                    });
                }
            }
        }
        Ok(())
    }

    /// Close the queue and discard whatever is still in it, logging each job.
    fn abandon_queued(&mut self) -> usize {
        self.rx.close();
        let mut abandoned = 0;
        while let Ok(job) = self.rx.try_recv() {
            tracing::warn!(kind = %job.kind, repo = %job.repo.name(), "dropping queued job");
            abandoned += 1;
        }
        abandoned
    }

    #[cfg(test)]
    pub(crate) fn try_next(&mut self) -> Option<SyncJob> {
        self.rx.try_recv().ok()
    }
}

fn log_outcome(name: &str, kind: gitmirror_core::JobKind, outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::Failed(_) => {
            tracing::debug!(repo = %name, kind = %kind, "job failed")
        }
        other => tracing::debug!(repo = %name, kind = %kind, outcome = ?other, "job finished"),
    }
}
