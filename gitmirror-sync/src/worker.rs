//! Clone and Update operations.
//!
//! ## Update protocol
//!
//! 1. Claim the repository's busy flag (waits while another job holds it).
//! 2. Resolve SSH auth and open the local checkout.
//! 3. Fetch, up to `retry.attempts` times with `retry.delay` between failures.
//!    "Already up to date" ends the update here: no reset, no trigger.
//! 4. Resolve the target commit (annotated tags dereferenced).
//! 5. Target == HEAD → nothing to do.
//! 6. Hard reset to the target, then re-read HEAD and require a match.
//! 7. Touch the trigger file.
//!
//! Errors at any step are logged with the repository span and returned as
//! [`SyncOutcome::Failed`]. The busy flag is released on every path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use git2::Oid;
use tracing::Instrument;

use gitmirror_core::{Config, JobKind, RepositoryConfig};

use crate::error::SyncError;
use crate::git::{FetchOutcome, GitBackend, Mirror, SshAuth};
use crate::status::StatusTable;
use crate::trigger::{self, TriggerOutcome};

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// Fetch retry settings, taken from the configuration in effect at enqueue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            attempts: config.retry_count.max(1),
            delay: config.retry_delay,
        }
    }
}

/// One queued operation against one repository; consumed exactly once.
#[derive(Debug, Clone)]
pub struct SyncJob {
    pub repo: Arc<RepositoryConfig>,
    pub kind: JobKind,
    pub retry: RetryPolicy,
}

impl SyncJob {
    pub fn clone_of(repo: Arc<RepositoryConfig>, retry: RetryPolicy) -> Self {
        Self {
            repo,
            kind: JobKind::Clone,
            retry,
        }
    }

    pub fn update_of(repo: Arc<RepositoryConfig>, retry: RetryPolicy) -> Self {
        Self {
            repo,
            kind: JobKind::Update,
            retry,
        }
    }

    /// Run the operation named by `kind` against `target`.
    pub async fn execute(self, target: &dyn Syncable) -> SyncOutcome {
        match self.kind {
            JobKind::Clone => target.clone_repo(self.repo).await,
            JobKind::Update => target.update_repo(self.repo, self.retry).await,
        }
    }
}

/// How a Clone or Update ended.
#[derive(Debug)]
pub enum SyncOutcome {
    Cloned { trigger: TriggerOutcome },
    Updated { commit: Oid, trigger: TriggerOutcome },
    /// The fetch moved no references.
    AlreadyUpToDate,
    /// The fetch succeeded but HEAD already matched the target.
    NoChange { commit: Oid },
    Failed(SyncError),
}

impl SyncOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, SyncOutcome::Failed(_))
    }
}

/// Anything that can perform the two sync operations.
#[async_trait]
pub trait Syncable: Send + Sync {
    async fn clone_repo(&self, repo: Arc<RepositoryConfig>) -> SyncOutcome;
    async fn update_repo(&self, repo: Arc<RepositoryConfig>, retry: RetryPolicy) -> SyncOutcome;
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Executes sync operations through a [`GitBackend`], one at a time per repository.
pub struct SyncWorker<B> {
    backend: Arc<B>,
    status: StatusTable,
}

impl<B: GitBackend> SyncWorker<B> {
    pub fn new(backend: B, status: StatusTable) -> Self {
        Self {
            backend: Arc::new(backend),
            status,
        }
    }

    pub fn status(&self) -> &StatusTable {
        &self.status
    }

    async fn try_clone(&self, repo: &Arc<RepositoryConfig>) -> Result<SyncOutcome, SyncError> {
        let auth = SshAuth::resolve(repo)?;
        let reference = repo.clone_ref();
        tracing::debug!(reference = %reference, "clone reference");

        let backend = self.backend.clone();
        let job_repo = repo.clone();
        blocking(move || backend.clone_label(&job_repo, &auth))
            .await?
            .map_err(|source| SyncError::Clone {
                reference,
                directory: repo.directory.clone(),
                source,
            })?;
        tracing::info!("cloned repository");

        let trigger = trigger::touch(repo.trigger.as_deref());
        Ok(SyncOutcome::Cloned { trigger })
    }

    async fn try_update(
        &self,
        repo: &Arc<RepositoryConfig>,
        retry: RetryPolicy,
    ) -> Result<SyncOutcome, SyncError> {
        let auth = SshAuth::resolve(repo)?;

        let backend = self.backend.clone();
        let job_repo = repo.clone();
        let mut mirror = blocking(move || backend.open(&job_repo))
            .await?
            .map_err(|source| SyncError::OpenRepository {
                directory: repo.directory.clone(),
                source,
            })?;

        // Forges occasionally serve half-written refs; only "up to date" skips retries.
        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::info!(attempt, "fetch attempt");
            let fetch_auth = auth.clone();
            let (returned, result) = blocking(move || {
                let result = mirror.fetch(&fetch_auth);
                (mirror, result)
            })
            .await?;
            mirror = returned;

            match result {
                Ok(FetchOutcome::UpToDate) => {
                    tracing::info!("no new commits");
                    return Ok(SyncOutcome::AlreadyUpToDate);
                }
                Ok(FetchOutcome::Updated { tips }) => {
                    tracing::info!(tips, "fetched new updates");
                    break;
                }
                Err(source) => {
                    tracing::error!(attempt, error = %source, "failed to fetch updates");
                    if attempt >= retry.attempts {
                        return Err(SyncError::FetchExhausted {
                            remote: repo.remote.clone(),
                            attempts: attempt,
                            source,
                        });
                    }
                    tokio::time::sleep(retry.delay).await;
                }
            }
        }

        let target_ref = repo.target_ref();
        let outcome = blocking(move || reset_to_target(mirror.as_mut(), &target_ref)).await??;
        match outcome {
            ResetOutcome::AlreadyAt(commit) => {
                tracing::warn!(commit = %commit, "already up to date");
                Ok(SyncOutcome::NoChange { commit })
            }
            ResetOutcome::Reset(commit) => {
                tracing::info!(commit = %commit, "changes confirmed");
                let trigger = trigger::touch(repo.trigger.as_deref());
                Ok(SyncOutcome::Updated { commit, trigger })
            }
        }
    }
}

#[async_trait]
impl<B: GitBackend> Syncable for SyncWorker<B> {
    async fn clone_repo(&self, repo: Arc<RepositoryConfig>) -> SyncOutcome {
        let span = repo_span(&repo, JobKind::Clone);
        async {
            let _guard = self.status.acquire(&repo.path).await;
            match self.try_clone(&repo).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(error = %err, "clone failed");
                    SyncOutcome::Failed(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn update_repo(&self, repo: Arc<RepositoryConfig>, retry: RetryPolicy) -> SyncOutcome {
        let span = repo_span(&repo, JobKind::Update);
        async {
            let _guard = self.status.acquire(&repo.path).await;
            match self.try_update(&repo, retry).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(error = %err, "update failed");
                    SyncOutcome::Failed(err)
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Log context shared by every event of one operation.
pub fn repo_span(repo: &RepositoryConfig, kind: JobKind) -> tracing::Span {
    tracing::info_span!(
        "sync",
        op = %kind,
        repo = %repo.name(),
        path = %repo.path,
        remote = %repo.remote,
        label = %repo.label,
        label_type = %repo.label_kind,
    )
}

enum ResetOutcome {
    AlreadyAt(Oid),
    Reset(Oid),
}

fn reset_to_target(mirror: &mut dyn Mirror, target_ref: &str) -> Result<ResetOutcome, SyncError> {
    let resolution = |source| SyncError::ReferenceResolution {
        reference: target_ref.to_string(),
        source,
    };
    let head_resolution = |source| SyncError::ReferenceResolution {
        reference: "HEAD".to_string(),
        source,
    };

    let target = mirror.resolve_target().map_err(resolution)?;
    let head = mirror.head().map_err(head_resolution)?;
    if head == target {
        return Ok(ResetOutcome::AlreadyAt(target));
    }

    mirror
        .hard_reset(target)
        .map_err(|source| SyncError::Reset { target, source })?;
    tracing::info!("hard reset successful, confirming changes");

    let actual = mirror.head().map_err(head_resolution)?;
    if actual != target {
        tracing::debug!(remote = %target, local = %actual, "hash mismatch after reset");
        return Err(SyncError::VerificationMismatch {
            expected: target,
            actual,
        });
    }
    Ok(ResetOutcome::Reset(target))
}

async fn blocking<T, F>(f: F) -> Result<T, SyncError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| SyncError::Join(err.to_string()))
}
