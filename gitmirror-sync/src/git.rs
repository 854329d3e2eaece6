//! Git transport and object operations.
//!
//! [`GitBackend`] and [`Mirror`] are the seam between the sync protocol in
//! [`crate::worker`] and libgit2. Both are blocking; the worker calls them
//! from `spawn_blocking`. [`Git2Backend`] is the production implementation.

use std::path::PathBuf;

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    AutotagOption, Cred, CredentialType, FetchOptions, Oid, RemoteCallbacks, Repository,
    ResetType,
};

use gitmirror_core::{LabelKind, RepositoryConfig};

use crate::error::SyncError;

/// Username offered to SSH servers that do not put one in the URL.
const DEFAULT_SSH_USER: &str = "git";
/// libgit2 re-invokes the credentials callback after every rejected attempt.
const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// SSH credential material for one repository.
#[derive(Clone)]
pub enum SshAuth {
    /// No key configured: ask the running ssh-agent.
    Agent,
    KeyFile {
        private_key: PathBuf,
        passphrase: Option<String>,
    },
}

impl SshAuth {
    /// Resolve credentials, failing early if the configured key is unreadable.
    pub fn resolve(repo: &RepositoryConfig) -> Result<Self, SyncError> {
        let Some(private_key) = &repo.ssh_private_key else {
            return Ok(SshAuth::Agent);
        };
        std::fs::File::open(private_key).map_err(|source| SyncError::AuthSetup {
            path: private_key.clone(),
            source,
        })?;
        Ok(SshAuth::KeyFile {
            private_key: private_key.clone(),
            passphrase: repo.ssh_passphrase.clone(),
        })
    }

    /// Remote callbacks carrying these credentials.
    pub fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut attempts = 0;
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |_url, username_from_url, allowed| {
            attempts += 1;
            if attempts > MAX_CREDENTIAL_ATTEMPTS {
                return Err(git2::Error::from_str("ssh authentication rejected"));
            }
            let user = username_from_url.unwrap_or(DEFAULT_SSH_USER);
            if !allowed.contains(CredentialType::SSH_KEY) {
                return Cred::default();
            }
            match self {
                SshAuth::Agent => Cred::ssh_key_from_agent(user),
                SshAuth::KeyFile {
                    private_key,
                    passphrase,
                } => Cred::ssh_key(user, None, private_key, passphrase.as_deref()),
            }
        });
        callbacks
    }
}

// ---------------------------------------------------------------------------
// Seam
// ---------------------------------------------------------------------------

/// Result of a successful fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// No reference moved.
    UpToDate,
    Updated { tips: usize },
}

pub trait GitBackend: Send + Sync + 'static {
    /// Clone `repo.url` into `repo.directory`, checking out exactly the label.
    fn clone_label(&self, repo: &RepositoryConfig, auth: &SshAuth) -> Result<(), git2::Error>;

    /// Open the existing checkout of `repo`, including its work tree.
    fn open(&self, repo: &RepositoryConfig) -> Result<Box<dyn Mirror>, git2::Error>;
}

/// An opened local mirror.
pub trait Mirror: Send {
    fn fetch(&mut self, auth: &SshAuth) -> Result<FetchOutcome, git2::Error>;

    /// Commit the tracked label points at, with annotated tags dereferenced.
    fn resolve_target(&self) -> Result<Oid, git2::Error>;

    fn head(&self) -> Result<Oid, git2::Error>;

    /// Discard local changes and move HEAD to `target`.
    fn hard_reset(&mut self, target: Oid) -> Result<(), git2::Error>;
}

// ---------------------------------------------------------------------------
// libgit2
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct Git2Backend;

impl GitBackend for Git2Backend {
    fn clone_label(&self, repo: &RepositoryConfig, auth: &SshAuth) -> Result<(), git2::Error> {
        let mut fetch = FetchOptions::new();
        fetch
            .remote_callbacks(auth.callbacks())
            .download_tags(AutotagOption::All);

        let remote_name = repo.remote.clone();
        let mut builder = RepoBuilder::new();
        builder
            .fetch_options(fetch)
            .remote_create(move |cloned, _name, url| cloned.remote(&remote_name, url));

        match repo.label_kind {
            LabelKind::Branch => {
                builder.branch(&repo.label);
                builder.clone(&repo.url, &repo.directory)?;
            }
            LabelKind::Tag => {
                // Clone checks out the remote default branch; detach onto the tag.
                let cloned = builder.clone(&repo.url, &repo.directory)?;
                let commit = cloned
                    .find_reference(&repo.clone_ref())?
                    .peel_to_commit()?;
                cloned.set_head_detached(commit.id())?;
                cloned.checkout_head(Some(CheckoutBuilder::new().force()))?;
            }
        }
        Ok(())
    }

    fn open(&self, repo: &RepositoryConfig) -> Result<Box<dyn Mirror>, git2::Error> {
        let opened = Repository::open(&repo.directory)?;
        if opened.workdir().is_none() {
            return Err(git2::Error::from_str("repository has no work tree"));
        }
        Ok(Box::new(Git2Mirror {
            repo: opened,
            remote: repo.remote.clone(),
            target_ref: repo.target_ref(),
        }))
    }
}

struct Git2Mirror {
    repo: Repository,
    remote: String,
    target_ref: String,
}

impl Mirror for Git2Mirror {
    fn fetch(&mut self, auth: &SshAuth) -> Result<FetchOutcome, git2::Error> {
        let mut remote = self.repo.find_remote(&self.remote)?;
        let refspecs = [
            format!("+refs/heads/*:refs/remotes/{}/*", self.remote),
            "+refs/tags/*:refs/tags/*".to_string(),
        ];

        let mut tips = 0usize;
        {
            let mut callbacks = auth.callbacks();
            callbacks.update_tips(|refname, old, new| {
                tracing::debug!(reference = refname, %old, %new, "reference updated");
                tips += 1;
                true
            });
            let mut options = FetchOptions::new();
            options
                .remote_callbacks(callbacks)
                .download_tags(AutotagOption::All);
            remote.fetch(&refspecs, Some(&mut options), None)?;
        }

        if tips == 0 {
            Ok(FetchOutcome::UpToDate)
        } else {
            Ok(FetchOutcome::Updated { tips })
        }
    }

    fn resolve_target(&self) -> Result<Oid, git2::Error> {
        let reference = self.repo.find_reference(&self.target_ref)?.resolve()?;
        let oid = reference
            .target()
            .ok_or_else(|| git2::Error::from_str("reference has no target"))?;
        let object = self.repo.find_object(oid, None)?;
        if let Some(tag) = object.as_tag() {
            tracing::info!(tag = %tag.id(), target = %tag.target_id(), "annotated tag");
        }
        Ok(object.peel_to_commit()?.id())
    }

    fn head(&self) -> Result<Oid, git2::Error> {
        Ok(self.repo.head()?.peel_to_commit()?.id())
    }

    fn hard_reset(&mut self, target: Oid) -> Result<(), git2::Error> {
        let object = self.repo.find_object(target, None)?;
        self.repo.reset(&object, ResetType::Hard, None)
    }
}
