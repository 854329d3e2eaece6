//! Error types for gitmirror-sync.

use std::path::PathBuf;

use git2::Oid;
use thiserror::Error;

/// Every way a Clone or Update can fail.
///
/// None of these escape the worker: they are logged with repository context
/// and reported back as [`crate::SyncOutcome::Failed`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// The configured SSH private key could not be read.
    #[error("failed to set up ssh auth from {path}: {source}")]
    AuthSetup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to clone {reference} into {directory}: {source}")]
    Clone {
        reference: String,
        directory: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("failed to open local git repository at {directory}: {source}")]
    OpenRepository {
        directory: PathBuf,
        #[source]
        source: git2::Error,
    },

    /// Every fetch attempt failed; the work tree was left untouched.
    #[error("failed to fetch from remote '{remote}' after {attempts} attempt(s): {source}")]
    FetchExhausted {
        remote: String,
        attempts: u32,
        #[source]
        source: git2::Error,
    },

    #[error("failed to resolve reference {reference}: {source}")]
    ReferenceResolution {
        reference: String,
        #[source]
        source: git2::Error,
    },

    #[error("failed to hard reset work tree to {target}: {source}")]
    Reset {
        target: Oid,
        #[source]
        source: git2::Error,
    },

    /// HEAD does not point at the commit we just reset to.
    #[error("hashes don't match after reset: expected {expected}, found {actual}")]
    VerificationMismatch { expected: Oid, actual: Oid },

    #[error("blocking git task failed: {0}")]
    Join(String),
}
